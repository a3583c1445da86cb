//! Thinking-acknowledgment phrases
//!
//! When deep reasoning runs past two seconds, one of these phrases is
//! spoken out-of-band so the user knows the assistant heard them. The
//! rotation avoids the five most recently used phrases; repeating "let me
//! think" twice in a row reads as a glitch.

use rand::seq::SliceRandom;
use std::collections::VecDeque;

use redi_config::constants::reasoning::THINKING_PHRASE_MEMORY;

const PHRASES: &[&str] = &[
    "Let me think.",
    "One moment.",
    "Thinking it through.",
    "Give me a second.",
    "Working on it.",
    "Let me look.",
    "Checking.",
    "On it.",
    "Just a moment.",
    "Looking now.",
];

/// Per-session phrase rotation
pub struct ThinkingPhrases {
    recent: VecDeque<&'static str>,
}

impl Default for ThinkingPhrases {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkingPhrases {
    pub fn new() -> Self {
        Self {
            recent: VecDeque::new(),
        }
    }

    /// Pick a phrase outside the recent window. Does not mark it used;
    /// call [`ThinkingPhrases::record`] once it was actually spoken.
    pub fn pick(&self) -> &'static str {
        let candidates: Vec<&'static str> = PHRASES
            .iter()
            .copied()
            .filter(|p| !self.recent.contains(p))
            .collect();
        let mut rng = rand::thread_rng();
        candidates
            .choose(&mut rng)
            .copied()
            .unwrap_or(PHRASES[0])
    }

    /// Mark a phrase as spoken
    pub fn record(&mut self, phrase: &'static str) {
        self.recent.push_back(phrase);
        while self.recent.len() > THINKING_PHRASE_MEMORY {
            self.recent.pop_front();
        }
    }

    pub fn recent(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.recent.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_avoids_recent_phrases() {
        let mut phrases = ThinkingPhrases::new();
        for _ in 0..5 {
            let phrase = phrases.pick();
            assert!(!phrases.recent().any(|r| r == phrase));
            phrases.record(phrase);
        }
        assert_eq!(phrases.recent().count(), 5);
    }

    #[test]
    fn memory_is_bounded_at_five() {
        let mut phrases = ThinkingPhrases::new();
        for _ in 0..20 {
            let phrase = phrases.pick();
            phrases.record(phrase);
        }
        assert_eq!(phrases.recent().count(), 5);
    }

    #[test]
    fn pool_has_ten_distinct_phrases() {
        let unique: std::collections::HashSet<_> = PHRASES.iter().collect();
        assert_eq!(unique.len(), 10);
    }
}
