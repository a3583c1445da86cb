//! Response admission pipeline
//!
//! The sole gateway through which any candidate response becomes an
//! approved utterance. Six guards run in order (staleness, interruption,
//! rate limit, content, length, deduplication) and the first failure
//! rejects. Guards are evaluated at approval time, not at chain start:
//! a candidate generated against perception that has since been superseded
//! fails staleness even though it was fresh when generation began.
//!
//! Pipeline state is per session and owned by that session's decision
//! task; within a session evaluations never interleave, which is what
//! makes the staleness and rate-limit checks race-free.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use redi_core::{RejectionReason, ResponseSource};
use redi_config::constants::pipeline as defaults;

use crate::filters::content_violation;

/// Interruption flags shared between the session's decision task and the
/// transport edge.
///
/// Speech signals must take effect immediately, including while the
/// decision chain is suspended in an LLM call, so they live behind this
/// shared handle rather than as task-owned state. An approval evaluated
/// after user-speech-start fails the interruption guard even though the
/// chain began before it.
#[derive(Debug, Default)]
pub struct SpeechFlags {
    user_speaking: AtomicBool,
    redi_speaking: AtomicBool,
    interrupted_at_ms: Mutex<Option<u64>>,
}

impl SpeechFlags {
    pub fn set_user_speaking(&self, speaking: bool, now_ms: u64) {
        let was = self.user_speaking.swap(speaking, Ordering::SeqCst);
        if speaking && !was {
            *self.interrupted_at_ms.lock() = Some(now_ms);
        }
    }

    pub fn set_redi_speaking(&self, speaking: bool) {
        self.redi_speaking.store(speaking, Ordering::SeqCst);
    }

    pub fn user_speaking(&self) -> bool {
        self.user_speaking.load(Ordering::SeqCst)
    }

    pub fn redi_speaking(&self) -> bool {
        self.redi_speaking.load(Ordering::SeqCst)
    }

    fn interrupted_at_ms(&self) -> Option<u64> {
        *self.interrupted_at_ms.lock()
    }
}

/// Admission pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_context_age_unprompted_ms: u64,
    pub max_context_age_prompted_ms: u64,
    pub max_words_unprompted: usize,
    pub max_words_prompted: usize,
    pub min_gap_unprompted_ms: u64,
    pub dedup_threshold: f32,
    pub recent_window: usize,
    /// Ignore candidates arriving within this window after an interruption
    pub soft_cancel_window_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_context_age_unprompted_ms: defaults::MAX_CONTEXT_AGE_UNPROMPTED_MS,
            max_context_age_prompted_ms: defaults::MAX_CONTEXT_AGE_PROMPTED_MS,
            max_words_unprompted: defaults::MAX_WORDS_UNPROMPTED,
            max_words_prompted: defaults::MAX_WORDS_PROMPTED,
            min_gap_unprompted_ms: defaults::MIN_GAP_UNPROMPTED_MS,
            dedup_threshold: defaults::DEDUP_SIMILARITY_THRESHOLD,
            recent_window: defaults::RECENT_RESPONSE_WINDOW,
            soft_cancel_window_ms: defaults::SOFT_CANCEL_WINDOW_MS,
        }
    }
}

/// Outcome of one admission evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Approved, possibly truncated by the length guard
    Approved {
        text: String,
        source: ResponseSource,
    },
    Rejected(RejectionReason),
}

impl Verdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved { .. })
    }
}

/// Per-session admission state
pub struct ResponsePipeline {
    config: PipelineConfig,
    last_response_at_ms: Option<u64>,
    recent_responses: VecDeque<String>,
    flags: Arc<SpeechFlags>,
    last_context_timestamp_ms: Option<u64>,
}

impl Default for ResponsePipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl ResponsePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_flags(config, Arc::new(SpeechFlags::default()))
    }

    pub fn with_flags(config: PipelineConfig, flags: Arc<SpeechFlags>) -> Self {
        Self {
            config,
            last_response_at_ms: None,
            recent_responses: VecDeque::new(),
            flags,
            last_context_timestamp_ms: None,
        }
    }

    /// Shared interruption flags for the transport edge
    pub fn flags(&self) -> Arc<SpeechFlags> {
        self.flags.clone()
    }

    /// Stamp the context timestamp for the packet now being processed
    pub fn stamp_context(&mut self, now_ms: u64) {
        self.last_context_timestamp_ms = Some(now_ms);
    }

    pub fn last_context_timestamp(&self) -> Option<u64> {
        self.last_context_timestamp_ms
    }

    /// User started or stopped speaking. A start opens the soft-cancel
    /// window: candidates arriving shortly after remain rejected even once
    /// the flag clears.
    pub fn set_user_speaking(&mut self, speaking: bool, now_ms: u64) {
        self.flags.set_user_speaking(speaking, now_ms);
    }

    pub fn set_redi_speaking(&mut self, speaking: bool) {
        self.flags.set_redi_speaking(speaking);
    }

    pub fn user_speaking(&self) -> bool {
        self.flags.user_speaking()
    }

    pub fn last_response_at(&self) -> Option<u64> {
        self.last_response_at_ms
    }

    pub fn recent_responses(&self) -> impl Iterator<Item = &String> {
        self.recent_responses.iter()
    }

    /// Run all six guards over a candidate. On approval the recent-response
    /// window and the rate-limit stamp advance.
    pub fn evaluate(
        &mut self,
        candidate: &str,
        source: ResponseSource,
        prompted: bool,
        now_ms: u64,
    ) -> Verdict {
        // 1. Staleness
        let max_age = if prompted {
            self.config.max_context_age_prompted_ms
        } else {
            self.config.max_context_age_unprompted_ms
        };
        let fresh = self
            .last_context_timestamp_ms
            .is_some_and(|t| now_ms.saturating_sub(t) <= max_age);
        if !fresh {
            return self.reject(RejectionReason::Staleness, candidate);
        }

        // 2. Interruption (plus the soft-cancel window after one)
        let soft_cancelled = self
            .flags
            .interrupted_at_ms()
            .is_some_and(|t| now_ms.saturating_sub(t) < self.config.soft_cancel_window_ms);
        if self.flags.user_speaking() || self.flags.redi_speaking() || soft_cancelled {
            return self.reject(RejectionReason::Interruption, candidate);
        }

        // 3. Rate limit (unprompted only)
        if !prompted {
            let too_soon = self
                .last_response_at_ms
                .is_some_and(|t| now_ms.saturating_sub(t) < self.config.min_gap_unprompted_ms);
            if too_soon {
                return self.reject(RejectionReason::RateLimit, candidate);
            }
        }

        // 4. Content
        if let Some(pattern) = content_violation(candidate) {
            tracing::debug!(pattern, "content guard rejected candidate");
            return self.reject(RejectionReason::Content, candidate);
        }

        // 5. Length
        let max_words = if prompted {
            self.config.max_words_prompted
        } else {
            self.config.max_words_unprompted
        };
        let text = match enforce_length(candidate, max_words, prompted) {
            Some(text) => text,
            None => return self.reject(RejectionReason::Length, candidate),
        };

        // 6. Deduplication
        let similar = self
            .recent_responses
            .iter()
            .map(|prev| similarity(&text, prev))
            .fold(0.0f32, f32::max);
        if similar >= self.config.dedup_threshold {
            return self.reject(RejectionReason::Deduplication, candidate);
        }

        self.recent_responses.push_back(text.clone());
        while self.recent_responses.len() > self.config.recent_window {
            self.recent_responses.pop_front();
        }
        self.last_response_at_ms = Some(now_ms);

        Verdict::Approved { text, source }
    }

    fn reject(&self, reason: RejectionReason, candidate: &str) -> Verdict {
        tracing::debug!(reason = reason.as_str(), candidate, "candidate rejected");
        Verdict::Rejected(reason)
    }
}

/// Length guard: pass short text through, reject unprompted text at more
/// than twice the cap, truncate the rest, preferring to end at the last
/// sentence terminator in the second half of the truncation.
fn enforce_length(text: &str, max_words: usize, prompted: bool) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return Some(text.trim().to_string());
    }
    if !prompted && words.len() > max_words * 2 {
        return None;
    }

    let truncated = words[..max_words].join(" ");
    let halfway = truncated.len() / 2;
    let cut = truncated
        .rfind(['.', '!', '?'])
        .filter(|&i| i >= halfway)
        .map(|i| truncated[..=i].to_string());
    Some(cut.unwrap_or_else(|| format!("{}.", truncated.trim_end_matches(['.', ',', ';']))))
}

/// Jaccard-style similarity over lowercase word sets, ignoring tokens of
/// three characters or fewer; normalized by the larger set.
fn similarity(a: &str, b: &str) -> f32 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    let larger = set_a.len().max(set_b.len());
    if larger == 0 {
        return 0.0;
    }
    let shared = set_a.intersection(&set_b).count();
    shared as f32 / larger as f32
}

fn word_set(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > defaults::DEDUP_MIN_TOKEN_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_pipeline(now_ms: u64) -> ResponsePipeline {
        let mut p = ResponsePipeline::default();
        p.stamp_context(now_ms);
        p
    }

    #[test]
    fn fresh_candidate_is_approved() {
        let mut p = fresh_pipeline(1_000);
        let verdict = p.evaluate("Back rounding", ResponseSource::Rule, false, 1_100);
        assert_eq!(
            verdict,
            Verdict::Approved {
                text: "Back rounding".into(),
                source: ResponseSource::Rule
            }
        );
    }

    #[test]
    fn stale_context_rejects() {
        let mut p = fresh_pipeline(0);
        // 2001ms later: unprompted window is 2000ms
        let verdict = p.evaluate("Back rounding", ResponseSource::Rule, false, 2_001);
        assert_eq!(verdict, Verdict::Rejected(RejectionReason::Staleness));
        // Prompted window is 5000ms
        let verdict = p.evaluate("Back rounding", ResponseSource::Reasoning, true, 2_001);
        assert!(verdict.is_approved());
    }

    #[test]
    fn no_context_timestamp_is_stale() {
        let mut p = ResponsePipeline::default();
        let verdict = p.evaluate("hi there friend", ResponseSource::Triage, false, 100);
        assert_eq!(verdict, Verdict::Rejected(RejectionReason::Staleness));
    }

    #[test]
    fn user_speaking_rejects() {
        let mut p = fresh_pipeline(1_000);
        p.set_user_speaking(true, 1_000);
        let verdict = p.evaluate("Back rounding", ResponseSource::Rule, false, 1_100);
        assert_eq!(verdict, Verdict::Rejected(RejectionReason::Interruption));
    }

    #[test]
    fn soft_cancel_window_outlasts_speech_flag() {
        let mut p = fresh_pipeline(1_000);
        p.set_user_speaking(true, 1_000);
        p.set_user_speaking(false, 1_200);
        // 300ms after interruption start: inside the 500ms window
        let verdict = p.evaluate("Back rounding", ResponseSource::Rule, false, 1_300);
        assert_eq!(verdict, Verdict::Rejected(RejectionReason::Interruption));
        // Past the window
        let verdict = p.evaluate("Back rounding", ResponseSource::Rule, false, 1_600);
        assert!(verdict.is_approved());
    }

    #[test]
    fn redi_speaking_rejects() {
        let mut p = fresh_pipeline(1_000);
        p.set_redi_speaking(true);
        let verdict = p.evaluate("Back rounding", ResponseSource::Rule, false, 1_100);
        assert_eq!(verdict, Verdict::Rejected(RejectionReason::Interruption));
    }

    #[test]
    fn rate_limit_applies_to_unprompted_only() {
        let mut p = fresh_pipeline(0);
        assert!(p.evaluate("kettle boiling now", ResponseSource::Triage, false, 100).is_approved());

        p.stamp_context(1_000);
        let verdict = p.evaluate("water ready here", ResponseSource::Triage, false, 1_100);
        assert_eq!(verdict, Verdict::Rejected(RejectionReason::RateLimit));

        // Prompted bypasses the rate limit
        let verdict = p.evaluate("water ready here", ResponseSource::Reasoning, true, 1_100);
        assert!(verdict.is_approved());
    }

    #[test]
    fn content_guard_rejects_questions() {
        let mut p = fresh_pipeline(1_000);
        let verdict = p.evaluate("need more water?", ResponseSource::Triage, false, 1_100);
        assert_eq!(verdict, Verdict::Rejected(RejectionReason::Content));
    }

    #[test]
    fn grossly_long_unprompted_rejects() {
        let mut p = fresh_pipeline(1_000);
        let long = (0..20).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
        let verdict = p.evaluate(&long, ResponseSource::Triage, false, 1_100);
        assert_eq!(verdict, Verdict::Rejected(RejectionReason::Length));
    }

    #[test]
    fn moderately_long_unprompted_truncates_to_cap() {
        let mut p = fresh_pipeline(1_000);
        let text = "one two three four five six seven eight nine ten";
        match p.evaluate(text, ResponseSource::Triage, false, 1_100) {
            Verdict::Approved { text, .. } => {
                assert_eq!(text.split_whitespace().count(), 8);
                assert!(text.ends_with('.'));
            }
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[test]
    fn truncation_prefers_late_sentence_boundary() {
        let mut p = fresh_pipeline(1_000);
        let text = "one two three four five six seven. eight nine ten eleven twelve";
        match p.evaluate(text, ResponseSource::Triage, false, 1_100) {
            Verdict::Approved { text, .. } => {
                assert_eq!(text, "one two three four five six seven.");
            }
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[test]
    fn prompted_cap_is_25_words() {
        let mut p = fresh_pipeline(1_000);
        let long = (0..30).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
        match p.evaluate(&long, ResponseSource::Reasoning, true, 1_100) {
            Verdict::Approved { text, .. } => {
                assert_eq!(text.split_whitespace().count(), 25);
            }
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[test]
    fn near_duplicate_rejects() {
        let mut p = fresh_pipeline(0);
        assert!(p.evaluate("Back rounding", ResponseSource::Rule, false, 100).is_approved());

        p.stamp_context(10_000);
        // {back, rounding, again} vs {back, rounding}: 2/3 ≈ 0.67
        let verdict = p.evaluate("Back rounding again", ResponseSource::Triage, false, 10_100);
        assert_eq!(verdict, Verdict::Rejected(RejectionReason::Deduplication));
    }

    #[test]
    fn dedup_window_holds_five() {
        let mut p = fresh_pipeline(0);
        let texts = [
            "alpha bravo charlie",
            "delta echo foxtrot",
            "golf hotel india",
            "juliet kilo lima",
            "mike november oscar",
            "papa quebec romeo",
        ];
        for (i, text) in texts.iter().enumerate() {
            let now = i as u64 * 4_000;
            p.stamp_context(now);
            assert!(p.evaluate(text, ResponseSource::Triage, false, now + 10).is_approved());
        }
        // The first response has been evicted from the window
        p.stamp_context(100_000);
        assert!(p
            .evaluate("alpha bravo charlie", ResponseSource::Triage, false, 100_010)
            .is_approved());
    }

    #[test]
    fn short_tokens_ignored_by_dedup() {
        // "on the" style filler differs; content words match
        assert!(similarity("kettle boiling", "the kettle is boiling now") >= 0.5);
        assert_eq!(similarity("a on it", "by at up"), 0.0);
    }

    #[test]
    fn approval_updates_rate_limit_stamp() {
        let mut p = fresh_pipeline(0);
        assert!(p.evaluate("alpha bravo charlie", ResponseSource::Triage, false, 50).is_approved());
        assert_eq!(p.last_response_at(), Some(50));
    }
}
