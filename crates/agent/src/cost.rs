//! Per-session cost guard
//!
//! Tracks a session's spend against its tier profile and degrades before
//! the budget is hit: past 70% usage the text tier downgrades to the cheap
//! model, and the recommended vision interval stretches as the remaining
//! call allowance shrinks. Exhaustion is handled silently, never spoken.

use redi_config::constants::cost as costs;

/// Billing tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Free,
    Paid,
}

impl Tier {
    fn budget_usd(self) -> f64 {
        match self {
            Tier::Free => costs::FREE_BUDGET_USD,
            Tier::Paid => costs::PAID_BUDGET_USD,
        }
    }

    fn max_vision_calls(self) -> u32 {
        match self {
            Tier::Free => costs::FREE_MAX_VISION_CALLS,
            Tier::Paid => costs::PAID_MAX_VISION_CALLS,
        }
    }

    fn max_text_calls(self) -> u32 {
        match self {
            Tier::Free => costs::FREE_MAX_TEXT_CALLS,
            Tier::Paid => costs::PAID_MAX_TEXT_CALLS,
        }
    }

    fn warn_fraction(self) -> f64 {
        match self {
            Tier::Free => costs::FREE_WARN_FRACTION,
            Tier::Paid => costs::PAID_WARN_FRACTION,
        }
    }
}

/// Text model choice under budget pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextModel {
    Sonnet,
    Haiku,
}

/// Read-only usage snapshot for the cost ledger endpoint
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CostSnapshot {
    pub vision_calls: u32,
    pub sonnet_calls: u32,
    pub haiku_calls: u32,
    pub tts_characters: u64,
    pub transcription_seconds: f64,
    pub total_usd: f64,
    pub budget_usd: f64,
    pub limit_reached: bool,
}

/// Session-scoped spend ledger
pub struct CostGuard {
    tier: Tier,
    vision_calls: u32,
    sonnet_calls: u32,
    haiku_calls: u32,
    tts_characters: u64,
    transcription_seconds: f64,
    total_usd: f64,
    warning_issued: bool,
    limit_reached: bool,
}

impl CostGuard {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            vision_calls: 0,
            sonnet_calls: 0,
            haiku_calls: 0,
            tts_characters: 0,
            transcription_seconds: 0.0,
            total_usd: 0.0,
            warning_issued: false,
            limit_reached: false,
        }
    }

    pub fn can_call_vision(&self) -> bool {
        self.vision_calls < self.tier.max_vision_calls()
            && self.total_usd < self.tier.budget_usd()
    }

    pub fn can_call_text(&self) -> bool {
        self.sonnet_calls + self.haiku_calls < self.tier.max_text_calls()
    }

    pub fn record_vision(&mut self) {
        self.vision_calls += 1;
        self.add_cost(costs::VISION_CALL_USD);
    }

    pub fn record_text(&mut self, model: TextModel) {
        match model {
            TextModel::Sonnet => {
                self.sonnet_calls += 1;
                self.add_cost(costs::SONNET_CALL_USD);
            }
            TextModel::Haiku => {
                self.haiku_calls += 1;
                self.add_cost(costs::HAIKU_CALL_USD);
            }
        }
    }

    pub fn record_tts(&mut self, characters: usize) {
        self.tts_characters += characters as u64;
        self.add_cost(characters as f64 * costs::TTS_PER_CHAR_USD);
    }

    pub fn record_transcription(&mut self, seconds: f64) {
        self.transcription_seconds += seconds;
        self.add_cost(seconds * costs::TRANSCRIPTION_PER_SEC_USD);
    }

    fn add_cost(&mut self, usd: f64) {
        self.total_usd += usd;
        if self.total_usd >= self.tier.budget_usd() {
            self.limit_reached = true;
        }
    }

    /// One-shot warning when cumulative spend crosses the tier's warn
    /// fraction. Returns the fraction used the first time it fires.
    pub fn check_warning_threshold(&mut self) -> Option<f64> {
        let fraction = self.budget_used_fraction();
        if !self.warning_issued && fraction >= self.tier.warn_fraction() {
            self.warning_issued = true;
            tracing::warn!(
                fraction = format!("{:.0}%", fraction * 100.0),
                "session budget warning threshold crossed"
            );
            return Some(fraction);
        }
        None
    }

    pub fn budget_used_fraction(&self) -> f64 {
        self.total_usd / self.tier.budget_usd()
    }

    /// Haiku once more than 70% of the budget is gone
    pub fn choose_text_model(&self) -> TextModel {
        if self.budget_used_fraction() > costs::DOWNGRADE_FRACTION {
            TextModel::Haiku
        } else {
            TextModel::Sonnet
        }
    }

    /// Suggested interval between vision calls; `None` suppresses them.
    pub fn recommended_vision_interval_ms(&self) -> Option<u64> {
        let remaining = self
            .tier
            .max_vision_calls()
            .saturating_sub(self.vision_calls);
        match remaining {
            r if r > 20 => Some(3_000),
            r if r > 10 => Some(5_000),
            r if r > 5 => Some(10_000),
            r if r > 0 => Some(15_000),
            _ => None,
        }
    }

    pub fn limit_reached(&self) -> bool {
        self.limit_reached
    }

    pub fn total_usd(&self) -> f64 {
        self.total_usd
    }

    pub fn snapshot(&self) -> CostSnapshot {
        CostSnapshot {
            vision_calls: self.vision_calls,
            sonnet_calls: self.sonnet_calls,
            haiku_calls: self.haiku_calls,
            tts_characters: self.tts_characters,
            transcription_seconds: self.transcription_seconds,
            total_usd: self.total_usd,
            budget_usd: self.tier.budget_usd(),
            limit_reached: self.limit_reached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_cap_enforced_on_free_tier() {
        let mut guard = CostGuard::new(Tier::Free);
        for _ in 0..10 {
            assert!(guard.can_call_vision());
            guard.record_vision();
        }
        assert!(!guard.can_call_vision());
        assert_eq!(guard.snapshot().vision_calls, 10);
    }

    #[test]
    fn budget_blocks_vision_before_count_cap() {
        let mut guard = CostGuard::new(Tier::Free);
        // Burn the $0.15 budget with sonnet calls (19 * 0.008 = 0.152)
        for _ in 0..19 {
            guard.record_text(TextModel::Sonnet);
        }
        assert!(guard.limit_reached());
        assert!(!guard.can_call_vision());
    }

    #[test]
    fn text_cap_counts_both_models() {
        let mut guard = CostGuard::new(Tier::Free);
        for _ in 0..25 {
            guard.record_text(TextModel::Haiku);
        }
        for _ in 0..25 {
            guard.record_text(TextModel::Sonnet);
        }
        assert!(!guard.can_call_text());
    }

    #[test]
    fn warning_fires_once_at_threshold() {
        let mut guard = CostGuard::new(Tier::Free);
        // 80% of $0.15 is $0.12 → 15 sonnet calls
        for _ in 0..14 {
            guard.record_text(TextModel::Sonnet);
            assert!(guard.check_warning_threshold().is_none());
        }
        guard.record_text(TextModel::Sonnet);
        assert!(guard.check_warning_threshold().is_some());
        guard.record_text(TextModel::Sonnet);
        assert!(guard.check_warning_threshold().is_none());
    }

    #[test]
    fn model_downgrades_past_seventy_percent() {
        let mut guard = CostGuard::new(Tier::Paid);
        assert_eq!(guard.choose_text_model(), TextModel::Sonnet);
        // 0.7 * $0.50 = $0.35 → 44 sonnet calls puts us past it
        for _ in 0..44 {
            guard.record_text(TextModel::Sonnet);
        }
        assert_eq!(guard.choose_text_model(), TextModel::Haiku);
    }

    #[test]
    fn vision_interval_backs_off() {
        let mut guard = CostGuard::new(Tier::Paid);
        assert_eq!(guard.recommended_vision_interval_ms(), Some(3_000));
        for _ in 0..25 {
            guard.record_vision();
        }
        // 15 remaining
        assert_eq!(guard.recommended_vision_interval_ms(), Some(5_000));
        for _ in 0..7 {
            guard.record_vision();
        }
        // 8 remaining
        assert_eq!(guard.recommended_vision_interval_ms(), Some(10_000));
        for _ in 0..5 {
            guard.record_vision();
        }
        // 3 remaining
        assert_eq!(guard.recommended_vision_interval_ms(), Some(15_000));
        for _ in 0..3 {
            guard.record_vision();
        }
        assert_eq!(guard.recommended_vision_interval_ms(), None);
    }

    #[test]
    fn tts_and_transcription_accumulate() {
        let mut guard = CostGuard::new(Tier::Paid);
        guard.record_tts(1_000);
        guard.record_transcription(60.0);
        let snapshot = guard.snapshot();
        assert_eq!(snapshot.tts_characters, 1_000);
        assert!((snapshot.transcription_seconds - 60.0).abs() < 1e-9);
        // 1000 * 0.00003 + 60 * 0.0001 = 0.03 + 0.006
        assert!((snapshot.total_usd - 0.036).abs() < 1e-9);
    }
}
