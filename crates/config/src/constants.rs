//! Centralized constants for the orchestration core
//!
//! Single source of truth for decision thresholds and operational defaults.
//! Values here are part of the user-observable contract (sensitivity mapping,
//! guard windows, word caps); change them only with a client-facing
//! migration plan.

/// Response admission pipeline defaults
pub mod pipeline {
    /// Maximum perception context age for unprompted responses (ms)
    pub const MAX_CONTEXT_AGE_UNPROMPTED_MS: u64 = 2_000;
    /// Maximum perception context age for prompted responses (ms)
    pub const MAX_CONTEXT_AGE_PROMPTED_MS: u64 = 5_000;
    /// Word cap for unprompted responses
    pub const MAX_WORDS_UNPROMPTED: usize = 8;
    /// Word cap for prompted responses
    pub const MAX_WORDS_PROMPTED: usize = 25;
    /// Minimum gap between unprompted responses (ms); prompted bypasses
    pub const MIN_GAP_UNPROMPTED_MS: u64 = 3_000;
    /// Jaccard similarity at or above which a candidate is a duplicate
    pub const DEDUP_SIMILARITY_THRESHOLD: f32 = 0.60;
    /// How many approved responses the dedup guard remembers
    pub const RECENT_RESPONSE_WINDOW: usize = 5;
    /// Tokens of this length or shorter are ignored by the dedup guard
    pub const DEDUP_MIN_TOKEN_LEN: usize = 3;
    /// Ignore responses arriving within this window after an interruption (ms)
    pub const SOFT_CANCEL_WINDOW_MS: u64 = 500;
}

/// Sensitivity mapping (stable across versions, part of the client contract)
pub mod sensitivity {
    /// Minimum gap between unprompted interjections for a sensitivity in
    /// `[0, 1]`: `round(3000 - sensitivity * 2500)` ms.
    pub fn min_gap_ms(sensitivity: f32) -> u64 {
        let s = sensitivity.clamp(0.0, 1.0);
        (3000.0 - f64::from(s) * 2500.0).round() as u64
    }

    /// Insight-confidence threshold for speaking: linear from 0.9 at
    /// sensitivity 0 down to 0.3 at sensitivity 1.
    pub fn speak_threshold(sensitivity: f32) -> f32 {
        let s = sensitivity.clamp(0.0, 1.0);
        0.9 - s * 0.6
    }
}

/// Triage defaults
pub mod triage {
    /// Word cap the fast model is instructed (and post-filtered) to honor
    pub const QUICK_RESPONSE_MAX_WORDS: usize = 15;
    /// Max tokens requested from the fast model
    pub const FAST_MAX_TOKENS: u32 = 75;
    /// Number of recent final transcripts carried as context
    pub const RECENT_CONTEXT_WINDOW: usize = 5;
    /// Recent-context entries included in the quick-response prompt
    pub const PROMPT_CONTEXT_ENTRIES: usize = 2;
    /// Top-N objects and OCR texts included in the quick-response prompt
    pub const PROMPT_TOP_OBJECTS: usize = 3;
    pub const PROMPT_TOP_TEXTS: usize = 3;
}

/// Reasoning router defaults
pub mod reasoning {
    /// Max tokens requested from the deep model
    pub const DEEP_MAX_TOKENS: u32 = 200;
    /// Direct questions longer than this word count always route deep
    pub const DEEP_WORD_THRESHOLD: usize = 10;
    /// Delay before a "thinking" acknowledgment is spoken (ms)
    pub const THINKING_ACK_DELAY_MS: u64 = 2_000;
    /// Recently used thinking phrases to avoid repeating
    pub const THINKING_PHRASE_MEMORY: usize = 5;
    /// Server-side visual context is usable for this long (ms)
    pub const VISUAL_CONTEXT_MAX_AGE_MS: u64 = 5_000;
}

/// Uncertainty hedging bands
pub mod hedging {
    /// Below this scene confidence, unprompted output is suppressed entirely
    pub const SUPPRESS_BELOW: f32 = 0.25;
    /// At or below this, statements get a hedge prefix
    pub const HEDGE_BELOW: f32 = 0.7;
    /// Below this, the stronger hedge set is used
    pub const STRONG_HEDGE_BELOW: f32 = 0.4;
    /// Scene confidence assumed when grounding produced none
    pub const DEFAULT_SCENE_CONFIDENCE: f32 = 0.8;
}

/// Cost guard tier profiles and unit costs (USD)
pub mod cost {
    /// Per-session budget, free tier
    pub const FREE_BUDGET_USD: f64 = 0.15;
    pub const FREE_MAX_VISION_CALLS: u32 = 10;
    pub const FREE_MAX_TEXT_CALLS: u32 = 50;
    pub const FREE_WARN_FRACTION: f64 = 0.80;

    /// Per-session budget, paid tier
    pub const PAID_BUDGET_USD: f64 = 0.50;
    pub const PAID_MAX_VISION_CALLS: u32 = 40;
    pub const PAID_MAX_TEXT_CALLS: u32 = 200;
    pub const PAID_WARN_FRACTION: f64 = 0.90;

    /// Unit costs
    pub const VISION_CALL_USD: f64 = 0.015;
    pub const SONNET_CALL_USD: f64 = 0.008;
    pub const HAIKU_CALL_USD: f64 = 0.001;
    pub const TTS_PER_CHAR_USD: f64 = 0.000_03;
    pub const TRANSCRIPTION_PER_SEC_USD: f64 = 0.000_1;

    /// Budget fraction past which the text tier downgrades to the cheap model
    pub const DOWNGRADE_FRACTION: f64 = 0.70;
}

/// Reliability layer defaults
pub mod reliability {
    /// Health probe sampling interval (ms)
    pub const HEALTH_INTERVAL_MS: u64 = 5_000;
    /// Circuit breaker defaults
    pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;
    pub const BREAKER_RECOVERY_MS: u64 = 30_000;
    pub const BREAKER_HALF_OPEN_SUCCESSES: u32 = 2;
}

/// Metrics and alerting
pub mod metrics {
    /// Latency ring size for percentile computation
    pub const LATENCY_RING: usize = 100;
    /// Exponential moving average weight for a new latency sample
    pub const EMA_WEIGHT: f64 = 0.2;
    /// Alert sweep interval (ms)
    pub const ALERT_INTERVAL_MS: u64 = 10_000;
}

/// Session manager limits
pub mod session {
    /// Join code alphabet; visually ambiguous characters excluded (I, O, 0, 1)
    pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    pub const JOIN_CODE_LEN: usize = 6;
    /// Attempts at a globally unique code before giving up
    pub const JOIN_CODE_RETRIES: usize = 10;
    /// Participants per session, host included
    pub const MAX_PARTICIPANTS: usize = 5;
    /// Sessions expired longer than this are swept (ms)
    pub const CLEANUP_GRACE_MS: u64 = 3_600_000;
}
