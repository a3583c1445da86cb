//! Decision layers: admission pipeline, triage, and reasoning routing
//!
//! Three layers sit between perception and speech:
//! - [`triage`]: the fast classifier deciding silent / quick / reasoning
//! - [`reasoning`]: deep-model routing for complex questions, with the
//!   thinking-acknowledgment timer and direct-answer post-filters
//! - [`pipeline`]: the six-guard admission gate every candidate response
//!   must pass before it can be spoken
//!
//! [`filters`] holds the compiled pattern tables both the content guard
//! and the post-filters draw from.

pub mod filters;
pub mod pipeline;
pub mod reasoning;
pub mod triage;

pub use filters::{clean_direct_answer, content_violation, SAFE_RESPONSES};
pub use pipeline::{PipelineConfig, ResponsePipeline, SpeechFlags, Verdict};
pub use reasoning::{is_complex_question, ReasoningOutcome, ReasoningRequest, ReasoningRouter};
pub use triage::{SilenceReason, TriageDecision, TriageEngine, TriageInput, TriageOutcome};
