//! Perception processing: ensemble grounding and the rule engine
//!
//! This crate turns raw on-device detections into decisions the orchestrator
//! can act on without an LLM call:
//! - [`grounding`]: cross-validates object detections against OCR, audio
//!   events, and optional cloud vision, producing grounded detections with
//!   a per-object source list and a scene confidence
//! - [`rules`]: the ordered, per-mode rule engine with cooldowns and rep
//!   counting, layer 1 of the decision pipeline
//! - [`pose_math`]: joint-angle helpers shared by rule predicates
//! - [`context`]: compact scene description strings for LLM prompts

pub mod context;
pub mod grounding;
pub mod pose_math;
pub mod rules;

pub use context::describe_scene;
pub use grounding::{ground, scene_confidence, GroundingInput};
pub use rules::{RuleCategory, RuleEngine, RuleOutcome};
