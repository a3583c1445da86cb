//! Session orchestration
//!
//! One [`SessionOrchestrator`] per session owns all decision state and
//! serializes the rule → triage → reasoning → admission chain. The
//! [`task`] module wraps it in a spawned decision task fed by a
//! newest-wins coalescing queue, which is the concurrency contract the
//! admission guards rely on.

pub mod cost;
pub mod orchestrator;
pub mod task;
pub mod thinking;

pub use cost::{CostGuard, CostSnapshot, TextModel, Tier};
pub use orchestrator::{Decision, OrchestratorConfig, SessionOrchestrator};
pub use task::{SessionCommand, SessionEvent, SessionTask};
pub use thinking::ThinkingPhrases;
