//! Per-session metrics, cross-session aggregates, and threshold alerting
//!
//! Session metrics are plain values owned by the session's decision task,
//! not global maps keyed by session id. The [`MetricsRegistry`] holds a
//! shared handle per active session purely for aggregation; session end
//! removes it.

pub mod aggregate;
pub mod alerts;
pub mod session;

pub use aggregate::{AggregateSnapshot, ComponentAggregate, MetricsRegistry};
pub use alerts::{Alert, AlertManager, AlertSeverity};
pub use session::{ComponentStats, LatencyStats, SessionMetrics};
