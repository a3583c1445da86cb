//! Reliability layer: circuit breakers, health monitoring, fallback chains
//!
//! Every externally-dependent call in the decision pipeline passes through
//! this crate. Breakers keep a failing provider from stalling sessions;
//! fallback chains walk an ordered list of backends, skipping any whose
//! breaker is open; the health monitor samples component probes and exposes
//! an aggregate status for the `/health` endpoint.

pub mod breaker;
pub mod fallback;
pub mod health;

pub use breaker::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState, Dependency};
pub use fallback::{chains, run_chain, ChainOutcome, NONE_BACKEND};
pub use health::{Component, ComponentHealth, HealthMonitor, HealthProbe, OverallHealth};
