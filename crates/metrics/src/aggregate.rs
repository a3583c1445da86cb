//! Cross-session aggregation
//!
//! The registry holds one shared metrics handle per active session.
//! Aggregation folds totals (success rates) and takes the worst observed
//! p95 per component. Removing a session on cleanup is part of the session
//! teardown contract.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::session::SessionMetrics;

/// Aggregated view of one component across sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentAggregate {
    pub attempts: u64,
    pub successes: u64,
    /// Worst p95 observed in any session (ms)
    pub worst_p95_ms: f64,
}

impl ComponentAggregate {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            1.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// Snapshot of all components at one aggregation pass
#[derive(Debug, Clone, Default)]
pub struct AggregateSnapshot {
    pub components: HashMap<&'static str, ComponentAggregate>,
    pub active_sessions: usize,
}

impl AggregateSnapshot {
    pub fn component(&self, name: &str) -> Option<&ComponentAggregate> {
        self.components.get(name)
    }
}

/// Registry of active sessions' metrics handles
#[derive(Default)]
pub struct MetricsRegistry {
    sessions: DashMap<String, Arc<Mutex<SessionMetrics>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register the metrics handle for a new session
    pub fn register(&self, session_id: &str) -> Arc<Mutex<SessionMetrics>> {
        let handle = Arc::new(Mutex::new(SessionMetrics::new()));
        self.sessions.insert(session_id.to_string(), handle.clone());
        handle
    }

    /// Drop a session's handle at cleanup
    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Fold all sessions into one snapshot
    pub fn aggregate(&self) -> AggregateSnapshot {
        let mut snapshot = AggregateSnapshot {
            active_sessions: self.sessions.len(),
            ..Default::default()
        };

        for entry in self.sessions.iter() {
            let metrics = entry.value().lock();
            for (component, stats) in metrics.components() {
                let agg = snapshot.components.entry(component).or_default();
                agg.attempts += stats.attempts;
                agg.successes += stats.successes;
            }
            for (component, latency) in metrics.latencies() {
                let agg = snapshot.components.entry(component).or_default();
                agg.worst_p95_ms = agg.worst_p95_ms.max(latency.p95());
            }
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_sums_attempts_across_sessions() {
        let registry = MetricsRegistry::new();
        let a = registry.register("a");
        let b = registry.register("b");

        a.lock().record_outcome("vision", true);
        a.lock().record_outcome("vision", false);
        b.lock().record_outcome("vision", true);

        let snapshot = registry.aggregate();
        let vision = snapshot.component("vision").unwrap();
        assert_eq!(vision.attempts, 3);
        assert_eq!(vision.successes, 2);
        assert!((vision.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_takes_worst_p95() {
        let registry = MetricsRegistry::new();
        let a = registry.register("a");
        let b = registry.register("b");

        a.lock().record_latency("text", 100.0);
        b.lock().record_latency("text", 900.0);

        let snapshot = registry.aggregate();
        assert_eq!(snapshot.component("text").unwrap().worst_p95_ms, 900.0);
    }

    #[test]
    fn remove_releases_session_state() {
        let registry = MetricsRegistry::new();
        registry.register("gone");
        assert!(registry.contains("gone"));
        registry.remove("gone");
        assert!(!registry.contains("gone"));
        assert_eq!(registry.session_count(), 0);
    }
}
