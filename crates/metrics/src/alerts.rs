//! Threshold alerting
//!
//! A sweep every 10 seconds compares the aggregate snapshot against
//! per-component thresholds. An already-active alert of the same
//! (component, severity) is not re-emitted; it resolves when the
//! condition clears.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use redi_config::constants::metrics::ALERT_INTERVAL_MS;

use crate::aggregate::{AggregateSnapshot, MetricsRegistry};

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// A structured alert record
#[derive(Debug, Clone)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub component: &'static str,
    pub message: String,
    pub triggered_at_ms: u64,
    pub resolved: bool,
}

/// Per-component alert thresholds
struct Thresholds {
    component: &'static str,
    warn_success_below: f64,
    critical_success_below: f64,
    /// `None` disables latency alerting for the component
    warn_p95_above_ms: Option<f64>,
    critical_p95_above_ms: Option<f64>,
}

const THRESHOLDS: &[Thresholds] = &[
    Thresholds {
        component: "vision",
        warn_success_below: 0.90,
        critical_success_below: 0.70,
        warn_p95_above_ms: Some(3_000.0),
        critical_p95_above_ms: Some(5_000.0),
    },
    Thresholds {
        component: "text",
        warn_success_below: 0.95,
        critical_success_below: 0.80,
        warn_p95_above_ms: Some(2_000.0),
        critical_p95_above_ms: Some(4_000.0),
    },
    Thresholds {
        component: "tts",
        warn_success_below: 0.95,
        critical_success_below: 0.80,
        warn_p95_above_ms: Some(1_000.0),
        critical_p95_above_ms: Some(2_000.0),
    },
    Thresholds {
        component: "transcription",
        warn_success_below: 0.98,
        critical_success_below: 0.90,
        warn_p95_above_ms: None,
        critical_p95_above_ms: None,
    },
];

/// Alert evaluation and emission
pub struct AlertManager {
    active: Mutex<Vec<Alert>>,
    tx: broadcast::Sender<Alert>,
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertManager {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            active: Mutex::new(Vec::new()),
            tx,
        }
    }

    /// Observe emitted alerts
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.active.lock().clone()
    }

    /// Evaluate one snapshot. Emits new alerts, resolves cleared ones.
    pub fn check(&self, snapshot: &AggregateSnapshot, now_ms: u64) {
        for thresholds in THRESHOLDS {
            let Some(agg) = snapshot.component(thresholds.component) else {
                continue;
            };
            let rate = agg.success_rate();
            let p95 = agg.worst_p95_ms;

            let critical = (agg.attempts > 0 && rate < thresholds.critical_success_below)
                || thresholds
                    .critical_p95_above_ms
                    .is_some_and(|limit| p95 > limit);
            let warning = (agg.attempts > 0 && rate < thresholds.warn_success_below)
                || thresholds.warn_p95_above_ms.is_some_and(|limit| p95 > limit);

            if critical {
                self.raise(
                    thresholds.component,
                    AlertSeverity::Critical,
                    format!(
                        "{}: success {:.1}%, p95 {:.0}ms",
                        thresholds.component,
                        rate * 100.0,
                        p95
                    ),
                    now_ms,
                );
            } else {
                self.resolve(thresholds.component, AlertSeverity::Critical);
            }

            if warning && !critical {
                self.raise(
                    thresholds.component,
                    AlertSeverity::Warning,
                    format!(
                        "{}: success {:.1}%, p95 {:.0}ms",
                        thresholds.component,
                        rate * 100.0,
                        p95
                    ),
                    now_ms,
                );
            } else {
                self.resolve(thresholds.component, AlertSeverity::Warning);
            }
        }
    }

    fn raise(&self, component: &'static str, severity: AlertSeverity, message: String, now_ms: u64) {
        let mut active = self.active.lock();
        let exists = active
            .iter()
            .any(|a| a.component == component && a.severity == severity && !a.resolved);
        if exists {
            return;
        }
        let alert = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            severity,
            component,
            message,
            triggered_at_ms: now_ms,
            resolved: false,
        };
        tracing::warn!(component, severity = ?severity, message = %alert.message, "alert raised");
        active.push(alert.clone());
        let _ = self.tx.send(alert);
    }

    fn resolve(&self, component: &'static str, severity: AlertSeverity) {
        let mut active = self.active.lock();
        for alert in active.iter_mut() {
            if alert.component == component && alert.severity == severity && !alert.resolved {
                alert.resolved = true;
                tracing::info!(component, severity = ?severity, "alert resolved");
                let _ = self.tx.send(alert.clone());
            }
        }
        active.retain(|a| !a.resolved);
    }

    /// Spawn the periodic sweep over the registry's aggregate snapshot.
    pub fn start(self: &Arc<Self>, registry: Arc<MetricsRegistry>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(ALERT_INTERVAL_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now_ms = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .map(|d| d.as_millis() as u64)
                            .unwrap_or(0);
                        manager.check(&registry.aggregate(), now_ms);
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("alert manager shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ComponentAggregate;
    use std::collections::HashMap;

    fn snapshot(component: &'static str, attempts: u64, successes: u64, p95: f64) -> AggregateSnapshot {
        let mut components = HashMap::new();
        components.insert(
            component,
            ComponentAggregate {
                attempts,
                successes,
                worst_p95_ms: p95,
            },
        );
        AggregateSnapshot {
            components,
            active_sessions: 1,
        }
    }

    #[test]
    fn low_success_raises_warning() {
        let manager = AlertManager::new();
        // vision at 85% success: warn threshold is 90%
        manager.check(&snapshot("vision", 100, 85, 100.0), 0);
        let active = manager.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, AlertSeverity::Warning);
        assert_eq!(active[0].component, "vision");
    }

    #[test]
    fn very_low_success_raises_critical_only() {
        let manager = AlertManager::new();
        manager.check(&snapshot("vision", 100, 60, 100.0), 0);
        let active = manager.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn duplicate_alert_not_re_emitted() {
        let manager = AlertManager::new();
        let mut rx = manager.subscribe();
        manager.check(&snapshot("tts", 100, 90, 100.0), 0);
        manager.check(&snapshot("tts", 100, 90, 100.0), 10_000);
        assert_eq!(manager.active_alerts().len(), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn alert_resolves_when_condition_clears() {
        let manager = AlertManager::new();
        manager.check(&snapshot("text", 100, 90, 100.0), 0);
        assert_eq!(manager.active_alerts().len(), 1);
        manager.check(&snapshot("text", 200, 198, 100.0), 10_000);
        assert!(manager.active_alerts().is_empty());
    }

    #[test]
    fn latency_alone_can_trigger() {
        let manager = AlertManager::new();
        // Perfect success rate, terrible p95
        manager.check(&snapshot("text", 100, 100, 4_500.0), 0);
        let active = manager.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, AlertSeverity::Critical);
    }

    #[test]
    fn transcription_has_no_latency_threshold() {
        let manager = AlertManager::new();
        manager.check(&snapshot("transcription", 100, 100, 60_000.0), 0);
        assert!(manager.active_alerts().is_empty());
    }

    #[test]
    fn idle_component_does_not_alert() {
        let manager = AlertManager::new();
        manager.check(&snapshot("vision", 0, 0, 0.0), 0);
        assert!(manager.active_alerts().is_empty());
    }
}
