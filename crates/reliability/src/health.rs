//! Component health monitoring
//!
//! Registered probes are sampled every 5 seconds by a background task.
//! Overall status is the worst component status: one failed component
//! fails the process view, one degraded component degrades it.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use redi_config::constants::reliability::HEALTH_INTERVAL_MS;

/// Monitored components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    ObjectDetection,
    AudioClassification,
    CloudConnection,
    Transcription,
    Tts,
    Llm,
}

impl Component {
    pub fn as_str(self) -> &'static str {
        match self {
            Component::ObjectDetection => "object_detection",
            Component::AudioClassification => "audio_classification",
            Component::CloudConnection => "cloud_connection",
            Component::Transcription => "transcription",
            Component::Tts => "tts",
            Component::Llm => "llm",
        }
    }
}

/// Health of a single component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    Healthy,
    Degraded,
    Failed,
}

/// Aggregate status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Failed,
}

/// A health probe for one component
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> ComponentHealth;
}

/// Moving latency view the monitor maintains alongside probe results
#[derive(Debug, Clone, Copy, Default)]
pub struct MovingLatencies {
    pub vision_ms: f64,
    pub audio_ms: f64,
    pub response_ms: f64,
}

/// Process-wide health monitor
pub struct HealthMonitor {
    probes: RwLock<HashMap<Component, Arc<dyn HealthProbe>>>,
    statuses: RwLock<HashMap<Component, ComponentHealth>>,
    latencies: RwLock<MovingLatencies>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            probes: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
            latencies: RwLock::new(MovingLatencies::default()),
        }
    }

    /// Register a probe; its component reports Healthy until first sampled.
    pub fn register(&self, component: Component, probe: Arc<dyn HealthProbe>) {
        self.probes.write().insert(component, probe);
        self.statuses.write().insert(component, ComponentHealth::Healthy);
    }

    /// Run one sampling pass over all registered probes.
    pub async fn sample(&self) {
        let probes: Vec<(Component, Arc<dyn HealthProbe>)> = self
            .probes
            .read()
            .iter()
            .map(|(c, p)| (*c, p.clone()))
            .collect();

        for (component, probe) in probes {
            let health = probe.check().await;
            if health != ComponentHealth::Healthy {
                tracing::warn!(component = component.as_str(), status = ?health, "component unhealthy");
            }
            self.statuses.write().insert(component, health);
        }
    }

    pub fn component_status(&self, component: Component) -> Option<ComponentHealth> {
        self.statuses.read().get(&component).copied()
    }

    /// Worst status across sampled components
    pub fn overall(&self) -> OverallHealth {
        let statuses = self.statuses.read();
        if statuses.values().any(|s| *s == ComponentHealth::Failed) {
            OverallHealth::Failed
        } else if statuses.values().any(|s| *s == ComponentHealth::Degraded) {
            OverallHealth::Degraded
        } else {
            OverallHealth::Healthy
        }
    }

    /// Fold a latency observation into the moving view (EMA, weight 0.2)
    pub fn record_vision_latency(&self, ms: f64) {
        let mut l = self.latencies.write();
        l.vision_ms = ema(l.vision_ms, ms);
    }

    pub fn record_audio_latency(&self, ms: f64) {
        let mut l = self.latencies.write();
        l.audio_ms = ema(l.audio_ms, ms);
    }

    pub fn record_response_latency(&self, ms: f64) {
        let mut l = self.latencies.write();
        l.response_ms = ema(l.response_ms, ms);
    }

    pub fn latencies(&self) -> MovingLatencies {
        *self.latencies.read()
    }

    /// Spawn the periodic sampling task. Returns a shutdown sender.
    pub fn start(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(HEALTH_INTERVAL_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        monitor.sample().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("health monitor shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

fn ema(current: f64, sample: f64) -> f64 {
    if current == 0.0 {
        sample
    } else {
        current * 0.8 + sample * 0.2
    }
}
