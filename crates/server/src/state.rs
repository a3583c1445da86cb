//! Shared application state
//!
//! Process-wide structures only: the session directory, the breaker
//! registry, the health monitor, metric aggregates, and provider handles.
//! Everything per-session lives inside that session's decision task.

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

use redi_config::Settings;
use redi_core::{CloudVision, TextToSpeech};
use redi_llm::ModelTiers;
use redi_metrics::{AlertManager, MetricsRegistry};
use redi_reliability::{
    BreakerRegistry, Component, ComponentHealth, HealthMonitor, HealthProbe,
};

use crate::manager::SessionManager;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: Arc<SessionManager>,
    pub metrics: Arc<MetricsRegistry>,
    pub alerts: Arc<AlertManager>,
    pub health: Arc<HealthMonitor>,
    pub breakers: Arc<BreakerRegistry>,
    pub tiers: Option<ModelTiers>,
    pub tts: Arc<dyn TextToSpeech>,
    pub vision: Arc<dyn CloudVision>,
    /// Prometheus registry handle rendered by the `/metrics` route;
    /// `None` when the exporter is disabled in settings.
    pub prometheus: Option<PrometheusHandle>,
}

/// Probe for collaborators whose liveness is just "configured or not":
/// a keyless provider is a planned degradation, not a failure.
struct ConfiguredProbe {
    configured: bool,
}

#[async_trait]
impl HealthProbe for ConfiguredProbe {
    async fn check(&self) -> ComponentHealth {
        if self.configured {
            ComponentHealth::Healthy
        } else {
            ComponentHealth::Degraded
        }
    }
}

impl AppState {
    /// Build state from settings, wiring providers from their keys.
    pub fn build(settings: Settings) -> anyhow::Result<Self> {
        let providers = &settings.providers;
        let tiers = redi_llm::build_tiers(
            providers.llm_api_key.as_deref(),
            &providers.llm_endpoint,
            &providers.fast_model,
            &providers.deep_model,
        )?;
        let tts = redi_speech::build_tts(
            providers.tts_api_key.as_deref(),
            providers.tts_region.as_deref(),
        )?;
        let vision = redi_vision::build_cloud_vision(providers.cloud_vision_api_key.as_deref())?;

        let prometheus = if settings.observability.prometheus {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| anyhow::anyhow!("prometheus recorder: {}", e))?;
            Some(handle)
        } else {
            None
        };

        let metrics = Arc::new(MetricsRegistry::new());
        let sessions = Arc::new(SessionManager::new(
            settings.session.max_sessions,
            metrics.clone(),
        ));

        let health = Arc::new(HealthMonitor::new());
        health.register(
            Component::Llm,
            Arc::new(ConfiguredProbe {
                configured: tiers.is_some(),
            }),
        );
        health.register(
            Component::Tts,
            Arc::new(ConfiguredProbe {
                configured: tts.is_enabled(),
            }),
        );
        health.register(
            Component::CloudConnection,
            Arc::new(ConfiguredProbe {
                configured: vision.is_enabled(),
            }),
        );
        health.register(
            Component::Transcription,
            Arc::new(ConfiguredProbe {
                configured: providers.transcription_api_key.is_some(),
            }),
        );

        Ok(Self {
            settings: Arc::new(settings),
            sessions,
            metrics,
            alerts: Arc::new(AlertManager::new()),
            health,
            breakers: Arc::new(BreakerRegistry::with_presets()),
            tiers,
            tts,
            vision,
            prometheus,
        })
    }
}
