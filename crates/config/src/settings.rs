//! Main settings module
//!
//! Layered loading: built-in defaults → optional TOML file → `REDI__`
//! environment variables. A missing provider key is not an error; the
//! collaborator it belongs to is simply disabled and the fallback chains
//! degrade around it.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// External provider configuration
    #[serde(default)]
    pub providers: ProviderConfig,

    /// Session limits
    #[serde(default)]
    pub session: SessionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty means same-origin only
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// External provider configuration.
///
/// Model names and voice identities are configuration, never hard-coded in
/// the decision layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// LLM API key; absence disables both model tiers
    #[serde(default)]
    pub llm_api_key: Option<String>,
    /// Deep-reasoning model name
    #[serde(default = "default_deep_model")]
    pub deep_model: String,
    /// Fast-triage model name
    #[serde(default = "default_fast_model")]
    pub fast_model: String,
    /// LLM API endpoint
    #[serde(default = "default_llm_endpoint")]
    pub llm_endpoint: String,
    /// TTS API key; absence disables speech output
    #[serde(default)]
    pub tts_api_key: Option<String>,
    /// Default TTS voice id
    #[serde(default)]
    pub tts_voice_id: Option<String>,
    /// Optional TTS region for latency-local endpoints
    #[serde(default)]
    pub tts_region: Option<String>,
    /// Transcription provider key; absence disables transcription
    #[serde(default)]
    pub transcription_api_key: Option<String>,
    /// Cloud vision key; absence disables the cloud grounding source
    #[serde(default)]
    pub cloud_vision_api_key: Option<String>,
}

fn default_deep_model() -> String {
    std::env::var("REDI_DEEP_MODEL").unwrap_or_else(|_| "deep-default".to_string())
}

fn default_fast_model() -> String {
    std::env::var("REDI_FAST_MODEL").unwrap_or_else(|_| "fast-default".to_string())
}

fn default_llm_endpoint() -> String {
    std::env::var("REDI_LLM_ENDPOINT")
        .unwrap_or_else(|_| "https://api.anthropic.com".to_string())
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            llm_api_key: std::env::var("REDI_LLM_API_KEY").ok(),
            deep_model: default_deep_model(),
            fast_model: default_fast_model(),
            llm_endpoint: default_llm_endpoint(),
            tts_api_key: std::env::var("REDI_TTS_API_KEY").ok(),
            tts_voice_id: std::env::var("REDI_TTS_VOICE_ID").ok(),
            tts_region: std::env::var("REDI_TTS_REGION").ok(),
            transcription_api_key: std::env::var("REDI_TRANSCRIPTION_API_KEY").ok(),
            cloud_vision_api_key: std::env::var("REDI_CLOUD_VISION_API_KEY").ok(),
        }
    }
}

/// Session manager limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Cleanup sweep interval (seconds)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_max_sessions() -> usize {
    500
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Expose a Prometheus /metrics endpoint
    #[serde(default = "default_true")]
    pub prometheus: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus: default_true(),
        }
    }
}

impl Settings {
    /// Load settings with the default layering.
    ///
    /// `file` is optional; when present it sits between built-in defaults
    /// and environment overrides (`REDI__SERVER__PORT=9000` style).
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(Environment::with_prefix("REDI").separator("__"))
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.apply_env_defaults();
        settings.validate()?;
        Ok(settings)
    }

    /// Fill provider keys from the environment where the file/env layers
    /// left them unset.
    fn apply_env_defaults(&mut self) {
        let defaults = ProviderConfig::default();
        let p = &mut self.providers;
        if p.llm_api_key.is_none() {
            p.llm_api_key = defaults.llm_api_key;
        }
        if p.tts_api_key.is_none() {
            p.tts_api_key = defaults.tts_api_key;
        }
        if p.transcription_api_key.is_none() {
            p.transcription_api_key = defaults.transcription_api_key;
        }
        if p.cloud_vision_api_key.is_none() {
            p.cloud_vision_api_key = defaults.cloud_vision_api_key;
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "session.max_sessions must be at least 1".to_string(),
            ));
        }
        if self.providers.deep_model.is_empty() || self.providers.fast_model.is_empty() {
            return Err(ConfigError::Invalid(
                "providers.deep_model and providers.fast_model must be non-empty".to_string(),
            ));
        }
        if self.providers.llm_api_key.is_none() {
            tracing::warn!("no LLM API key configured; triage and reasoning tiers disabled");
        }
        if self.providers.tts_api_key.is_none() {
            tracing::warn!("no TTS API key configured; speech output disabled");
        }
        Ok(())
    }
}
