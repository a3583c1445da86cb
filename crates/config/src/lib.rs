//! Configuration for the Redi orchestration server
//!
//! - [`Settings`]: layered runtime configuration (defaults → file → env)
//! - [`constants`]: the single source of truth for decision thresholds,
//!   guard defaults, tier profiles, and alerting limits
//! - [`modes`]: per-mode defaults (sensitivity)

pub mod constants;
pub mod modes;
pub mod settings;

pub use settings::{ObservabilityConfig, ProviderConfig, ServerConfig, SessionConfig, Settings};

use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
