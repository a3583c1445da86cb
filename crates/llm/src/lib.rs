//! LLM provider backends
//!
//! One HTTP backend speaks the Messages API; the factory instantiates it
//! twice, once per tier, with the model names taken from configuration.
//! The decision layers only ever see the [`redi_core::LanguageModel`]
//! trait, so tests substitute in-process doubles.

pub mod backend;
pub mod factory;

pub use backend::{HttpLanguageModel, LlmSettings};
pub use factory::{build_tiers, ModelTiers};

use thiserror::Error;

/// LLM backend error; converted to [`redi_core::Error`] at the trait
/// boundary.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned status {0}: {1}")]
    Status(u16, String),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),
}

impl From<LlmError> for redi_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(ms) => redi_core::Error::Timeout(ms),
            other => redi_core::Error::Provider(other.to_string()),
        }
    }
}
