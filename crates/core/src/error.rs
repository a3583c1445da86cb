//! Error types shared across the workspace

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// External provider call failed (network, 5xx, malformed body)
    #[error("provider error: {0}")]
    Provider(String),

    /// Provider call exceeded its deadline
    #[error("provider timeout after {0}ms")]
    Timeout(u64),

    /// Collaborator is disabled (missing API key)
    #[error("{0} is disabled: no API key configured")]
    Disabled(&'static str),

    /// A perception packet failed validation and was dropped
    #[error("malformed perception packet: {0}")]
    MalformedPacket(String),

    /// Session-level invariant violation
    #[error("session error: {0}")]
    Session(String),

    /// Configuration problem detected at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Circuit breaker rejected the call
    #[error("circuit open for {0}")]
    CircuitOpen(String),
}

pub type Result<T> = std::result::Result<T, Error>;
