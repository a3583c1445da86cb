//! HTTP/WebSocket server for the Redi orchestration core
//!
//! - [`manager`]: session directory (join codes, participants, expiry)
//! - [`websocket`]: per-connection streaming of perception packets in and
//!   approved responses out
//! - [`http`]: session lifecycle endpoints, health, cost ledger
//! - [`state`]: shared process-wide registries

pub mod http;
pub mod manager;
pub mod state;
pub mod websocket;

pub use manager::{CreateSessionOptions, ManagedSession, SessionManager};
pub use state::AppState;

use thiserror::Error;

/// Server-level error; session invariant violations surface as structured
/// reason codes at the WebSocket/HTTP boundary.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("session not found")]
    SessionNotFound,

    #[error("invalid join code")]
    InvalidJoinCode,

    #[error("session expired")]
    SessionExpired,

    #[error("session ended")]
    SessionEnded,

    #[error("session is full")]
    SessionFull,

    #[error("maximum session count reached")]
    CapacityReached,

    #[error("host may not leave the session")]
    HostMayNotLeave,

    #[error("only the host may do this")]
    NotHost,

    #[error("could not allocate a unique join code")]
    JoinCodeSpaceExhausted,
}

impl ServerError {
    /// Stable reason code for clients
    pub fn reason_code(&self) -> &'static str {
        match self {
            ServerError::SessionNotFound => "session_not_found",
            ServerError::InvalidJoinCode => "invalid_join_code",
            ServerError::SessionExpired => "session_expired",
            ServerError::SessionEnded => "session_ended",
            ServerError::SessionFull => "session_full",
            ServerError::CapacityReached => "capacity_reached",
            ServerError::HostMayNotLeave => "host_may_not_leave",
            ServerError::NotHost => "not_host",
            ServerError::JoinCodeSpaceExhausted => "join_code_space_exhausted",
        }
    }
}
