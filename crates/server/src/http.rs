//! HTTP surface: session lifecycle, health, cost ledger

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use redi_agent::Tier;
use redi_core::{SessionDescriptor, SessionMode, VoiceGender};
use redi_reliability::OverallHealth;

use crate::manager::CreateSessionOptions;
use crate::state::AppState;
use crate::websocket::WebSocketHandler;
use crate::ServerError;

/// Build the full router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/join", post(join_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/end", post(end_session))
        .route("/sessions/:id/pause", post(pause_session))
        .route("/sessions/:id/resume", post(resume_session))
        .route("/sessions/:id/cost", get(get_cost))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/ws/:id", get(WebSocketHandler::handle))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub host_device_id: String,
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(default)]
    pub sensitivity: Option<f32>,
    #[serde(default)]
    pub voice_gender: VoiceGender,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_duration() -> u32 {
    30
}

#[derive(Debug, Deserialize)]
pub struct JoinSessionRequest {
    pub join_code: String,
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub descriptor: SessionDescriptor,
    pub remaining_seconds: i64,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let options = CreateSessionOptions {
        mode: request.mode,
        sensitivity: request.sensitivity,
        voice_gender: request.voice_gender,
        duration_minutes: request.duration_minutes,
        tier: if request.paid { Tier::Paid } else { Tier::Free },
        user_id: request.user_id,
    };
    let session = state.sessions.create_session(
        options,
        request.host_device_id,
        state.tiers.as_ref(),
        Some(state.vision.clone()),
    )?;
    Ok(Json(SessionResponse {
        descriptor: session.descriptor(),
        remaining_seconds: session.remaining().num_seconds(),
    }))
}

async fn join_session(
    State(state): State<AppState>,
    Json(request): Json<JoinSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .sessions
        .join_session(&request.join_code, request.device_id)?;
    Ok(Json(SessionResponse {
        descriptor: session.descriptor(),
        remaining_seconds: session.remaining().num_seconds(),
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.sessions.validate_session(&id)?;
    Ok(Json(SessionResponse {
        descriptor: session.descriptor(),
        remaining_seconds: session.remaining().num_seconds(),
    }))
}

async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<redi_agent::CostSnapshot>, ApiError> {
    let final_cost = state.sessions.end_session(&id).await?;
    Ok(Json(final_cost))
}

async fn pause_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.sessions.pause_session(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resume_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.sessions.resume_session(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_cost(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<redi_agent::CostSnapshot>, ApiError> {
    let session = state.sessions.get(&id)?;
    Ok(Json(session.cost_snapshot()))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    active_sessions: usize,
    vision_latency_ms: f64,
    audio_latency_ms: f64,
    response_latency_ms: f64,
}

/// Render the Prometheus registry
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.health.overall() {
        OverallHealth::Healthy => "healthy",
        OverallHealth::Degraded => "degraded",
        OverallHealth::Failed => "failed",
    };
    let latencies = state.health.latencies();
    Json(HealthResponse {
        status,
        active_sessions: state.sessions.count(),
        vision_latency_ms: latencies.vision_ms,
        audio_latency_ms: latencies.audio_ms,
        response_latency_ms: latencies.response_ms,
    })
}

/// API error wrapper mapping session errors to status codes and stable
/// reason codes.
pub struct ApiError(ServerError);

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ServerError::SessionNotFound | ServerError::InvalidJoinCode => StatusCode::NOT_FOUND,
            ServerError::SessionExpired | ServerError::SessionEnded => StatusCode::GONE,
            ServerError::SessionFull | ServerError::CapacityReached => StatusCode::CONFLICT,
            ServerError::HostMayNotLeave | ServerError::NotHost => StatusCode::FORBIDDEN,
            ServerError::JoinCodeSpaceExhausted => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = Json(serde_json::json!({
            "error": self.0.reason_code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_parses_with_defaults() {
        let json = r#"{"host_device_id": "dev-1"}"#;
        let request: CreateSessionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.mode, SessionMode::General);
        assert_eq!(request.duration_minutes, 30);
        assert!(!request.paid);
    }

    #[test]
    fn error_mapping_is_stable() {
        let response = ApiError(ServerError::InvalidJoinCode).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = ApiError(ServerError::SessionExpired).into_response();
        assert_eq!(response.status(), StatusCode::GONE);
        let response = ApiError(ServerError::NotHost).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
