//! WebSocket handler
//!
//! One connection per device. Perception packets stream in and are fed to
//! the session's decision task with newest-wins semantics; approved
//! responses, thinking acknowledgments, rep counts, and reliability alerts
//! stream out. Speech signals are applied to the shared interruption flags
//! immediately, not queued behind the decision chain.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use redi_agent::{SessionCommand, SessionEvent};
use redi_core::{PerceptionPacket, ResponseSource, SessionMode, TtsRequest, VoiceGender};
use redi_metrics::AlertSeverity;

use crate::manager::ManagedSession;
use crate::state::AppState;

/// Messages exchanged over the session WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Client → server: one perception packet
    Perception { packet: PerceptionPacket },
    /// Client → server: the user began speaking
    UserSpeechStart,
    /// Client → server: the user stopped speaking
    UserSpeechStop,
    /// Client → server: a question addressed directly to the assistant
    DirectQuestion { text: String },
    /// Client → server: sensitivity change
    SetSensitivity { value: f32 },
    /// Client → server: mode change
    SetMode { mode: SessionMode },
    /// Client → server: end the session
    EndSession,
    Ping,

    /// Server → client: session descriptor at handshake
    SessionInfo {
        descriptor: redi_core::SessionDescriptor,
    },
    /// Server → client: approved response text
    Response { text: String, source: ResponseSource },
    /// Server → client: synthesized speech for the preceding response
    ResponseAudio { data: String },
    /// Server → client: out-of-band thinking acknowledgment
    Thinking { text: String },
    /// Server → client: rep counter advanced
    Rep { count: u32 },
    /// Server → client: reliability alert raised or resolved
    Alert {
        id: String,
        severity: String,
        component: String,
        message: String,
        resolved: bool,
    },
    /// Server → client: structured failure reason
    Error { reason: String },
    Pong,
    /// Server → client: session is over
    SessionEnded { reason: String },
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub device_id: Option<String>,
}

/// WebSocket handler
pub struct WebSocketHandler;

impl WebSocketHandler {
    /// Handle WebSocket upgrade for a session
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
        Path(session_id): Path<String>,
        Query(query): Query<WsQuery>,
    ) -> Result<Response, axum::http::StatusCode> {
        let session = state
            .sessions
            .validate_session(&session_id)
            .map_err(|_| axum::http::StatusCode::NOT_FOUND)?;
        let device_id = query
            .device_id
            .unwrap_or_else(|| session.host_device_id.clone());

        Ok(ws.on_upgrade(move |socket| Self::handle_socket(socket, session, state, device_id)))
    }

    async fn handle_socket(
        socket: WebSocket,
        session: Arc<ManagedSession>,
        state: AppState,
        device_id: String,
    ) {
        let (sender, mut receiver) = socket.split();
        let sender = Arc::new(tokio::sync::Mutex::new(sender));

        // Handshake: descriptor first
        send_message(
            &sender,
            &WsMessage::SessionInfo {
                descriptor: session.descriptor(),
            },
        )
        .await;

        // Forward decision-task events to this socket
        let Some(mut events) = session.subscribe() else {
            send_message(
                &sender,
                &WsMessage::Error {
                    reason: "session_ended".into(),
                },
            )
            .await;
            return;
        };

        let event_task = {
            let sender = sender.clone();
            let session = session.clone();
            let state = state.clone();
            let mut alerts = state.alerts.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        event = events.recv() => {
                            let Ok(event) = event else { break };
                            match event {
                                SessionEvent::Response { text, source } => {
                                    send_message(
                                        &sender,
                                        &WsMessage::Response {
                                            text: text.clone(),
                                            source,
                                        },
                                    )
                                    .await;
                                    speak(&state, &session, &sender, &text).await;
                                }
                                SessionEvent::Thinking(text) => {
                                    send_message(
                                        &sender,
                                        &WsMessage::Thinking { text: text.clone() },
                                    )
                                    .await;
                                    speak(&state, &session, &sender, &text).await;
                                }
                                SessionEvent::Rep(count) => {
                                    send_message(&sender, &WsMessage::Rep { count }).await;
                                }
                            }
                        }
                        alert = alerts.recv() => {
                            match alert {
                                Ok(alert) => {
                                    send_message(
                                        &sender,
                                        &WsMessage::Alert {
                                            id: alert.id,
                                            severity: severity_label(alert.severity).to_string(),
                                            component: alert.component.to_string(),
                                            message: alert.message,
                                            resolved: alert.resolved,
                                        },
                                    )
                                    .await;
                                }
                                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                            }
                        }
                    }
                }
            })
        };

        // Inbound loop
        while let Some(message) = receiver.next().await {
            let Ok(message) = message else { break };
            match message {
                Message::Text(text) => {
                    let parsed: Result<WsMessage, _> = serde_json::from_str(&text);
                    match parsed {
                        Ok(incoming) => {
                            session.touch(&device_id);
                            if Self::dispatch(incoming, &session, &state, &sender).await {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "unparseable ws message");
                            send_message(
                                &sender,
                                &WsMessage::Error {
                                    reason: "malformed_message".into(),
                                },
                            )
                            .await;
                        }
                    }
                }
                Message::Close(_) => break,
                // Binary audio frames are not handled by the core
                _ => {}
            }
        }

        event_task.abort();
        tracing::debug!(session = %session.id, device = %device_id, "websocket closed");
    }

    /// Apply one client message. Returns true when the connection should
    /// close.
    async fn dispatch(
        message: WsMessage,
        session: &Arc<ManagedSession>,
        state: &AppState,
        sender: &SharedSink,
    ) -> bool {
        match message {
            WsMessage::Perception { packet } => {
                session.submit_packet(packet);
            }
            WsMessage::UserSpeechStart => {
                session.set_user_speaking(true);
            }
            WsMessage::UserSpeechStop => {
                session.set_user_speaking(false);
            }
            WsMessage::DirectQuestion { text } => {
                session.send(SessionCommand::DirectQuestion(text)).await;
            }
            WsMessage::SetSensitivity { value } => {
                session.change_sensitivity(value).await;
            }
            WsMessage::SetMode { mode } => {
                session.change_mode(mode).await;
            }
            WsMessage::EndSession => {
                let _ = state.sessions.end_session(&session.id).await;
                send_message(
                    sender,
                    &WsMessage::SessionEnded {
                        reason: "ended_by_client".into(),
                    },
                )
                .await;
                return true;
            }
            WsMessage::Ping => {
                send_message(sender, &WsMessage::Pong).await;
            }
            // Server-to-client variants arriving inbound are ignored
            _ => {}
        }
        false
    }
}

type SharedSink = Arc<
    tokio::sync::Mutex<futures::stream::SplitSink<WebSocket, Message>>,
>;

async fn send_message(sender: &SharedSink, message: &WsMessage) {
    if let Ok(json) = serde_json::to_string(message) {
        let mut guard = sender.lock().await;
        let _ = guard.send(Message::Text(json)).await;
    }
}

/// Synthesize and ship audio for an approved response. The call goes
/// through the TTS circuit breaker, and the redi-speaking flag is held
/// for the duration so concurrent approvals fail the interruption guard
/// instead of talking over the playback.
async fn speak(state: &AppState, session: &Arc<ManagedSession>, sender: &SharedSink, text: &str) {
    if !state.tts.is_enabled() {
        return;
    }
    let now_ms = epoch_ms();
    let breaker = state.breakers.get("tts");
    if !breaker.lock().should_attempt(now_ms) {
        tracing::debug!("tts skipped: circuit open");
        return;
    }

    let voice_id = state
        .settings
        .providers
        .tts_voice_id
        .clone()
        .unwrap_or_else(|| default_voice(session.voice_gender));

    session.set_redi_speaking(true);
    let result = state
        .tts
        .synthesize(TtsRequest {
            text: text.to_string(),
            voice_id,
            streaming: false,
        })
        .await;
    match result {
        Ok(audio) => {
            breaker.lock().record_success();
            session.record_tts_cost(text.chars().count());
            send_message(
                sender,
                &WsMessage::ResponseAudio {
                    data: BASE64.encode(audio),
                },
            )
            .await;
        }
        Err(err) => {
            breaker.lock().record_failure(now_ms);
            tracing::warn!(error = %err, "tts synthesis failed");
        }
    }
    session.set_redi_speaking(false);
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn default_voice(gender: VoiceGender) -> String {
    match gender {
        VoiceGender::Female => "voice-female-default".to_string(),
        VoiceGender::Male => "voice-male-default".to_string(),
    }
}

fn severity_label(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Warning => "warning",
        AlertSeverity::Critical => "critical",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_round_trip() {
        let messages = vec![
            WsMessage::UserSpeechStart,
            WsMessage::DirectQuestion {
                text: "why is this".into(),
            },
            WsMessage::SetSensitivity { value: 0.7 },
            WsMessage::SetMode {
                mode: SessionMode::Sports,
            },
            WsMessage::EndSession,
        ];
        for message in messages {
            let json = serde_json::to_string(&message).unwrap();
            let back: WsMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(
                serde_json::to_string(&back).unwrap(),
                json,
                "round trip failed for {}",
                json
            );
        }
    }

    #[test]
    fn message_tags_are_snake_case() {
        let json = serde_json::to_string(&WsMessage::UserSpeechStart).unwrap();
        assert!(json.contains("\"user_speech_start\""));
        let json = serde_json::to_string(&WsMessage::Rep { count: 3 }).unwrap();
        assert!(json.contains("\"rep\""));
    }

    #[test]
    fn alert_message_serializes_for_clients() {
        let message = WsMessage::Alert {
            id: "a-1".into(),
            severity: severity_label(AlertSeverity::Critical).into(),
            component: "tts".into(),
            message: "tts: success 60.0%, p95 2500ms".into(),
            resolved: false,
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"alert\""));
        assert!(json.contains("\"critical\""));
        let back: WsMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&back).unwrap(), json);
    }

    #[test]
    fn perception_message_parses_from_client_json() {
        let json = r#"{
            "type": "perception",
            "packet": {
                "timestamp_ms": 1000,
                "objects": [{"label": "kettle", "confidence": 0.9}],
                "transcript": {"text": "check this", "is_final": true}
            }
        }"#;
        let message: WsMessage = serde_json::from_str(json).unwrap();
        match message {
            WsMessage::Perception { packet } => {
                assert_eq!(packet.objects[0].label, "kettle");
                assert!(packet.transcript.unwrap().is_final);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
