//! Session management
//!
//! The session directory is the only process-global map keyed by session
//! id. Each entry owns its decision task; ending a session shuts the task
//! down and releases every per-session structure: orchestrator state,
//! rule cooldowns, pipeline history, cost ledger, the visual-context slot,
//! the metrics handle, the join-code mapping, and the participant map.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use redi_agent::{
    CostGuard, CostSnapshot, OrchestratorConfig, SessionCommand, SessionEvent,
    SessionOrchestrator, SessionTask, Tier,
};
use redi_config::constants::session as limits;
use redi_config::modes::default_sensitivity;
use redi_core::{
    AudioOutputMode, CloudVision, PerceptionPacket, SessionDescriptor, SessionMode, SessionStatus,
    VoiceGender,
};
use redi_decision::{ReasoningRouter, TriageEngine};
use redi_llm::ModelTiers;
use redi_metrics::MetricsRegistry;

use crate::ServerError;

/// Parameters for creating a session
#[derive(Debug, Clone)]
pub struct CreateSessionOptions {
    pub mode: SessionMode,
    /// Defaults to the mode's sensitivity when unset
    pub sensitivity: Option<f32>,
    pub voice_gender: VoiceGender,
    pub duration_minutes: u32,
    pub tier: Tier,
    pub user_id: Option<String>,
}

impl Default for CreateSessionOptions {
    fn default() -> Self {
        Self {
            mode: SessionMode::General,
            sensitivity: None,
            voice_gender: VoiceGender::Female,
            duration_minutes: 30,
            tier: Tier::Free,
            user_id: None,
        }
    }
}

/// A session participant
#[derive(Debug, Clone)]
pub struct Participant {
    pub device_id: String,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// One live session: descriptor data plus the running decision task
pub struct ManagedSession {
    pub id: String,
    pub join_code: String,
    pub host_device_id: String,
    pub user_id: Option<String>,
    pub voice_gender: VoiceGender,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    status: RwLock<SessionStatus>,
    audio_output_mode: RwLock<AudioOutputMode>,
    mode: RwLock<SessionMode>,
    sensitivity: RwLock<f32>,
    participants: RwLock<HashMap<String, Participant>>,
    task: Mutex<Option<SessionTask>>,
    cost: Arc<Mutex<CostGuard>>,
}

impl std::fmt::Debug for ManagedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedSession")
            .field("id", &self.id)
            .field("join_code", &self.join_code)
            .field("host_device_id", &self.host_device_id)
            .field("user_id", &self.user_id)
            .field("voice_gender", &self.voice_gender)
            .field("duration_minutes", &self.duration_minutes)
            .field("started_at", &self.started_at)
            .field("expires_at", &self.expires_at)
            .field("status", &self.status())
            .finish()
    }
}

impl ManagedSession {
    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    pub fn mode(&self) -> SessionMode {
        *self.mode.read()
    }

    pub fn audio_output_mode(&self) -> AudioOutputMode {
        *self.audio_output_mode.read()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.read().len()
    }

    pub fn cost_snapshot(&self) -> CostSnapshot {
        self.cost.lock().snapshot()
    }

    pub fn record_tts_cost(&self, characters: usize) {
        self.cost.lock().record_tts(characters);
    }

    pub fn record_transcription_cost(&self, seconds: f64) {
        self.cost.lock().record_transcription(seconds);
    }

    /// Time left before expiry; zero once past it
    pub fn remaining(&self) -> chrono::Duration {
        (self.expires_at - Utc::now()).max(ChronoDuration::zero())
    }

    pub fn descriptor(&self) -> SessionDescriptor {
        SessionDescriptor {
            id: self.id.clone(),
            join_code: self.join_code.clone(),
            host_device_id: self.host_device_id.clone(),
            user_id: self.user_id.clone(),
            mode: self.mode(),
            sensitivity: *self.sensitivity.read(),
            voice_gender: self.voice_gender,
            duration_minutes: self.duration_minutes,
            started_at: self.started_at,
            expires_at: self.expires_at,
            status: self.status(),
            audio_output_mode: self.audio_output_mode(),
            max_participants: limits::MAX_PARTICIPANTS as u32,
        }
    }

    /// Update a participant's last-active stamp
    pub fn touch(&self, device_id: &str) {
        if let Some(p) = self.participants.write().get_mut(device_id) {
            p.last_active = Utc::now();
        }
    }

    pub fn submit_packet(&self, packet: PerceptionPacket) {
        if let Some(task) = &*self.task.lock() {
            task.submit_packet(packet);
        }
    }

    pub async fn send(&self, command: SessionCommand) {
        let sender = self.task.lock().as_ref().map(|t| t.command_sender());
        if let Some(sender) = sender {
            let _ = sender.send(command).await;
        }
    }

    pub fn subscribe(&self) -> Option<tokio::sync::broadcast::Receiver<SessionEvent>> {
        self.task.lock().as_ref().map(|t| t.subscribe())
    }

    pub fn set_user_speaking(&self, speaking: bool) {
        if let Some(task) = &*self.task.lock() {
            task.set_user_speaking(speaking);
        }
    }

    pub fn set_redi_speaking(&self, speaking: bool) {
        if let Some(task) = &*self.task.lock() {
            task.set_redi_speaking(speaking);
        }
    }

    /// Keep the directory's mode/sensitivity view in sync with the task
    pub async fn change_mode(&self, mode: SessionMode) {
        *self.mode.write() = mode;
        *self.sensitivity.write() = default_sensitivity(mode);
        self.send(SessionCommand::SetMode(mode)).await;
    }

    pub async fn change_sensitivity(&self, sensitivity: f32) {
        *self.sensitivity.write() = sensitivity.clamp(0.0, 1.0);
        self.send(SessionCommand::SetSensitivity(sensitivity)).await;
    }
}

/// Session directory
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<ManagedSession>>>,
    join_codes: RwLock<HashMap<String, String>>,
    max_sessions: usize,
    metrics: Arc<MetricsRegistry>,
}

impl SessionManager {
    pub fn new(max_sessions: usize, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            join_codes: RwLock::new(HashMap::new()),
            max_sessions,
            metrics,
        }
    }

    /// Create a session and spawn its decision task.
    pub fn create_session(
        &self,
        options: CreateSessionOptions,
        host_device_id: impl Into<String>,
        tiers: Option<&ModelTiers>,
        cloud_vision: Option<Arc<dyn CloudVision>>,
    ) -> Result<Arc<ManagedSession>, ServerError> {
        let host_device_id = host_device_id.into();
        {
            let sessions = self.sessions.read();
            if sessions.len() >= self.max_sessions {
                return Err(ServerError::CapacityReached);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let join_code = self.allocate_join_code(&id)?;

        let sensitivity = options
            .sensitivity
            .unwrap_or_else(|| default_sensitivity(options.mode))
            .clamp(0.0, 1.0);

        let metrics_handle = self.metrics.register(&id);
        let mut orchestrator = SessionOrchestrator::new(
            &id,
            OrchestratorConfig {
                mode: options.mode,
                sensitivity,
                tier: options.tier,
            },
            TriageEngine::new(tiers.map(|t| t.fast.clone())),
            ReasoningRouter::new(
                tiers.map(|t| t.fast.clone()),
                tiers.map(|t| t.deep.clone()),
            ),
            metrics_handle,
        );
        if let Some(cloud_vision) = cloud_vision {
            orchestrator = orchestrator.with_cloud_vision(cloud_vision);
        }
        let cost = orchestrator.cost_handle();
        let task = SessionTask::spawn(orchestrator);

        let now = Utc::now();
        let mut participants = HashMap::new();
        participants.insert(
            host_device_id.clone(),
            Participant {
                device_id: host_device_id.clone(),
                is_host: true,
                joined_at: now,
                last_active: now,
            },
        );

        let session = Arc::new(ManagedSession {
            id: id.clone(),
            join_code: join_code.clone(),
            host_device_id,
            user_id: options.user_id,
            voice_gender: options.voice_gender,
            duration_minutes: options.duration_minutes,
            started_at: now,
            expires_at: now + ChronoDuration::minutes(i64::from(options.duration_minutes)),
            status: RwLock::new(SessionStatus::Active),
            audio_output_mode: RwLock::new(AudioOutputMode::HostOnly),
            mode: RwLock::new(options.mode),
            sensitivity: RwLock::new(sensitivity),
            participants: RwLock::new(participants),
            task: Mutex::new(Some(task)),
            cost,
        });

        self.sessions.write().insert(id.clone(), session.clone());
        tracing::info!(session = %id, join_code = %join_code, mode = session.mode().as_str(), "session created");
        Ok(session)
    }

    /// Join by code (case-insensitive, uppercase-normalized).
    pub fn join_session(
        &self,
        code: &str,
        device_id: impl Into<String>,
    ) -> Result<Arc<ManagedSession>, ServerError> {
        let code = code.trim().to_uppercase();
        let session_id = self
            .join_codes
            .read()
            .get(&code)
            .cloned()
            .ok_or(ServerError::InvalidJoinCode)?;
        let session = self.validate_session(&session_id)?;

        let device_id = device_id.into();
        let mut participants = session.participants.write();
        if !participants.contains_key(&device_id) {
            if participants.len() >= limits::MAX_PARTICIPANTS {
                return Err(ServerError::SessionFull);
            }
            let now = Utc::now();
            participants.insert(
                device_id.clone(),
                Participant {
                    device_id,
                    is_host: false,
                    joined_at: now,
                    last_active: now,
                },
            );
        }
        drop(participants);
        Ok(session)
    }

    /// Leave a session; the host may not.
    pub fn leave_session(&self, session_id: &str, device_id: &str) -> Result<(), ServerError> {
        let session = self.get(session_id)?;
        if session.host_device_id == device_id {
            return Err(ServerError::HostMayNotLeave);
        }
        session.participants.write().remove(device_id);
        Ok(())
    }

    /// Look up and check liveness; flips to expired when past expiry.
    pub fn validate_session(&self, session_id: &str) -> Result<Arc<ManagedSession>, ServerError> {
        let session = self.get(session_id)?;
        match session.status() {
            SessionStatus::Ended => return Err(ServerError::SessionEnded),
            SessionStatus::Expired => return Err(ServerError::SessionExpired),
            SessionStatus::Active | SessionStatus::Paused => {}
        }
        if Utc::now() > session.expires_at {
            *session.status.write() = SessionStatus::Expired;
            return Err(ServerError::SessionExpired);
        }
        Ok(session)
    }

    pub fn pause_session(&self, session_id: &str) -> Result<(), ServerError> {
        let session = self.validate_session(session_id)?;
        *session.status.write() = SessionStatus::Paused;
        Ok(())
    }

    /// Resume re-checks expiry: a pause cannot stretch the clock.
    pub fn resume_session(&self, session_id: &str) -> Result<(), ServerError> {
        let session = self.validate_session(session_id)?;
        *session.status.write() = SessionStatus::Active;
        Ok(())
    }

    /// End a session, returning the final cost. Releases every structure
    /// keyed by the session id.
    pub async fn end_session(&self, session_id: &str) -> Result<CostSnapshot, ServerError> {
        let session = self.get(session_id)?;
        *session.status.write() = SessionStatus::Ended;

        let task = session.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
        }
        let final_cost = session.cost_snapshot();

        self.metrics.remove(session_id);
        self.join_codes.write().remove(&session.join_code);
        self.sessions.write().remove(session_id);
        session.participants.write().clear();

        tracing::info!(session = %session_id, cost_usd = final_cost.total_usd, "session ended");
        Ok(final_cost)
    }

    /// Host-only audio output policy change.
    pub fn set_audio_output(
        &self,
        session_id: &str,
        device_id: &str,
        mode: AudioOutputMode,
    ) -> Result<(), ServerError> {
        let session = self.validate_session(session_id)?;
        if session.host_device_id != device_id {
            return Err(ServerError::NotHost);
        }
        *session.audio_output_mode.write() = mode;
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<ManagedSession>, ServerError> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or(ServerError::SessionNotFound)
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Sweep sessions whose expiry is more than an hour in the past.
    pub async fn cleanup_expired(&self) {
        let cutoff = Utc::now() - ChronoDuration::milliseconds(limits::CLEANUP_GRACE_MS as i64);
        let stale: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| s.expires_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in stale {
            if self.end_session(&id).await.is_ok() {
                tracing::info!(session = %id, "swept stale session");
            }
        }
    }

    /// Background cleanup task; returns a shutdown sender.
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        interval: std::time::Duration,
    ) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        manager.cleanup_expired().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    fn allocate_join_code(&self, session_id: &str) -> Result<String, ServerError> {
        let mut codes = self.join_codes.write();
        for _ in 0..limits::JOIN_CODE_RETRIES {
            let code = generate_join_code();
            if !codes.contains_key(&code) {
                codes.insert(code.clone(), session_id.to_string());
                return Ok(code);
            }
        }
        Err(ServerError::JoinCodeSpaceExhausted)
    }
}

fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    (0..limits::JOIN_CODE_LEN)
        .map(|_| {
            let index = rng.gen_range(0..limits::JOIN_CODE_ALPHABET.len());
            limits::JOIN_CODE_ALPHABET[index] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(10, Arc::new(MetricsRegistry::new()))
    }

    #[tokio::test]
    async fn create_allocates_unique_join_code() {
        let manager = manager();
        let a = manager
            .create_session(CreateSessionOptions::default(), "host-a", None, None)
            .unwrap();
        let b = manager
            .create_session(CreateSessionOptions::default(), "host-b", None, None)
            .unwrap();

        assert_eq!(a.join_code.len(), 6);
        assert_ne!(a.join_code, b.join_code);
        for c in a.join_code.bytes() {
            assert!(limits::JOIN_CODE_ALPHABET.contains(&c));
        }
        assert_eq!(a.participant_count(), 1);
        assert_eq!(a.status(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn join_is_case_insensitive_and_capped() {
        let manager = manager();
        let session = manager
            .create_session(CreateSessionOptions::default(), "host", None, None)
            .unwrap();

        let lowered = session.join_code.to_lowercase();
        for device in ["d1", "d2", "d3", "d4"] {
            manager.join_session(&lowered, device).unwrap();
        }
        assert_eq!(session.participant_count(), 5);

        let err = manager.join_session(&session.join_code, "d5").unwrap_err();
        assert!(matches!(err, ServerError::SessionFull));
    }

    #[tokio::test]
    async fn rejoin_is_idempotent() {
        let manager = manager();
        let session = manager
            .create_session(CreateSessionOptions::default(), "host", None, None)
            .unwrap();
        manager.join_session(&session.join_code, "d1").unwrap();
        manager.join_session(&session.join_code, "d1").unwrap();
        assert_eq!(session.participant_count(), 2);
    }

    #[tokio::test]
    async fn unknown_join_code_is_rejected() {
        let manager = manager();
        assert!(matches!(
            manager.join_session("ZZZZZZ", "d1").unwrap_err(),
            ServerError::InvalidJoinCode
        ));
    }

    #[tokio::test]
    async fn host_may_not_leave() {
        let manager = manager();
        let session = manager
            .create_session(CreateSessionOptions::default(), "host", None, None)
            .unwrap();
        manager.join_session(&session.join_code, "guest").unwrap();

        assert!(matches!(
            manager.leave_session(&session.id, "host").unwrap_err(),
            ServerError::HostMayNotLeave
        ));
        manager.leave_session(&session.id, "guest").unwrap();
        assert_eq!(session.participant_count(), 1);
    }

    #[tokio::test]
    async fn validation_flips_past_expiry_to_expired() {
        let manager = manager();
        let session = manager
            .create_session(
                CreateSessionOptions {
                    duration_minutes: 0,
                    ..Default::default()
                },
                "host",
                None,
                None,
            )
            .unwrap();

        let err = manager.validate_session(&session.id).unwrap_err();
        assert!(matches!(err, ServerError::SessionExpired));
        assert_eq!(session.status(), SessionStatus::Expired);
    }

    #[tokio::test]
    async fn pause_resume_round_trip() {
        let manager = manager();
        let session = manager
            .create_session(CreateSessionOptions::default(), "host", None, None)
            .unwrap();
        manager.pause_session(&session.id).unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);
        manager.resume_session(&session.id).unwrap();
        assert_eq!(session.status(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn end_session_releases_everything() {
        let metrics = Arc::new(MetricsRegistry::new());
        let manager = SessionManager::new(10, metrics.clone());
        let session = manager
            .create_session(CreateSessionOptions::default(), "host", None, None)
            .unwrap();
        let id = session.id.clone();
        let code = session.join_code.clone();
        assert!(metrics.contains(&id));

        manager.end_session(&id).await.unwrap();

        assert!(matches!(manager.get(&id).unwrap_err(), ServerError::SessionNotFound));
        assert!(!metrics.contains(&id));
        assert!(matches!(
            manager.join_session(&code, "d1").unwrap_err(),
            ServerError::InvalidJoinCode
        ));
        assert_eq!(session.participant_count(), 0);
    }

    #[tokio::test]
    async fn audio_output_is_host_only() {
        let manager = manager();
        let session = manager
            .create_session(CreateSessionOptions::default(), "host", None, None)
            .unwrap();
        manager.join_session(&session.join_code, "guest").unwrap();

        assert!(matches!(
            manager
                .set_audio_output(&session.id, "guest", AudioOutputMode::AllDevices)
                .unwrap_err(),
            ServerError::NotHost
        ));
        manager
            .set_audio_output(&session.id, "host", AudioOutputMode::AllDevices)
            .unwrap();
        assert_eq!(session.audio_output_mode(), AudioOutputMode::AllDevices);
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let manager = SessionManager::new(1, Arc::new(MetricsRegistry::new()));
        manager
            .create_session(CreateSessionOptions::default(), "host-a", None, None)
            .unwrap();
        assert!(matches!(
            manager
                .create_session(CreateSessionOptions::default(), "host-b", None, None)
                .unwrap_err(),
            ServerError::CapacityReached
        ));
    }

    #[tokio::test]
    async fn cleanup_sweeps_only_long_expired() {
        let metrics = Arc::new(MetricsRegistry::new());
        let manager = SessionManager::new(10, metrics.clone());
        let fresh = manager
            .create_session(CreateSessionOptions::default(), "host-a", None, None)
            .unwrap();
        // Expired immediately, but inside the one-hour grace window
        let recent = manager
            .create_session(
                CreateSessionOptions {
                    duration_minutes: 0,
                    ..Default::default()
                },
                "host-b",
                None,
                None,
            )
            .unwrap();

        manager.cleanup_expired().await;
        assert!(manager.get(&fresh.id).is_ok());
        assert!(manager.get(&recent.id).is_ok());
    }
}
