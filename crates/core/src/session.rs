//! Session descriptor types
//!
//! The descriptor JSON is part of the client handshake and must stay
//! field-compatible with deployed mobile clients: camelCase keys, ISO-8601
//! timestamps, lowercase enum values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activity mode a session runs in; selects the rule set and defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    General,
    Studying,
    Meeting,
    Sports,
    Music,
    Assembly,
    Monitoring,
    Cooking,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::General => "general",
            SessionMode::Studying => "studying",
            SessionMode::Meeting => "meeting",
            SessionMode::Sports => "sports",
            SessionMode::Music => "music",
            SessionMode::Assembly => "assembly",
            SessionMode::Monitoring => "monitoring",
            SessionMode::Cooking => "cooking",
        }
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Expired,
    Ended,
}

/// Where TTS audio plays for a multi-device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioOutputMode {
    #[default]
    HostOnly,
    AllDevices,
}

/// Voice identity for TTS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    #[default]
    Female,
    Male,
}

/// Which pipeline layer produced an approved response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Rule,
    Triage,
    Reasoning,
}

impl ResponseSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Rule => "rule",
            ResponseSource::Triage => "triage",
            ResponseSource::Reasoning => "reasoning",
        }
    }
}

/// Admission guard that rejected a candidate response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Staleness,
    Interruption,
    RateLimit,
    Content,
    Length,
    Deduplication,
}

impl RejectionReason {
    pub const ALL: [RejectionReason; 6] = [
        RejectionReason::Staleness,
        RejectionReason::Interruption,
        RejectionReason::RateLimit,
        RejectionReason::Content,
        RejectionReason::Length,
        RejectionReason::Deduplication,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RejectionReason::Staleness => "staleness",
            RejectionReason::Interruption => "interruption",
            RejectionReason::RateLimit => "rate_limit",
            RejectionReason::Content => "content",
            RejectionReason::Length => "length",
            RejectionReason::Deduplication => "deduplication",
        }
    }
}

/// Session descriptor exchanged with clients at handshake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub id: String,
    pub join_code: String,
    pub host_device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub mode: SessionMode,
    pub sensitivity: f32,
    pub voice_gender: VoiceGender,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub audio_output_mode: AudioOutputMode,
    pub max_participants: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn descriptor_serializes_camel_case() {
        let d = SessionDescriptor {
            id: "s-1".into(),
            join_code: "ABC234".into(),
            host_device_id: "dev-1".into(),
            user_id: None,
            mode: SessionMode::Sports,
            sensitivity: 0.5,
            voice_gender: VoiceGender::Female,
            duration_minutes: 30,
            started_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            expires_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap(),
            status: SessionStatus::Active,
            audio_output_mode: AudioOutputMode::HostOnly,
            max_participants: 5,
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["joinCode"], "ABC234");
        assert_eq!(json["hostDeviceId"], "dev-1");
        assert_eq!(json["mode"], "sports");
        assert_eq!(json["status"], "active");
        assert_eq!(json["audioOutputMode"], "host_only");
        assert!(json["startedAt"].as_str().unwrap().starts_with("2025-06-01T12:00:00"));
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn mode_round_trips() {
        for mode in [
            SessionMode::General,
            SessionMode::Studying,
            SessionMode::Meeting,
            SessionMode::Sports,
            SessionMode::Music,
            SessionMode::Assembly,
            SessionMode::Monitoring,
            SessionMode::Cooking,
        ] {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json.trim_matches('"'), mode.as_str());
            let back: SessionMode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, mode);
        }
    }
}
