//! Core traits and types for the Redi orchestration server
//!
//! This crate provides foundational types used across all other crates:
//! - The perception data model (pose, objects, OCR text, movement)
//! - Confidence calibration and combination
//! - Session descriptors and modes
//! - LLM request/response types
//! - Core traits for pluggable collaborators (LLM, TTS, cloud vision)
//! - Error types

pub mod calibration;
pub mod error;
pub mod llm_types;
pub mod packet;
pub mod session;
pub mod traits;

pub use calibration::{
    calibrate, combine, ConfidenceBand, ConfidenceSource, WeightedConfidence, TRUST_ACT,
    TRUST_SPEAK, TRUST_SUGGEST,
};
pub use error::{Error, Result};
pub use llm_types::{GenerateRequest, GenerateResponse, Message, Role, SILENT_SENTINEL};
pub use packet::{
    BoundingBox, DetectedObject, DetectionSource, GroundedDetection, Joint, JointName, LightLevel,
    Movement, MovementPhase, PerceptionPacket, Pose, PoseAngles, RecognizedText, TranscriptSegment,
};
pub use session::{
    AudioOutputMode, RejectionReason, ResponseSource, SessionDescriptor, SessionMode,
    SessionStatus, VoiceGender,
};
pub use traits::{CloudVision, LanguageModel, TextToSpeech, TtsRequest};
