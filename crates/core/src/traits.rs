//! Core traits for pluggable collaborators
//!
//! Concrete implementations live in `redi-llm` and `redi-speech`; the
//! decision layers depend only on these traits, which keeps tests free of
//! network access (mock collaborators implement the same traits).

use async_trait::async_trait;

use crate::error::Result;
use crate::llm_types::{GenerateRequest, GenerateResponse};
use crate::packet::DetectedObject;

/// A text-generation backend (fast or deep tier)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for the request
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Model identifier for logging and metrics
    fn model_name(&self) -> &str;
}

/// TTS synthesis request
#[derive(Debug, Clone)]
pub struct TtsRequest {
    pub text: String,
    pub voice_id: String,
    pub streaming: bool,
}

/// A text-to-speech backend.
///
/// The core never reinterprets audio; the returned bytes are forwarded to
/// the transport as-is.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize speech, returning encoded audio
    async fn synthesize(&self, request: TtsRequest) -> Result<Vec<u8>>;

    /// Whether this backend is configured and usable
    fn is_enabled(&self) -> bool;
}

/// Cloud vision fallback for frames where on-device detection is thin
#[async_trait]
pub trait CloudVision: Send + Sync {
    /// Detect objects in an encoded frame
    async fn detect(&self, frame_jpeg: &[u8]) -> Result<Vec<DetectedObject>>;

    /// Whether this backend is configured and usable
    fn is_enabled(&self) -> bool;
}
