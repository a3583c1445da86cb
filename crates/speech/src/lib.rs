//! Speech synthesis client
//!
//! The core hands approved text to a TTS provider and forwards the encoded
//! audio to the transport untouched. Without an API key the backend reports
//! disabled and the reliability layer's fallback chain routes synthesis to
//! the device.

pub mod tts;

pub use tts::{build_tts, DisabledTts, HttpTts, TtsSettings};
