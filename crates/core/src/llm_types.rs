//! LLM request/response types
//!
//! Shared between the decision layers and the provider backends so that
//! triage and reasoning code never depends on a concrete provider SDK.

use serde::{Deserialize, Serialize};

/// Sentinel the fast model returns when it decides not to speak
pub const SILENT_SENTINEL: &str = "SILENT";

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Generation request built by the decision layers
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerateRequest {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: Vec::new(),
            max_tokens: 256,
            temperature: 0.7,
        }
    }

    pub fn with_user_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }
}

/// Generation result
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateResponse {
    pub text: String,
    /// Total generation latency in milliseconds
    pub latency_ms: u64,
    /// Model identifier that served the request
    pub model: String,
}

impl GenerateResponse {
    /// Whether the model chose silence
    pub fn is_silent(&self) -> bool {
        self.text.trim() == SILENT_SENTINEL
    }
}
