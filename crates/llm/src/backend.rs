//! Messages-API HTTP backend
//!
//! Single non-streaming request per decision: triage asks for at most 75
//! tokens and reasoning for about 200, so streaming buys nothing while the
//! response-length guard needs the full text anyway.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use redi_core::{GenerateRequest, GenerateResponse, LanguageModel, Role};

use crate::LlmError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Settings for one model handle
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
}

impl LlmSettings {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// HTTP Messages-API language model
pub struct HttpLanguageModel {
    settings: LlmSettings,
    client: Client,
}

impl HttpLanguageModel {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self { settings, client })
    }

    fn build_body(&self, request: &GenerateRequest) -> ApiRequest {
        let messages = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".to_string(),
                    _ => "assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect();

        ApiRequest {
            model: self.settings.model.clone(),
            max_tokens: request.max_tokens,
            system: (!request.system.is_empty()).then(|| request.system.clone()),
            messages,
            temperature: request.temperature,
        }
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn generate(&self, request: GenerateRequest) -> redi_core::Result<GenerateResponse> {
        let body = self.build_body(&request);
        let url = format!("{}/v1/messages", self.settings.endpoint);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.settings.timeout.as_millis() as u64)
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Status(status.as_u16(), detail).into());
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        let text = parsed
            .content
            .iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text.trim().to_string())
            .ok_or_else(|| LlmError::Malformed("no text block in response".to_string()))?;

        let latency_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            model = %self.settings.model,
            latency_ms,
            chars = text.len(),
            "llm generation complete"
        );

        Ok(GenerateResponse {
            text,
            latency_ms,
            model: self.settings.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}
