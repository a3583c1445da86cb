//! HTTP text-to-speech backend

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redi_core::{Error, TextToSpeech, TtsRequest};

/// Settings for the TTS provider
#[derive(Debug, Clone)]
pub struct TtsSettings {
    pub api_key: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl TtsSettings {
    /// Default endpoint, optionally region-pinned.
    pub fn endpoint_for_region(region: Option<&str>) -> String {
        match region {
            Some(region) if !region.is_empty() => {
                format!("https://api.{}.tts.redi.dev", region)
            }
            _ => "https://api.tts.redi.dev".to_string(),
        }
    }
}

/// HTTP TTS client
pub struct HttpTts {
    settings: TtsSettings,
    client: Client,
}

impl HttpTts {
    pub fn new(settings: TtsSettings) -> redi_core::Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Provider(e.to_string()))?;
        Ok(Self { settings, client })
    }
}

#[async_trait]
impl TextToSpeech for HttpTts {
    async fn synthesize(&self, request: TtsRequest) -> redi_core::Result<Vec<u8>> {
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.settings.endpoint, request.voice_id
        );
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.settings.api_key)
            .json(&json!({
                "text": request.text,
                "stream": request.streaming,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.settings.timeout.as_millis() as u64)
                } else {
                    Error::Provider(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Provider(format!("tts returned status {}", status)));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;

        tracing::debug!(
            voice = %request.voice_id,
            chars = request.text.len(),
            bytes = audio.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "tts synthesis complete"
        );
        Ok(audio.to_vec())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Placeholder backend when no API key is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTts;

#[async_trait]
impl TextToSpeech for DisabledTts {
    async fn synthesize(&self, _request: TtsRequest) -> redi_core::Result<Vec<u8>> {
        Err(Error::Disabled("tts"))
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the TTS backend from configuration; keyless yields [`DisabledTts`].
pub fn build_tts(
    api_key: Option<&str>,
    region: Option<&str>,
) -> redi_core::Result<Arc<dyn TextToSpeech>> {
    match api_key.filter(|k| !k.is_empty()) {
        Some(api_key) => {
            let settings = TtsSettings {
                api_key: api_key.to_string(),
                endpoint: TtsSettings::endpoint_for_region(region),
                timeout: Duration::from_secs(15),
            };
            Ok(Arc::new(HttpTts::new(settings)?))
        }
        None => {
            tracing::warn!("TTS disabled: no API key");
            Ok(Arc::new(DisabledTts))
        }
    }
}
