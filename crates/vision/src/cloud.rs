//! HTTP cloud-vision backend

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redi_core::{BoundingBox, CloudVision, DetectedObject, Error};

/// Settings for the cloud vision provider
#[derive(Debug, Clone)]
pub struct CloudVisionSettings {
    pub api_key: String,
    pub endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<Detection>,
}

#[derive(Debug, Deserialize)]
struct Detection {
    label: String,
    confidence: f32,
    #[serde(default)]
    bounding_box: Option<BoundingBox>,
}

/// HTTP cloud-vision client
pub struct HttpCloudVision {
    settings: CloudVisionSettings,
    client: Client,
}

impl HttpCloudVision {
    pub fn new(settings: CloudVisionSettings) -> redi_core::Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Provider(e.to_string()))?;
        Ok(Self { settings, client })
    }
}

#[async_trait]
impl CloudVision for HttpCloudVision {
    async fn detect(&self, frame_jpeg: &[u8]) -> redi_core::Result<Vec<DetectedObject>> {
        let url = format!("{}/v1/detect", self.settings.endpoint);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.settings.api_key)
            .header("content-type", "image/jpeg")
            .body(frame_jpeg.to_vec())
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
            return Err(Error::Provider(format!("cloud vision status {}", status)));
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(e.to_string()))?;

        tracing::debug!(
            detections = parsed.detections.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "cloud vision detection complete"
        );

        Ok(parsed
            .detections
            .into_iter()
            .map(|d| DetectedObject {
                label: d.label,
                confidence: d.confidence.clamp(0.0, 1.0),
                bounding_box: d.bounding_box,
                category: None,
            })
            .collect())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Placeholder backend when no API key is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCloudVision;

#[async_trait]
impl CloudVision for DisabledCloudVision {
    async fn detect(&self, _frame_jpeg: &[u8]) -> redi_core::Result<Vec<DetectedObject>> {
        Err(Error::Disabled("cloud_vision"))
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Build the backend from configuration; keyless yields the disabled
/// variant and the grounding ensemble simply loses one source.
pub fn build_cloud_vision(api_key: Option<&str>) -> redi_core::Result<Arc<dyn CloudVision>> {
    match api_key.filter(|k| !k.is_empty()) {
        Some(api_key) => {
            let settings = CloudVisionSettings {
                api_key: api_key.to_string(),
                endpoint: std::env::var("REDI_CLOUD_VISION_ENDPOINT")
                    .unwrap_or_else(|_| "https://api.vision.redi.dev".to_string()),
                timeout: Duration::from_secs(10),
            };
            Ok(Arc::new(HttpCloudVision::new(settings)?))
        }
        None => {
            tracing::warn!("cloud vision disabled: no API key");
            Ok(Arc::new(DisabledCloudVision))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_backend_reports_disabled() {
        let vision = DisabledCloudVision;
        assert!(!vision.is_enabled());
        assert!(vision.detect(&[0u8; 4]).await.is_err());
    }

    #[test]
    fn keyless_build_yields_disabled() {
        assert!(!build_cloud_vision(None).unwrap().is_enabled());
        assert!(!build_cloud_vision(Some("")).unwrap().is_enabled());
    }

    #[test]
    fn detection_response_parses() {
        let json = r#"{"detections":[
            {"label":"kettle","confidence":0.92},
            {"label":"stove","confidence":1.4,
             "bounding_box":{"x":0.1,"y":0.2,"width":0.3,"height":0.4}}
        ]}"#;
        let parsed: DetectResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.detections.len(), 2);
        assert_eq!(parsed.detections[0].label, "kettle");
        assert!(parsed.detections[1].bounding_box.is_some());
    }
}
