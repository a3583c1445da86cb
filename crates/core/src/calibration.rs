//! Confidence calibration
//!
//! Raw detection confidences from different sources are not comparable: the
//! on-device OCR model is better calibrated than the audio classifier, and
//! cloud vision labels arrive optimistic. Each source gets a temperature
//! factor, and multi-source evidence is combined with a weighted geometric
//! mean so one over-confident source cannot dominate.

use serde::{Deserialize, Serialize};

/// Detection source for calibration purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    ObjectDetection,
    TextRecognition,
    PoseDetection,
    AudioClassification,
    CloudVision,
}

impl ConfidenceSource {
    /// Per-source temperature factor
    pub fn factor(self) -> f32 {
        match self {
            ConfidenceSource::ObjectDetection => 0.85,
            ConfidenceSource::TextRecognition => 0.95,
            ConfidenceSource::PoseDetection => 0.90,
            ConfidenceSource::AudioClassification => 0.80,
            ConfidenceSource::CloudVision => 0.75,
        }
    }
}

/// Default factor for sources without a profile
const DEFAULT_FACTOR: f32 = 0.85;

/// Calibrate a raw confidence for its source
pub fn calibrate(raw: f32, source: Option<ConfidenceSource>) -> f32 {
    let factor = source.map_or(DEFAULT_FACTOR, ConfidenceSource::factor);
    (raw * factor).min(1.0)
}

/// A confidence value with its combination weight and source
#[derive(Debug, Clone, Copy)]
pub struct WeightedConfidence {
    pub value: f32,
    pub weight: f32,
    pub source: ConfidenceSource,
}

impl WeightedConfidence {
    pub fn new(value: f32, weight: f32, source: ConfidenceSource) -> Self {
        Self {
            value,
            weight,
            source,
        }
    }
}

/// Combine calibrated confidences via weighted geometric mean.
///
/// Each value is calibrated first, then floored at 0.001 before taking the
/// logarithm so a single zero cannot drive the product to negative infinity.
/// An empty input yields 0.
pub fn combine(inputs: &[WeightedConfidence]) -> f32 {
    if inputs.is_empty() {
        return 0.0;
    }
    let total_weight: f32 = inputs.iter().map(|i| i.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let log_sum: f32 = inputs
        .iter()
        .map(|i| {
            let calibrated = calibrate(i.value, Some(i.source)).max(0.001);
            i.weight * calibrated.ln()
        })
        .sum();
    (log_sum / total_weight).exp().min(1.0)
}

/// Qualitative confidence band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceBand {
    pub fn of(confidence: f32) -> Self {
        if confidence >= 0.85 {
            ConfidenceBand::High
        } else if confidence >= 0.60 {
            ConfidenceBand::Medium
        } else if confidence >= 0.35 {
            ConfidenceBand::Low
        } else {
            ConfidenceBand::VeryLow
        }
    }
}

/// Minimum confidence to volunteer speech about an observation
pub const TRUST_SPEAK: f32 = 0.6;
/// Minimum confidence to offer a suggestion
pub const TRUST_SUGGEST: f32 = 0.4;
/// Minimum confidence to act on behalf of the user
pub const TRUST_ACT: f32 = 0.8;
