//! Ensemble grounding
//!
//! A detection reported by a single model is easy to hallucinate on; one
//! confirmed by two independent sources rarely is. Each on-device object
//! starts from its calibrated vision confidence and collects confirmations
//! from OCR text, audio events, and (when available) cloud vision. A
//! detection is admitted if it clears the speak-trust threshold on its own
//! or carries at least two sources.
//!
//! The cross-validation vocabularies are static tables, read-only at
//! runtime.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use redi_core::{
    calibrate, combine, ConfidenceSource, DetectedObject, DetectionSource, GroundedDetection,
    RecognizedText, WeightedConfidence, TRUST_SPEAK,
};

/// OCR confirmation boost
const OCR_BOOST: f32 = 0.20;
/// Audio confirmation boost
const AUDIO_BOOST: f32 = 0.15;

/// Object label → related OCR terms
static RELATED_TERMS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    m.insert("bottle", &["water", "soda", "ml", "oz", "drink"]);
    m.insert("cup", &["coffee", "tea", "mug"]);
    m.insert("book", &["chapter", "page", "press", "isbn"]);
    m.insert("laptop", &["keyboard", "screen", "file", "edit"]);
    m.insert("phone", &["call", "message", "battery"]);
    m.insert("pan", &["nonstick", "skillet"]);
    m.insert("keyboard", &["shift", "ctrl", "enter"]);
    m.insert("dumbbell", &["kg", "lb", "lbs"]);
    m.insert("barbell", &["kg", "lb", "lbs"]);
    m.insert("guitar", &["fender", "gibson", "capo"]);
    m.insert("box", &["fragile", "this side up", "ship"]);
    m
});

/// Audio event → object classes it corroborates
static AUDIO_OBJECTS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
    m.insert("sizzling", &["pan", "stove", "cooking", "food"]);
    m.insert("boiling", &["pot", "kettle", "stove"]);
    m.insert("typing", &["keyboard", "laptop", "computer"]);
    m.insert("music", &["guitar", "piano", "speaker", "violin"]);
    m.insert("guitar", &["guitar"]);
    m.insert("piano", &["piano"]);
    m.insert("pouring", &["bottle", "cup", "kettle"]);
    m.insert("clanking", &["dumbbell", "barbell", "plate"]);
    m.insert("page_turn", &["book", "notebook"]);
    m.insert("beeping", &["microwave", "oven", "timer"]);
    m
});

/// Category → member labels (substring match)
static CATEGORIES: Lazy<Vec<(&'static str, &'static [&'static str])>> = Lazy::new(|| {
    vec![
        (
            "kitchen",
            &[
                "pan", "pot", "kettle", "stove", "oven", "microwave", "knife", "cutting board",
            ] as &[_],
        ),
        (
            "gym",
            &["dumbbell", "barbell", "kettlebell", "plate", "bench", "rack", "mat"],
        ),
        (
            "electronics",
            &["laptop", "phone", "keyboard", "monitor", "tablet", "computer", "screen"],
        ),
        ("study", &["book", "notebook", "pen", "pencil", "paper", "desk"]),
        ("music", &["guitar", "piano", "violin", "drum", "speaker", "microphone"]),
        (
            "food",
            &["bottle", "cup", "plate", "bowl", "apple", "banana", "bread", "egg"],
        ),
    ]
});

/// Inputs to one grounding pass
#[derive(Debug, Default)]
pub struct GroundingInput<'a> {
    pub objects: &'a [DetectedObject],
    pub texts: &'a [RecognizedText],
    pub audio_events: &'a [String],
    pub cloud: Option<&'a [DetectedObject]>,
}

/// Cross-validate detections across sources.
///
/// Keeps a detection only when `confidence > 0.6` or it is confirmed by at
/// least two sources.
pub fn ground(input: GroundingInput<'_>) -> Vec<GroundedDetection> {
    let mut out = Vec::with_capacity(input.objects.len());

    for obj in input.objects {
        let label = obj.label.to_lowercase();
        let mut sources = vec![DetectionSource::IosVision];
        let mut confidence = calibrate(obj.confidence, Some(ConfidenceSource::ObjectDetection));

        if ocr_confirms(&label, input.texts) {
            sources.push(DetectionSource::IosOcr);
            confidence = (confidence + OCR_BOOST).min(1.0);
        }

        if audio_confirms(&label, input.audio_events) {
            sources.push(DetectionSource::Audio);
            confidence = (confidence + AUDIO_BOOST).min(1.0);
        }

        if let Some(cloud) = input.cloud {
            if let Some(cloud_conf) = cloud_match(&label, cloud) {
                sources.push(DetectionSource::CloudVision);
                confidence = combine(&[
                    WeightedConfidence::new(confidence, 2.0, ConfidenceSource::ObjectDetection),
                    WeightedConfidence::new(cloud_conf, 1.0, ConfidenceSource::CloudVision),
                ]);
            }
        }

        if confidence > TRUST_SPEAK || sources.len() >= 2 {
            out.push(GroundedDetection {
                label: obj.label.clone(),
                confidence,
                sources,
                category: categorize(&label).to_string(),
                bounding_box: obj.bounding_box,
            });
        } else {
            tracing::trace!(label = %obj.label, confidence, "detection not admitted");
        }
    }

    out
}

/// Source-weighted average confidence over admitted detections; 0 if empty.
pub fn scene_confidence(detections: &[GroundedDetection]) -> f32 {
    let total_sources: usize = detections.iter().map(|d| d.sources.len()).sum();
    if total_sources == 0 {
        return 0.0;
    }
    let weighted: f32 = detections
        .iter()
        .map(|d| d.confidence * d.sources.len() as f32)
        .sum();
    weighted / total_sources as f32
}

fn ocr_confirms(label: &str, texts: &[RecognizedText]) -> bool {
    let related = RELATED_TERMS.get(label).copied().unwrap_or(&[]);
    texts.iter().any(|t| {
        let text = t.text.to_lowercase();
        text.contains(label) || related.iter().any(|term| text.contains(term))
    })
}

fn audio_confirms(label: &str, audio_events: &[String]) -> bool {
    audio_events.iter().any(|event| {
        AUDIO_OBJECTS
            .get(event.to_lowercase().as_str())
            .is_some_and(|classes| classes.iter().any(|c| label.contains(c)))
    })
}

/// Direct, substring, or related-term match against cloud detections
fn cloud_match(label: &str, cloud: &[DetectedObject]) -> Option<f32> {
    let related = RELATED_TERMS.get(label).copied().unwrap_or(&[]);
    cloud
        .iter()
        .find(|c| {
            let cloud_label = c.label.to_lowercase();
            cloud_label == label
                || cloud_label.contains(label)
                || label.contains(cloud_label.as_str())
                || related.iter().any(|term| cloud_label.contains(term))
        })
        .map(|c| c.confidence)
}

fn categorize(label: &str) -> &'static str {
    for (category, members) in CATEGORIES.iter() {
        if members.iter().any(|m| label.contains(m) || m.contains(label)) {
            return category;
        }
    }
    "other"
}
