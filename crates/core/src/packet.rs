//! Perception data model
//!
//! A [`PerceptionPacket`] is the immutable bundle of on-device detections a
//! client produces at up to 2 Hz: body pose, detected objects, recognized
//! text, movement analysis, an optional transcript segment, and device
//! context. Packets are validated once at the transport boundary and then
//! flow through the decision pipeline unchanged.
//!
//! Invariants (enforced by [`PerceptionPacket::validate`]):
//! - every confidence is in `[0, 1]`
//! - joint positions and bounding-box coordinates are normalized to `[0, 1]`
//! - derived angles are degrees

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Error;

/// Named body joints tracked by the on-device pose model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointName {
    Nose,
    Neck,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

/// A single tracked joint: normalized 3D position plus detection confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub confidence: f32,
}

/// Derived joint angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PoseAngles {
    pub left_elbow: f32,
    pub right_elbow: f32,
    pub left_knee: f32,
    pub right_knee: f32,
    /// Forward lean of the spine; 0 is upright
    pub spine_angle: f32,
    pub shoulder_tilt: f32,
}

/// Full-body pose snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub joints: HashMap<JointName, Joint>,
    #[serde(default)]
    pub angles: PoseAngles,
    /// Overall pose confidence reported by the device model
    pub confidence: f32,
    /// Coarse body position, e.g. "standing", "squatting"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_position: Option<String>,
}

impl Pose {
    /// Look up a joint if the device reported it
    pub fn joint(&self, name: JointName) -> Option<&Joint> {
        self.joints.get(&name)
    }
}

/// Normalized bounding box (all coordinates in `[0, 1]`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A single on-device object detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A single OCR result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub text: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// Movement phase as classified by the device motion model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MovementPhase {
    Concentric,
    Eccentric,
    Isometric,
    Transition,
    Rest,
    #[default]
    Unknown,
}

/// Movement analysis for the current frame window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    #[serde(default)]
    pub phase: MovementPhase,
    #[serde(default)]
    pub velocity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default)]
    pub is_repetitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f32>,
}

/// Transcript segment attached to a packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub is_final: bool,
}

/// Ambient light classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LightLevel {
    Dark,
    #[default]
    Normal,
    Bright,
}

/// Immutable perception bundle from the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionPacket {
    /// Device-side capture timestamp (unix epoch milliseconds)
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub texts: Vec<RecognizedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement: Option<Movement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<TranscriptSegment>,
    /// Audio events classified on-device, e.g. "sizzling", "music"
    #[serde(default)]
    pub audio_events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_orientation: Option<String>,
    #[serde(default)]
    pub light_level: LightLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_confidence_modifier: Option<f32>,
    /// Base64 JPEG frame sent only when on-device detections are too thin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_frame_b64: Option<String>,
}

impl PerceptionPacket {
    /// Minimal packet carrying only a timestamp; used as a builder base
    pub fn empty(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            pose: None,
            objects: Vec::new(),
            texts: Vec::new(),
            movement: None,
            transcript: None,
            audio_events: Vec::new(),
            device_orientation: None,
            light_level: LightLevel::Normal,
            overall_confidence: None,
            light_confidence_modifier: None,
            fallback_frame_b64: None,
        }
    }

    /// Validate packet invariants; malformed packets are dropped at the
    /// transport boundary and never enter the decision pipeline.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(pose) = &self.pose {
            if !in_unit(pose.confidence) {
                return Err(Error::MalformedPacket(format!(
                    "pose confidence {} out of range",
                    pose.confidence
                )));
            }
            for (name, joint) in &pose.joints {
                if !in_unit(joint.confidence) {
                    return Err(Error::MalformedPacket(format!(
                        "joint {:?} confidence {} out of range",
                        name, joint.confidence
                    )));
                }
                if !in_unit(joint.x) || !in_unit(joint.y) {
                    return Err(Error::MalformedPacket(format!(
                        "joint {:?} position ({}, {}) not normalized",
                        name, joint.x, joint.y
                    )));
                }
            }
        }
        for obj in &self.objects {
            if !in_unit(obj.confidence) {
                return Err(Error::MalformedPacket(format!(
                    "object '{}' confidence {} out of range",
                    obj.label, obj.confidence
                )));
            }
            if let Some(bb) = &obj.bounding_box {
                if !bb_normalized(bb) {
                    return Err(Error::MalformedPacket(format!(
                        "object '{}' bounding box not normalized",
                        obj.label
                    )));
                }
            }
        }
        for text in &self.texts {
            if !in_unit(text.confidence) {
                return Err(Error::MalformedPacket(format!(
                    "text confidence {} out of range",
                    text.confidence
                )));
            }
        }
        if let Some(c) = self.overall_confidence {
            if !in_unit(c) {
                return Err(Error::MalformedPacket(format!(
                    "overall confidence {} out of range",
                    c
                )));
            }
        }
        Ok(())
    }

    /// Final transcript text, if this packet carries one
    pub fn final_transcript(&self) -> Option<&str> {
        self.transcript
            .as_ref()
            .filter(|t| t.is_final)
            .map(|t| t.text.as_str())
    }

    /// Whether the packet carries any usable perception context:
    /// a transcript, a confident pose, or at least one object.
    pub fn has_context(&self) -> bool {
        self.transcript.is_some()
            || self.pose.as_ref().is_some_and(|p| p.confidence > 0.5)
            || !self.objects.is_empty()
    }
}

fn in_unit(v: f32) -> bool {
    (0.0..=1.0).contains(&v)
}

fn bb_normalized(bb: &BoundingBox) -> bool {
    in_unit(bb.x) && in_unit(bb.y) && in_unit(bb.width) && in_unit(bb.height)
}

/// Source that confirmed a grounded detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    IosVision,
    IosOcr,
    Audio,
    CloudVision,
    Motion,
}

/// A detection cross-validated by the grounding ensemble.
///
/// Invariant: `sources` is non-empty and `confidence <= 1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundedDetection {
    pub label: String,
    pub confidence: f32,
    pub sources: Vec<DetectionSource>,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}
