//! Scene description for LLM prompts
//!
//! Condenses a perception packet into a short period-separated string the
//! decision layers inject as visual context. Only confident detections make
//! it in; when overall confidence is low the string says so, which lets the
//! model hedge instead of hallucinate.

use redi_core::{LightLevel, MovementPhase, PerceptionPacket};

const MAX_OBJECTS: usize = 5;
const MAX_TEXTS: usize = 3;
const MAX_TEXT_CHARS: usize = 50;
const MAX_AUDIO_EVENTS: usize = 3;
const OBJECT_MIN_CONFIDENCE: f32 = 0.6;
const TEXT_MIN_CONFIDENCE: f32 = 0.7;

/// Build a compact scene description, or `None` when the packet carries
/// nothing confident enough to describe.
pub fn describe_scene(packet: &PerceptionPacket) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    let mut objects: Vec<&str> = packet
        .objects
        .iter()
        .filter(|o| o.confidence > OBJECT_MIN_CONFIDENCE)
        .map(|o| o.label.as_str())
        .collect();
    objects.truncate(MAX_OBJECTS);
    if !objects.is_empty() {
        parts.push(format!("Visible: {}", objects.join(", ")));
    }

    let texts: Vec<String> = packet
        .texts
        .iter()
        .filter(|t| t.confidence > TEXT_MIN_CONFIDENCE)
        .take(MAX_TEXTS)
        .map(|t| truncate_chars(&t.text, MAX_TEXT_CHARS))
        .collect();
    if !texts.is_empty() {
        parts.push(format!("Text: {}", texts.join("; ")));
    }

    if let Some(pose) = &packet.pose {
        match &pose.body_position {
            Some(position) => parts.push(format!(
                "Body: {}, spine {:.0} degrees",
                position, pose.angles.spine_angle
            )),
            None => parts.push(format!("Spine {:.0} degrees", pose.angles.spine_angle)),
        }
    }

    if let Some(movement) = &packet.movement {
        match movement.phase {
            MovementPhase::Rest | MovementPhase::Unknown => {}
            phase => parts.push(format!("Movement: {:?}", phase).to_lowercase()),
        }
        if movement.is_repetitive {
            parts.push("User is exercising".to_string());
        } else if movement.velocity > 0.3 {
            parts.push("User is walking".to_string());
        }
    }

    if !packet.audio_events.is_empty() {
        let sounds: Vec<&str> = packet
            .audio_events
            .iter()
            .take(MAX_AUDIO_EVENTS)
            .map(String::as_str)
            .collect();
        parts.push(format!("Sounds: {}", sounds.join(", ")));
    }

    match packet.light_level {
        LightLevel::Normal => {}
        LightLevel::Dark => parts.push("Low light".to_string()),
        LightLevel::Bright => parts.push("Bright light".to_string()),
    }

    if parts.is_empty() {
        return None;
    }

    let mut description = parts.join(". ");
    if let Some(confidence) = packet.overall_confidence {
        if confidence < 0.5 {
            description.push_str(&format!(" (low confidence: {:.2})", confidence));
        }
    }
    Some(description)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
