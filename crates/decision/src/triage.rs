//! Fast-decision triage, layer 2 of the decision pipeline
//!
//! Triage classifies a packet into silent / quick-response / needs-
//! reasoning, and generates the quick responses itself via the fast model.
//! Everything before the model call is pure and cheap: the silence checks
//! and the complexity regex family run on every packet, the model only on
//! the minority that survive them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;

use redi_core::{GenerateRequest, LanguageModel, PerceptionPacket, SessionMode};
use redi_config::constants::{sensitivity, triage as defaults};

/// Why triage stayed silent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceReason {
    /// A rule already handled this packet
    RuleHandled,
    /// Inside the sensitivity-derived minimum gap
    TooSoon,
    /// Nothing in the packet worth speaking about
    NoContext,
    /// The fast model chose silence
    ModelDeclined,
    /// The generated text failed the quick-response post-filter
    FilteredOut,
    /// No fast model configured
    NoModel,
    /// The model call failed; silence is the fallback
    ModelError,
}

/// Triage classification
#[derive(Debug, Clone, PartialEq)]
pub enum TriageDecision {
    Silent(SilenceReason),
    QuickResponse(String),
    NeedsReasoning { prompt: String },
}

/// Triage result with timing
#[derive(Debug, Clone, PartialEq)]
pub struct TriageOutcome {
    pub decision: TriageDecision,
    pub confidence: f32,
    pub processing_ms: u64,
}

/// Inputs for one triage pass
pub struct TriageInput<'a> {
    pub packet: &'a PerceptionPacket,
    pub recent_context: &'a [String],
    pub rule_fired: bool,
    pub time_since_last_spoke_ms: u64,
    pub sensitivity: f32,
    pub mode: SessionMode,
    /// Server-side visual context, when fresher than its cutoff
    pub server_visual_context: Option<&'a str>,
}

/// Complexity patterns that route a transcript straight to reasoning
static COMPLEXITY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"why (is|are|do|does|did|should|would|can|could)",
        r"how (does|do|can|should|would) .* work",
        r"how (do|can|to) (i|you)",
        r"walk me through",
        r"step by step",
        r"tell me how to",
        r"show me how",
        r"explain (how|why|what)",
        r"what('s| is) the (difference|best|right|correct)",
        r"compare|versus|vs\.|better than",
        r"should i .* or",
        r"help me understand",
        r"can you (help|tell|show|explain)",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
    .collect()
});

const QUICK_SYSTEM_PROMPT: &str = "You are a hands-free assistant speaking out loud. \
MAX 15 words. No questions. No help offers. Describe what IS visible, \
never what is missing. Reply SILENT if there is nothing worth saying.";

/// Whether a transcript needs the deep-reasoning path
pub fn is_complex(transcript: &str) -> bool {
    if COMPLEXITY_PATTERNS.iter().any(|p| p.is_match(transcript)) {
        return true;
    }
    let question_marks = transcript.matches('?').count();
    if question_marks > 1 {
        return true;
    }
    question_marks == 1 && transcript.split_whitespace().count() > 20
}

/// The triage engine; holds the fast-model handle
pub struct TriageEngine {
    fast: Option<Arc<dyn LanguageModel>>,
}

impl TriageEngine {
    pub fn new(fast: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { fast }
    }

    /// Run one triage pass.
    pub async fn triage(&self, input: TriageInput<'_>) -> TriageOutcome {
        let started = Instant::now();
        let confidence = input.packet.overall_confidence.unwrap_or(0.8);
        let finish = |decision| TriageOutcome {
            decision,
            confidence,
            processing_ms: started.elapsed().as_millis() as u64,
        };

        if input.rule_fired {
            return finish(TriageDecision::Silent(SilenceReason::RuleHandled));
        }

        let min_gap = sensitivity::min_gap_ms(input.sensitivity);
        if input.time_since_last_spoke_ms < min_gap {
            return finish(TriageDecision::Silent(SilenceReason::TooSoon));
        }

        if !input.packet.has_context() {
            return finish(TriageDecision::Silent(SilenceReason::NoContext));
        }

        if let Some(transcript) = input.packet.transcript.as_ref() {
            if is_complex(&transcript.text) {
                return finish(TriageDecision::NeedsReasoning {
                    prompt: transcript.text.clone(),
                });
            }
        }

        let Some(fast) = &self.fast else {
            return finish(TriageDecision::Silent(SilenceReason::NoModel));
        };

        let prompt = self.build_prompt(&input);
        let request = GenerateRequest::new(QUICK_SYSTEM_PROMPT)
            .with_user_message(prompt)
            .with_max_tokens(defaults::FAST_MAX_TOKENS)
            .with_temperature(0.7);

        match fast.generate(request).await {
            Ok(response) => {
                if response.is_silent() {
                    return finish(TriageDecision::Silent(SilenceReason::ModelDeclined));
                }
                let text = response.text.trim().to_string();
                if text.split_whitespace().count() > defaults::QUICK_RESPONSE_MAX_WORDS
                    || text.contains('?')
                {
                    return finish(TriageDecision::Silent(SilenceReason::FilteredOut));
                }
                finish(TriageDecision::QuickResponse(text))
            }
            Err(err) => {
                tracing::warn!(error = %err, "fast model failed; staying silent");
                finish(TriageDecision::Silent(SilenceReason::ModelError))
            }
        }
    }

    /// Assemble the quick-response user prompt from the packet, recent
    /// context, and (when present) the server-side visual context; the
    /// latter is the main defense against hallucination when on-device
    /// detections are thin.
    fn build_prompt(&self, input: &TriageInput<'_>) -> String {
        let mut lines: Vec<String> = Vec::new();
        let packet = input.packet;

        if let Some(transcript) = &packet.transcript {
            lines.push(format!("User said: {}", transcript.text));
        }

        if let Some(pose) = &packet.pose {
            lines.push(format!(
                "Pose: spine {:.0} deg, knees {:.0}/{:.0} deg",
                pose.angles.spine_angle, pose.angles.left_knee, pose.angles.right_knee
            ));
        }

        if let Some(movement) = &packet.movement {
            let rep = movement
                .rep_count
                .map(|r| format!(", rep {}", r))
                .unwrap_or_default();
            lines.push(format!("Movement: {:?}{}", movement.phase, rep).to_lowercase());
        }

        let mut objects: Vec<(&str, f32)> = packet
            .objects
            .iter()
            .map(|o| (o.label.as_str(), o.confidence))
            .collect();
        objects.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let top: Vec<&str> = objects
            .iter()
            .take(defaults::PROMPT_TOP_OBJECTS)
            .map(|(label, _)| *label)
            .collect();
        if !top.is_empty() {
            lines.push(format!("Objects: {}", top.join(", ")));
        }

        let texts: Vec<&str> = packet
            .texts
            .iter()
            .take(defaults::PROMPT_TOP_TEXTS)
            .map(|t| t.text.as_str())
            .collect();
        if !texts.is_empty() {
            lines.push(format!("Text seen: {}", texts.join("; ")));
        }

        let recent: Vec<&str> = input
            .recent_context
            .iter()
            .rev()
            .take(defaults::PROMPT_CONTEXT_ENTRIES)
            .map(String::as_str)
            .collect();
        if !recent.is_empty() {
            lines.push(format!("Earlier: {}", recent.join(" | ")));
        }

        if let Some(server_context) = input.server_visual_context {
            lines.push(format!("Scene: {}", server_context));
        }

        lines.push(format!("Activity mode: {}", input.mode.as_str()));
        lines.join("\n")
    }
}
