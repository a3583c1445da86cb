//! Reasoning router, layer 3 of the decision pipeline
//!
//! Handles transcripts triage marked NEEDS_REASONING and direct questions
//! arriving outside the perception stream. Complex questions go to the
//! deep model, simple ones to the fast model; generation is supervised by
//! the thinking-acknowledgment timer so a slow deep call never leaves the
//! user in dead air.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use redi_core::{Error, GenerateRequest, LanguageModel};
use redi_config::constants::reasoning as defaults;
use redi_config::constants::triage::FAST_MAX_TOKENS;

use crate::filters::clean_direct_answer;

/// Patterns that mark a direct question as needing the deep model
static DEEP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bexplain\b",
        r"\bwhy\b",
        r"how (do|does|can|could|should|would) (i|you|we)",
        r"what'?s the (problem|issue|mistake)",
        r"tell me (about|more|everything)",
        r"describe (in detail|everything|all)",
        r"\banalyze\b",
        r"\bcompare\b",
        r"what (should|could|would) (i|we)",
        r"help me understand",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
    .collect()
});

const ANSWER_SYSTEM_PROMPT: &str = "You are a hands-free assistant answering out loud. \
Answer in at most 25 words. Never ask questions back. Never offer help. \
Ground the answer in the scene context when given.";

/// Whether a direct question warrants the deep model
pub fn is_complex_question(question: &str) -> bool {
    DEEP_PATTERNS.iter().any(|p| p.is_match(question))
        || question.split_whitespace().count() > defaults::DEEP_WORD_THRESHOLD
}

/// One reasoning invocation
pub struct ReasoningRequest<'a> {
    pub question: &'a str,
    /// Scene description assembled from the current packet
    pub device_context: Option<String>,
    /// Server-side visual context slot: (description, age in ms)
    pub server_context: Option<(String, u64)>,
    /// Cleared by the cost guard to force the cheap tier
    pub allow_deep: bool,
}

impl ReasoningRequest<'_> {
    /// Device context preferred; the server slot only when fresh enough.
    fn visual_context(&self) -> Option<&str> {
        if let Some(device) = self.device_context.as_deref() {
            return Some(device);
        }
        self.server_context
            .as_ref()
            .filter(|(_, age_ms)| *age_ms < defaults::VISUAL_CONTEXT_MAX_AGE_MS)
            .map(|(description, _)| description.as_str())
    }
}

/// Router result
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningOutcome {
    pub text: String,
    pub used_deep_model: bool,
    /// Whether the thinking acknowledgment fired during generation
    pub thinking_emitted: bool,
    pub latency_ms: u64,
}

/// The reasoning router; holds both model tiers
pub struct ReasoningRouter {
    fast: Option<Arc<dyn LanguageModel>>,
    deep: Option<Arc<dyn LanguageModel>>,
}

impl ReasoningRouter {
    pub fn new(fast: Option<Arc<dyn LanguageModel>>, deep: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { fast, deep }
    }

    /// Answer a question. `thinking` carries a pre-rotated phrase and the
    /// out-of-band channel it is spoken through if generation is still
    /// running when the 2-second timer fires; the acknowledgment never
    /// enters the admission pipeline.
    pub async fn answer(
        &self,
        request: ReasoningRequest<'_>,
        thinking: Option<(String, mpsc::Sender<String>)>,
    ) -> redi_core::Result<ReasoningOutcome> {
        let complex = is_complex_question(request.question) && request.allow_deep;
        let (model, used_deep_model) = self.select_model(complex)?;

        let mut prompt = String::new();
        if let Some(context) = request.visual_context() {
            prompt.push_str(&format!("Scene: {}\n", context));
        }
        prompt.push_str(request.question);

        let max_tokens = if used_deep_model {
            defaults::DEEP_MAX_TOKENS
        } else {
            FAST_MAX_TOKENS
        };
        let generate_request = GenerateRequest::new(ANSWER_SYSTEM_PROMPT)
            .with_user_message(prompt)
            .with_max_tokens(max_tokens)
            .with_temperature(0.7);

        let started = Instant::now();
        let generation = model.generate(generate_request);
        tokio::pin!(generation);

        let ack_timer = tokio::time::sleep(Duration::from_millis(defaults::THINKING_ACK_DELAY_MS));
        tokio::pin!(ack_timer);

        let mut thinking = thinking;
        let mut thinking_emitted = false;
        let response = loop {
            tokio::select! {
                result = &mut generation => break result?,
                _ = &mut ack_timer, if thinking.is_some() => {
                    if let Some((phrase, tx)) = thinking.take() {
                        tracing::debug!(phrase = %phrase, "thinking acknowledgment fired");
                        let _ = tx.send(phrase).await;
                        thinking_emitted = true;
                    }
                }
            }
        };

        let text = clean_direct_answer(&response.text);
        tracing::debug!(
            deep = used_deep_model,
            latency_ms = response.latency_ms,
            "reasoning answer generated"
        );

        Ok(ReasoningOutcome {
            text,
            used_deep_model,
            thinking_emitted,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Deep for complex questions, fast otherwise; either tier covers for
    /// a missing counterpart.
    fn select_model(&self, complex: bool) -> redi_core::Result<(Arc<dyn LanguageModel>, bool)> {
        let (preferred, fallback, prefer_deep) = if complex {
            (&self.deep, &self.fast, true)
        } else {
            (&self.fast, &self.deep, false)
        };
        if let Some(model) = preferred {
            return Ok((model.clone(), prefer_deep));
        }
        if let Some(model) = fallback {
            return Ok((model.clone(), !prefer_deep));
        }
        Err(Error::Disabled("llm"))
    }
}
