//! Session orchestrator
//!
//! Owns all per-session decision state and runs the three-layer chain for
//! every perception packet: rules first (cheap, safety-critical), then
//! triage (fast model), then reasoning (deep model). Every candidate
//! response passes the admission pipeline before it can be spoken.
//!
//! The orchestrator is single-writer by construction: it lives inside one
//! session's decision task and is never shared.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use parking_lot::Mutex;
use redi_config::constants::hedging;
use redi_config::constants::reasoning::VISUAL_CONTEXT_MAX_AGE_MS;
use redi_config::constants::triage::RECENT_CONTEXT_WINDOW;
use redi_config::modes::default_sensitivity;
use redi_core::{CloudVision, DetectedObject, PerceptionPacket, ResponseSource, SessionMode};
use redi_decision::{
    filters::{MEDIUM_HEDGES, STRONG_HEDGES},
    ReasoningOutcome, ReasoningRequest, ReasoningRouter, ResponsePipeline, TriageDecision,
    TriageEngine, TriageInput, Verdict, SAFE_RESPONSES,
};
use redi_metrics::SessionMetrics;
use redi_perception::{describe_scene, ground, scene_confidence, GroundingInput, RuleEngine};

use crate::cost::{CostGuard, TextModel, Tier};
use crate::thinking::ThinkingPhrases;

/// Orchestrator construction parameters
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub mode: SessionMode,
    pub sensitivity: f32,
    pub tier: Tier,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::General,
            sensitivity: default_sensitivity(SessionMode::General),
            tier: Tier::Free,
        }
    }
}

/// Outcome of handling one input
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decision {
    /// Approved response text and its producing layer, if any
    pub response: Option<(String, ResponseSource)>,
    /// Newly completed rep count, when the packet advanced it
    pub new_rep: Option<u32>,
}

impl Decision {
    fn silent() -> Self {
        Self::default()
    }

    fn speak(text: String, source: ResponseSource) -> Self {
        Self {
            response: Some((text, source)),
            new_rep: None,
        }
    }
}

/// Per-session decision state machine
pub struct SessionOrchestrator {
    session_id: String,
    mode: SessionMode,
    sensitivity: f32,
    last_spoke_at_ms: Option<u64>,
    recent_context: VecDeque<String>,
    /// Server-side visual context: last confident scene description and
    /// the timestamp it was assembled at
    visual_context: Option<(String, u64)>,
    thinking: ThinkingPhrases,
    rules: RuleEngine,
    pipeline: ResponsePipeline,
    triage: TriageEngine,
    reasoning: ReasoningRouter,
    cost: Arc<Mutex<CostGuard>>,
    metrics: Arc<Mutex<SessionMetrics>>,
    cloud_vision: Option<Arc<dyn CloudVision>>,
    last_vision_call_ms: Option<u64>,
}

impl SessionOrchestrator {
    pub fn new(
        session_id: impl Into<String>,
        config: OrchestratorConfig,
        triage: TriageEngine,
        reasoning: ReasoningRouter,
        metrics: Arc<Mutex<SessionMetrics>>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            mode: config.mode,
            sensitivity: config.sensitivity.clamp(0.0, 1.0),
            last_spoke_at_ms: None,
            recent_context: VecDeque::new(),
            visual_context: None,
            thinking: ThinkingPhrases::new(),
            rules: RuleEngine::new(),
            pipeline: ResponsePipeline::default(),
            triage,
            reasoning,
            cost: Arc::new(Mutex::new(CostGuard::new(config.tier))),
            metrics,
            cloud_vision: None,
            last_vision_call_ms: None,
        }
    }

    /// Attach the cloud-vision fallback for packets carrying an encoded
    /// frame.
    pub fn with_cloud_vision(mut self, cloud_vision: Arc<dyn CloudVision>) -> Self {
        if cloud_vision.is_enabled() {
            self.cloud_vision = Some(cloud_vision);
        }
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    /// Shared handle to the session's spend ledger; the server reads it
    /// for the cost endpoint and the final bill at session end.
    pub fn cost_handle(&self) -> Arc<Mutex<CostGuard>> {
        self.cost.clone()
    }

    /// Process one perception packet through the full decision chain.
    pub async fn handle_packet(
        &mut self,
        packet: &PerceptionPacket,
        now_ms: u64,
        thinking_tx: Option<mpsc::Sender<String>>,
    ) -> Decision {
        self.pipeline.stamp_context(now_ms);

        if let Some(text) = packet.final_transcript() {
            self.recent_context.push_back(text.to_string());
            while self.recent_context.len() > RECENT_CONTEXT_WINDOW {
                self.recent_context.pop_front();
            }
        }

        let new_rep = self.rules.update_reps(packet).then(|| self.rules.rep_count());

        let cloud_detections = self.cloud_detect(packet, now_ms).await;

        // Refresh the server-side visual context whenever the packet yields
        // a confident scene. Later thin packets borrow it instead of
        // letting the fast model hallucinate.
        if let Some(description) = describe_scene(packet) {
            self.visual_context = Some((description, now_ms));
        } else if let Some(cloud) = &cloud_detections {
            let labels: Vec<&str> = cloud
                .iter()
                .filter(|o| o.confidence > 0.5)
                .take(5)
                .map(|o| o.label.as_str())
                .collect();
            if !labels.is_empty() {
                self.visual_context = Some((format!("Visible: {}", labels.join(", ")), now_ms));
            }
        }

        // Layer 1: rules
        let started = Instant::now();
        let rule_outcome = self.rules.evaluate(packet, self.mode, now_ms);
        self.metrics
            .lock()
            .record_latency("rule_engine", started.elapsed().as_millis() as f64);

        if let Some(text) = rule_outcome.response.clone() {
            let decision = match self.admit(&text, ResponseSource::Rule, false, now_ms) {
                Some(approved) => Decision::speak(approved, ResponseSource::Rule),
                None => Decision::silent(),
            };
            return Decision { new_rep, ..decision };
        }

        // Layer 2: triage
        if !self.cost.lock().can_call_text() {
            self.metrics.lock().record_silent();
            return Decision {
                new_rep,
                ..Decision::silent()
            };
        }

        let time_since_last_spoke_ms = self
            .last_spoke_at_ms
            .map_or(u64::MAX, |t| now_ms.saturating_sub(t));
        let server_context = self.fresh_visual_context(now_ms, packet);

        let started = Instant::now();
        let outcome = self
            .triage
            .triage(TriageInput {
                packet,
                recent_context: self.recent_context.make_contiguous(),
                rule_fired: false,
                time_since_last_spoke_ms,
                sensitivity: self.sensitivity,
                mode: self.mode,
                server_visual_context: server_context.as_deref(),
            })
            .await;
        self.metrics
            .lock()
            .record_latency("triage", started.elapsed().as_millis() as f64);

        match outcome.decision {
            TriageDecision::Silent(reason) => {
                tracing::trace!(session = %self.session_id, reason = ?reason, "triage silent");
                self.metrics.lock().record_silent();
                Decision {
                    new_rep,
                    ..Decision::silent()
                }
            }
            TriageDecision::QuickResponse(text) => {
                {
                    let mut cost = self.cost.lock();
                    cost.record_text(TextModel::Haiku);
                    cost.check_warning_threshold();
                }
                self.metrics.lock().record_outcome("text", true);

                let scene = self.packet_scene_confidence(packet, cloud_detections.as_deref());
                let Some(hedged) = apply_hedging(&text, scene) else {
                    self.metrics.lock().record_silent();
                    return Decision {
                        new_rep,
                        ..Decision::silent()
                    };
                };

                let decision = match self.admit(&hedged, ResponseSource::Triage, false, now_ms) {
                    Some(approved) => Decision::speak(approved, ResponseSource::Triage),
                    None => Decision::silent(),
                };
                Decision { new_rep, ..decision }
            }
            TriageDecision::NeedsReasoning { prompt } => {
                let decision = self
                    .run_reasoning(&prompt, Some(packet), now_ms, thinking_tx)
                    .await;
                Decision { new_rep, ..decision }
            }
        }
    }

    /// Answer a direct question arriving outside the perception stream.
    pub async fn handle_direct_question(
        &mut self,
        question: &str,
        now_ms: u64,
        thinking_tx: Option<mpsc::Sender<String>>,
    ) -> Decision {
        // The question itself is fresh context for the staleness guard.
        self.pipeline.stamp_context(now_ms);
        self.run_reasoning(question, None, now_ms, thinking_tx).await
    }

    async fn run_reasoning(
        &mut self,
        question: &str,
        packet: Option<&PerceptionPacket>,
        now_ms: u64,
        thinking_tx: Option<mpsc::Sender<String>>,
    ) -> Decision {
        if !self.cost.lock().can_call_text() {
            self.metrics.lock().record_silent();
            return Decision::silent();
        }

        let allow_deep = self.cost.lock().choose_text_model() == TextModel::Sonnet;
        let device_context = packet.and_then(describe_scene);
        let server_context = self
            .visual_context
            .as_ref()
            .map(|(description, stamped)| (description.clone(), now_ms.saturating_sub(*stamped)));

        let phrase = self.thinking.pick();
        let thinking = thinking_tx.map(|tx| (phrase.to_string(), tx));

        let started = Instant::now();
        let result = self
            .reasoning
            .answer(
                ReasoningRequest {
                    question,
                    device_context,
                    server_context,
                    allow_deep,
                },
                thinking,
            )
            .await;
        self.metrics
            .lock()
            .record_latency("reasoning", started.elapsed().as_millis() as f64);

        match result {
            Ok(ReasoningOutcome {
                text,
                used_deep_model,
                thinking_emitted,
                ..
            }) => {
                {
                    let mut cost = self.cost.lock();
                    cost.record_text(if used_deep_model {
                        TextModel::Sonnet
                    } else {
                        TextModel::Haiku
                    });
                    cost.check_warning_threshold();
                }
                self.metrics.lock().record_outcome("text", true);
                if thinking_emitted {
                    self.thinking.record(phrase);
                    self.metrics.lock().record_thinking_ack();
                }

                match self.admit(&text, ResponseSource::Reasoning, true, now_ms) {
                    Some(approved) => Decision::speak(approved, ResponseSource::Reasoning),
                    None => Decision::silent(),
                }
            }
            Err(err) => {
                tracing::error!(session = %self.session_id, error = %err, "reasoning failed");
                self.metrics.lock().record_outcome("text", false);

                // A direct question deserves an answer even when the
                // provider is down; perception-stream packets fail silent.
                if packet.is_none() {
                    let mut rng = rand::thread_rng();
                    let safe = *SAFE_RESPONSES.choose(&mut rng).unwrap_or(&SAFE_RESPONSES[0]);
                    if let Some(approved) =
                        self.admit(safe, ResponseSource::Reasoning, true, now_ms)
                    {
                        return Decision::speak(approved, ResponseSource::Reasoning);
                    }
                }
                self.metrics.lock().record_silent();
                Decision::silent()
            }
        }
    }

    /// Run the admission pipeline; on approval update speak stamps and
    /// counters.
    fn admit(
        &mut self,
        candidate: &str,
        source: ResponseSource,
        prompted: bool,
        now_ms: u64,
    ) -> Option<String> {
        let started = Instant::now();
        let verdict = self.pipeline.evaluate(candidate, source, prompted, now_ms);
        let mut metrics = self.metrics.lock();
        metrics.record_latency("pipeline", started.elapsed().as_millis() as f64);

        match verdict {
            Verdict::Approved { text, source } => {
                self.last_spoke_at_ms = Some(now_ms);
                metrics.record_response(source, text.split_whitespace().count());
                ::metrics::counter!("redi_responses_total", "source" => source.as_str())
                    .increment(1);
                Some(text)
            }
            Verdict::Rejected(reason) => {
                metrics.record_rejection(reason);
                ::metrics::counter!("redi_rejections_total", "reason" => reason.as_str())
                    .increment(1);
                None
            }
        }
    }

    /// One cloud-vision round trip for a fallback frame, throttled by the
    /// cost guard's recommended interval and call caps.
    async fn cloud_detect(
        &mut self,
        packet: &PerceptionPacket,
        now_ms: u64,
    ) -> Option<Vec<DetectedObject>> {
        let cloud = self.cloud_vision.as_ref()?;
        let frame_b64 = packet.fallback_frame_b64.as_ref()?;

        let interval = self.cost.lock().recommended_vision_interval_ms()?;
        if self
            .last_vision_call_ms
            .is_some_and(|t| now_ms.saturating_sub(t) < interval)
        {
            return None;
        }
        if !self.cost.lock().can_call_vision() {
            return None;
        }
        let frame = match BASE64.decode(frame_b64) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "undecodable fallback frame");
                return None;
            }
        };

        self.last_vision_call_ms = Some(now_ms);
        let started = Instant::now();
        let result = cloud.detect(&frame).await;
        let latency = started.elapsed().as_millis() as f64;

        let mut metrics = self.metrics.lock();
        metrics.record_latency("vision", latency);
        match result {
            Ok(objects) => {
                metrics.record_outcome("vision", true);
                drop(metrics);
                self.cost.lock().record_vision();
                Some(objects)
            }
            Err(err) => {
                tracing::warn!(session = %self.session_id, error = %err, "cloud vision failed");
                metrics.record_outcome("vision", false);
                None
            }
        }
    }

    /// Scene confidence for hedging: grounded detections when the packet
    /// has objects, the default band otherwise.
    fn packet_scene_confidence(
        &self,
        packet: &PerceptionPacket,
        cloud: Option<&[DetectedObject]>,
    ) -> f32 {
        if packet.objects.is_empty() {
            return packet
                .overall_confidence
                .unwrap_or(hedging::DEFAULT_SCENE_CONFIDENCE);
        }
        let grounded = ground(GroundingInput {
            objects: &packet.objects,
            texts: &packet.texts,
            audio_events: &packet.audio_events,
            cloud,
        });
        if grounded.is_empty() {
            packet
                .overall_confidence
                .unwrap_or(hedging::DEFAULT_SCENE_CONFIDENCE)
        } else {
            scene_confidence(&grounded)
        }
    }

    /// The server visual slot, when still fresh and the current packet is
    /// too thin to describe itself.
    fn fresh_visual_context(&self, now_ms: u64, packet: &PerceptionPacket) -> Option<String> {
        if !packet.objects.is_empty() {
            return None;
        }
        self.visual_context
            .as_ref()
            .filter(|(_, stamped)| now_ms.saturating_sub(*stamped) < VISUAL_CONTEXT_MAX_AGE_MS)
            .map(|(description, _)| description.clone())
    }

    /// Mode change: rule state is destroyed, sensitivity returns to the
    /// mode default, conversational context clears.
    pub fn set_mode(&mut self, mode: SessionMode) {
        tracing::info!(session = %self.session_id, from = self.mode.as_str(), to = mode.as_str(), "mode change");
        self.mode = mode;
        self.sensitivity = default_sensitivity(mode);
        self.rules.reset();
        self.recent_context.clear();
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity.clamp(0.0, 1.0);
    }

    pub fn set_user_speaking(&mut self, speaking: bool, now_ms: u64) {
        self.pipeline.set_user_speaking(speaking, now_ms);
    }

    pub fn set_redi_speaking(&mut self, speaking: bool) {
        self.pipeline.set_redi_speaking(speaking);
    }

    /// Shared interruption flags, settable from the transport edge while
    /// this orchestrator's decision task is suspended.
    pub fn speech_flags(&self) -> std::sync::Arc<redi_decision::SpeechFlags> {
        self.pipeline.flags()
    }

    #[cfg(test)]
    pub(crate) fn rules(&self) -> &RuleEngine {
        &self.rules
    }
}

/// Uncertainty hedging for unprompted quick responses.
///
/// Below the suppression band the response is dropped entirely; in the
/// hedge bands a statement (no `!` or `?`) gets a confidence qualifier
/// with the original first character lowercased.
fn apply_hedging(text: &str, scene_confidence: f32) -> Option<String> {
    if scene_confidence < hedging::SUPPRESS_BELOW {
        return None;
    }
    if scene_confidence > hedging::HEDGE_BELOW {
        return Some(text.to_string());
    }
    if text.contains('!') || text.contains('?') {
        return Some(text.to_string());
    }

    let pool: &[&str] = if scene_confidence < hedging::STRONG_HEDGE_BELOW {
        STRONG_HEDGES
    } else {
        MEDIUM_HEDGES
    };
    let mut rng = rand::thread_rng();
    let hedge = pool.choose(&mut rng).copied().unwrap_or(pool[0]);

    let mut chars = text.chars();
    let lowered = match chars.next() {
        Some(first) => format!("{}{}", first.to_lowercase(), chars.as_str()),
        None => return None,
    };
    Some(format!("{}{}", hedge, lowered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use redi_core::{
        GenerateRequest, GenerateResponse, LanguageModel, Movement, MovementPhase, Pose,
        PoseAngles, TranscriptSegment,
    };
    use std::collections::HashMap;

    struct ScriptedModel(&'static str);

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, _request: GenerateRequest) -> redi_core::Result<GenerateResponse> {
            Ok(GenerateResponse {
                text: self.0.to_string(),
                latency_ms: 1,
                model: "scripted".into(),
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn orchestrator(fast: &'static str, deep: &'static str) -> SessionOrchestrator {
        let fast: Arc<dyn LanguageModel> = Arc::new(ScriptedModel(fast));
        let deep: Arc<dyn LanguageModel> = Arc::new(ScriptedModel(deep));
        SessionOrchestrator::new(
            "test-session",
            OrchestratorConfig::default(),
            TriageEngine::new(Some(fast.clone())),
            ReasoningRouter::new(Some(fast), Some(deep)),
            Arc::new(Mutex::new(SessionMetrics::new())),
        )
    }

    fn sports_packet(spine_angle: f32, now_ms: u64) -> PerceptionPacket {
        let mut p = PerceptionPacket::empty(now_ms);
        p.pose = Some(Pose {
            joints: HashMap::new(),
            angles: PoseAngles {
                spine_angle,
                ..Default::default()
            },
            confidence: 0.9,
            body_position: None,
        });
        p.movement = Some(Movement {
            phase: MovementPhase::Concentric,
            velocity: 0.2,
            direction: None,
            is_repetitive: true,
            rep_count: None,
            tempo: None,
        });
        p
    }

    #[tokio::test]
    async fn rule_fires_and_is_approved() {
        let mut orch = orchestrator("unused", "unused");
        orch.set_mode(SessionMode::Sports);
        let decision = orch.handle_packet(&sports_packet(26.0, 0), 1_000, None).await;
        assert_eq!(
            decision.response,
            Some(("Back rounding".to_string(), ResponseSource::Rule))
        );
    }

    #[tokio::test]
    async fn rule_cooldown_suppresses_second_fire() {
        let mut orch = orchestrator("SILENT", "unused");
        orch.set_mode(SessionMode::Sports);
        let packet = sports_packet(26.0, 0);
        assert!(orch.handle_packet(&packet, 1_000, None).await.response.is_some());
        // Inside the 5s cooldown the rule stays quiet and triage declines
        let decision = orch.handle_packet(&packet, 3_000, None).await;
        assert!(decision.response.is_none());
    }

    #[tokio::test]
    async fn dedup_blocks_near_duplicate_from_triage() {
        let mut orch = orchestrator("Back rounding again", "unused");
        orch.set_mode(SessionMode::Sports);
        assert!(orch
            .handle_packet(&sports_packet(26.0, 0), 1_000, None)
            .await
            .response
            .is_some());

        // Past the rate-limit gap; rule on cooldown; triage generates a
        // near-duplicate which the dedup guard rejects.
        let mut packet = sports_packet(10.0, 4_500);
        packet.transcript = Some(TranscriptSegment {
            text: "keep going".into(),
            is_final: true,
        });
        let decision = orch.handle_packet(&packet, 4_500, None).await;
        assert!(decision.response.is_none());
        let metrics = orch.metrics.lock();
        assert_eq!(
            metrics.rejections(redi_core::RejectionReason::Deduplication),
            1
        );
    }

    #[tokio::test]
    async fn complex_transcript_reaches_reasoning_prompted() {
        let mut orch = orchestrator("unused", "Brace harder and keep the bar close to your shins");
        let mut packet = PerceptionPacket::empty(0);
        packet.transcript = Some(TranscriptSegment {
            text: "why is my deadlift rounding my back".into(),
            is_final: true,
        });
        let decision = orch.handle_packet(&packet, 1_000, None).await;
        let (text, source) = decision.response.unwrap();
        assert_eq!(source, ResponseSource::Reasoning);
        assert!(text.starts_with("Brace harder"));
    }

    #[tokio::test]
    async fn quick_response_is_hedged_at_medium_confidence() {
        let mut orch = orchestrator("Kettle is on the stove", "unused");
        let mut packet = PerceptionPacket::empty(0);
        packet.transcript = Some(TranscriptSegment {
            text: "check the kettle".into(),
            is_final: true,
        });
        packet.overall_confidence = Some(0.5);
        let decision = orch.handle_packet(&packet, 1_000, None).await;
        let (text, source) = decision.response.unwrap();
        assert_eq!(source, ResponseSource::Triage);
        assert!(
            MEDIUM_HEDGES.iter().any(|h| text.starts_with(h)),
            "not hedged: {}",
            text
        );
        assert!(text.contains("kettle is on the stove"));
    }

    #[tokio::test]
    async fn very_low_scene_confidence_suppresses() {
        let mut orch = orchestrator("Kettle is on the stove", "unused");
        let mut packet = PerceptionPacket::empty(0);
        packet.transcript = Some(TranscriptSegment {
            text: "check the kettle".into(),
            is_final: true,
        });
        packet.overall_confidence = Some(0.2);
        let decision = orch.handle_packet(&packet, 1_000, None).await;
        assert!(decision.response.is_none());
    }

    #[tokio::test]
    async fn user_speaking_blocks_response() {
        let mut orch = orchestrator("unused", "unused");
        orch.set_mode(SessionMode::Sports);
        orch.set_user_speaking(true, 900);
        let decision = orch.handle_packet(&sports_packet(26.0, 0), 1_000, None).await;
        assert!(decision.response.is_none());
        assert_eq!(
            orch.metrics.lock().rejections(redi_core::RejectionReason::Interruption),
            1
        );
    }

    #[tokio::test]
    async fn direct_question_failure_yields_safe_response() {
        let mut orch = SessionOrchestrator::new(
            "test",
            OrchestratorConfig::default(),
            TriageEngine::new(None),
            ReasoningRouter::new(None, None),
            Arc::new(Mutex::new(SessionMetrics::new())),
        );
        let decision = orch.handle_direct_question("explain this", 1_000, None).await;
        let (text, _) = decision.response.unwrap();
        assert!(SAFE_RESPONSES.contains(&text.as_str()));
    }

    #[tokio::test]
    async fn mode_change_resets_rule_state() {
        let mut orch = orchestrator("SILENT", "unused");
        orch.set_mode(SessionMode::Sports);

        let mut packet = sports_packet(26.0, 0);
        packet.movement.as_mut().unwrap().rep_count = Some(7);
        let decision = orch.handle_packet(&packet, 1_000, None).await;
        assert_eq!(decision.new_rep, Some(7));
        assert!(orch.rules().has_active_cooldowns());

        orch.set_mode(SessionMode::Cooking);
        assert!(!orch.rules().has_active_cooldowns());
        assert_eq!(orch.rules().rep_count(), 0);
        assert_eq!(orch.sensitivity(), default_sensitivity(SessionMode::Cooking));
    }

    struct CountingCloud {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl CloudVision for CountingCloud {
        async fn detect(&self, _frame: &[u8]) -> redi_core::Result<Vec<DetectedObject>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![DetectedObject {
                label: "kettle".into(),
                confidence: 0.9,
                bounding_box: None,
                category: None,
            }])
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn fallback_frame_triggers_throttled_cloud_vision() {
        let cloud = Arc::new(CountingCloud {
            calls: std::sync::atomic::AtomicU32::new(0),
        });
        let mut orch = orchestrator("SILENT", "unused").with_cloud_vision(cloud.clone());

        let mut packet = PerceptionPacket::empty(0);
        packet.transcript = Some(TranscriptSegment {
            text: "what is that".into(),
            is_final: true,
        });
        packet.fallback_frame_b64 = Some(BASE64.encode(b"jpeg-bytes"));

        orch.handle_packet(&packet, 1_000, None).await;
        assert_eq!(cloud.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(orch
            .visual_context
            .as_ref()
            .is_some_and(|(d, _)| d.contains("kettle")));

        // The free tier starts at a 10 s recommended interval: throttled
        orch.handle_packet(&packet, 2_000, None).await;
        assert_eq!(cloud.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        // Past it: allowed again
        orch.handle_packet(&packet, 12_000, None).await;
        assert_eq!(cloud.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(orch.cost.lock().snapshot().vision_calls, 2);
    }

    #[test]
    fn hedging_bands() {
        // High confidence: untouched
        assert_eq!(apply_hedging("kettle on", 0.9), Some("kettle on".into()));
        // Medium: one of the medium hedges, first char lowercased
        let hedged = apply_hedging("Kettle on", 0.5).unwrap();
        assert!(MEDIUM_HEDGES.iter().any(|h| hedged.starts_with(h)));
        assert!(hedged.ends_with("kettle on"));
        // Low: strong hedge
        let hedged = apply_hedging("Kettle on", 0.3).unwrap();
        assert!(STRONG_HEDGES.iter().any(|h| hedged.starts_with(h)));
        // Below suppression: dropped
        assert_eq!(apply_hedging("Kettle on", 0.2), None);
        // Exclamations are left alone
        assert_eq!(apply_hedging("Nice rep!", 0.5), Some("Nice rep!".into()));
    }
}
