//! Per-session decision task
//!
//! One spawned task per session owns the orchestrator and serializes the
//! whole decision chain: it dequeues one packet, runs rules → triage →
//! reasoning → admission to completion, then advances. Packets arriving
//! while a chain is in flight coalesce to the newest: the device emits up
//! to 2 Hz and the pipeline must always reason over the freshest
//! observation rather than building a backlog.
//!
//! Speech signals bypass the task entirely via [`SpeechFlags`] so an
//! in-flight approval sees the interruption immediately.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;

use redi_core::{PerceptionPacket, ResponseSource, SessionMode};
use redi_decision::SpeechFlags;

use crate::orchestrator::SessionOrchestrator;

/// Newest-wins packet slot.
///
/// A push while the slot is full replaces its content; the dropped packet
/// is never processed.
#[derive(Default)]
pub struct CoalescingQueue {
    slot: Mutex<Option<PerceptionPacket>>,
    notify: Notify,
}

impl CoalescingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a packet, replacing any packet not yet picked up.
    pub fn push(&self, packet: PerceptionPacket) {
        let replaced = self.slot.lock().replace(packet).is_some();
        if replaced {
            tracing::trace!("coalesced stale packet");
        }
        self.notify.notify_one();
    }

    /// Wait for the next packet.
    pub async fn pop(&self) -> PerceptionPacket {
        loop {
            if let Some(packet) = self.slot.lock().take() {
                return packet;
            }
            self.notify.notified().await;
        }
    }
}

/// Control-plane commands for a session task
#[derive(Debug, Clone)]
pub enum SessionCommand {
    DirectQuestion(String),
    SetMode(SessionMode),
    SetSensitivity(f32),
    Shutdown,
}

/// Events a session task emits
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Approved response ready for TTS
    Response {
        text: String,
        source: ResponseSource,
    },
    /// Out-of-band thinking acknowledgment
    Thinking(String),
    /// Rep counter advanced
    Rep(u32),
}

/// Handle to a running session decision task
pub struct SessionTask {
    queue: Arc<CoalescingQueue>,
    command_tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
    flags: Arc<SpeechFlags>,
    handle: JoinHandle<()>,
}

impl SessionTask {
    /// Spawn the decision task for `orchestrator`.
    pub fn spawn(mut orchestrator: SessionOrchestrator) -> Self {
        let queue = Arc::new(CoalescingQueue::new());
        let (command_tx, mut command_rx) = mpsc::channel::<SessionCommand>(32);
        let (event_tx, _) = broadcast::channel::<SessionEvent>(64);
        let flags = orchestrator.speech_flags();

        // Out-of-band thinking acknowledgments: forwarded to subscribers
        // without entering the admission pipeline.
        let (thinking_tx, mut thinking_rx) = mpsc::channel::<String>(8);
        {
            let event_tx = event_tx.clone();
            tokio::spawn(async move {
                while let Some(phrase) = thinking_rx.recv().await {
                    let _ = event_tx.send(SessionEvent::Thinking(phrase));
                }
            });
        }

        let task_queue = queue.clone();
        let task_events = event_tx.clone();
        let session_id = orchestrator.session_id().to_string();

        let handle = tokio::spawn(async move {
            tracing::info!(session = %session_id, "decision task started");
            loop {
                tokio::select! {
                    command = command_rx.recv() => {
                        match command {
                            Some(SessionCommand::DirectQuestion(question)) => {
                                let decision = orchestrator
                                    .handle_direct_question(
                                        &question,
                                        epoch_ms(),
                                        Some(thinking_tx.clone()),
                                    )
                                    .await;
                                emit(&task_events, decision.response, decision.new_rep);
                            }
                            Some(SessionCommand::SetMode(mode)) => {
                                orchestrator.set_mode(mode);
                            }
                            Some(SessionCommand::SetSensitivity(sensitivity)) => {
                                orchestrator.set_sensitivity(sensitivity);
                            }
                            Some(SessionCommand::Shutdown) | None => break,
                        }
                    }
                    packet = task_queue.pop() => {
                        let decision = orchestrator
                            .handle_packet(&packet, epoch_ms(), Some(thinking_tx.clone()))
                            .await;
                        emit(&task_events, decision.response, decision.new_rep);
                    }
                }
            }
            tracing::info!(session = %session_id, "decision task stopped");
            // Orchestrator (rule, pipeline, cost, visual-context state)
            // drops here with the task.
        });

        Self {
            queue,
            command_tx,
            event_tx,
            flags,
            handle,
        }
    }

    /// Submit a perception packet (newest-wins). Malformed packets are
    /// dropped at this boundary.
    pub fn submit_packet(&self, packet: PerceptionPacket) {
        if let Err(err) = packet.validate() {
            tracing::warn!(error = %err, "dropping malformed packet");
            return;
        }
        self.queue.push(packet);
    }

    pub async fn send(&self, command: SessionCommand) {
        let _ = self.command_tx.send(command).await;
    }

    /// Clone of the command channel for callers that cannot hold the task
    /// handle across an await.
    pub fn command_sender(&self) -> mpsc::Sender<SessionCommand> {
        self.command_tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Immediate interruption signal; takes effect even mid-chain.
    pub fn set_user_speaking(&self, speaking: bool) {
        self.flags.set_user_speaking(speaking, epoch_ms());
    }

    pub fn set_redi_speaking(&self, speaking: bool) {
        self.flags.set_redi_speaking(speaking);
    }

    /// Stop the task and wait for it to drain.
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown).await;
        let _ = self.handle.await;
    }
}

fn emit(
    events: &broadcast::Sender<SessionEvent>,
    response: Option<(String, ResponseSource)>,
    new_rep: Option<u32>,
) {
    if let Some(rep) = new_rep {
        let _ = events.send(SessionEvent::Rep(rep));
    }
    if let Some((text, source)) = response {
        let _ = events.send(SessionEvent::Response { text, source });
    }
}

fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorConfig;
    use async_trait::async_trait;
    use redi_core::{
        GenerateRequest, GenerateResponse, LanguageModel, TranscriptSegment,
    };
    use redi_decision::{ReasoningRouter, TriageEngine};
    use redi_metrics::SessionMetrics;
    use std::time::Duration;

    /// Records every prompt it sees and replies after a fixed delay.
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
        delay: Duration,
        reply: &'static str,
    }

    impl RecordingModel {
        fn arc(delay_ms: u64, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                delay: Duration::from_millis(delay_ms),
                reply,
            })
        }
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        async fn generate(&self, request: GenerateRequest) -> redi_core::Result<GenerateResponse> {
            if let Some(message) = request.messages.first() {
                self.prompts.lock().push(message.content.clone());
            }
            tokio::time::sleep(self.delay).await;
            Ok(GenerateResponse {
                text: self.reply.to_string(),
                latency_ms: self.delay.as_millis() as u64,
                model: "recording".into(),
            })
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn task_with_model(model: Arc<RecordingModel>) -> SessionTask {
        let fast: Arc<dyn LanguageModel> = model;
        let orchestrator = SessionOrchestrator::new(
            "queue-test",
            OrchestratorConfig::default(),
            TriageEngine::new(Some(fast.clone())),
            ReasoningRouter::new(Some(fast), None),
            Arc::new(Mutex::new(SessionMetrics::new())),
        );
        SessionTask::spawn(orchestrator)
    }

    fn packet(text: &str) -> PerceptionPacket {
        let mut p = PerceptionPacket::empty(0);
        p.transcript = Some(TranscriptSegment {
            text: text.into(),
            is_final: true,
        });
        p
    }

    #[tokio::test]
    async fn queue_keeps_newest_packet_only() {
        let queue = CoalescingQueue::new();
        queue.push(packet("one"));
        queue.push(packet("two"));
        queue.push(packet("three"));
        let popped = queue.pop().await;
        assert_eq!(popped.transcript.unwrap().text, "three");
    }

    #[tokio::test]
    async fn packets_during_suspension_coalesce_to_newest() {
        let model = RecordingModel::arc(200, "SILENT");
        let task = task_with_model(model.clone());

        task.submit_packet(packet("first packet"));
        // Let the task enter the model call for the first packet
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.submit_packet(packet("second packet"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.submit_packet(packet("third packet"));

        // First chain (~200ms) plus the coalesced one
        tokio::time::sleep(Duration::from_millis(500)).await;
        task.shutdown().await;

        let prompts = model.prompts.lock();
        assert_eq!(prompts.len(), 2, "expected exactly two chains, got {:?}", *prompts);
        assert!(prompts[0].contains("first packet"));
        assert!(prompts[1].contains("third packet"));
    }

    #[tokio::test]
    async fn malformed_packet_dropped_at_boundary() {
        let model = RecordingModel::arc(10, "SILENT");
        let task = task_with_model(model.clone());

        let mut bad = packet("bad");
        bad.objects.push(redi_core::DetectedObject {
            label: "x".into(),
            confidence: 2.0,
            bounding_box: None,
            category: None,
        });
        task.submit_packet(bad);
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.shutdown().await;

        assert!(model.prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn interruption_during_suspension_blocks_response() {
        let model = RecordingModel::arc(200, "kettle is boiling");
        let task = task_with_model(model.clone());
        let mut events = task.subscribe();

        task.submit_packet(packet("check the kettle"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        // User starts speaking while the chain is suspended in the model
        task.set_user_speaking(true);
        tokio::time::sleep(Duration::from_millis(400)).await;
        task.shutdown().await;

        // No Response event was emitted
        while let Ok(event) = events.try_recv() {
            assert!(
                !matches!(event, SessionEvent::Response { .. }),
                "response should have been blocked"
            );
        }
    }

    #[tokio::test]
    async fn direct_question_emits_response_event() {
        let model = RecordingModel::arc(10, "Bar path stays over midfoot");
        let task = task_with_model(model.clone());
        let mut events = task.subscribe();

        task.send(SessionCommand::DirectQuestion("what is this".into()))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.shutdown().await;

        let mut saw_response = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Response { text, source } = event {
                assert_eq!(source, ResponseSource::Reasoning);
                assert!(text.starts_with("Bar path"));
                saw_response = true;
            }
        }
        assert!(saw_response);
    }
}
