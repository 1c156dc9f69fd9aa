//! Engine runtime — one long-lived worker per engine
//!
//! The scheduler owns the engine arena; each worker holds its own metadata
//! handle, its handler, and the link endpoints touching it. Per dispatched
//! step the worker drains its inbox, invokes the handler bounded by the
//! timeout, updates its performance EMA and task history, forwards a result
//! summary over its links, and replies to the scheduler over a oneshot.

use crate::link::LinkEndpoint;
use echoloop_core::{
    CognitiveState, EngineId, LinkId, LinkMessage, Specialization, StateView, StepHandler,
    StepResult, StepType, TaskRecord,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Performance EMA weight per completed step.
const PERFORMANCE_ALPHA: f64 = 0.1;

/// Mutable engine metadata, shared between the worker (writes) and the
/// scheduler (metrics, snapshots).
#[derive(Debug, Clone)]
pub struct EngineMeta {
    pub id: EngineId,
    pub specialization: Specialization,
    pub phase_offset: u32,
    pub performance: f64,
    pub steps_processed: u64,
    pub tasks_completed: u64,
    pub task_history: VecDeque<TaskRecord>,
    history_retention: usize,
}

impl EngineMeta {
    pub fn new(
        id: EngineId,
        specialization: Specialization,
        phase_offset: u32,
        history_retention: usize,
    ) -> Self {
        Self {
            id,
            specialization,
            phase_offset,
            performance: 0.5,
            steps_processed: 0,
            tasks_completed: 0,
            task_history: VecDeque::new(),
            history_retention: history_retention.max(1),
        }
    }

    fn record(&mut self, record: TaskRecord) {
        self.steps_processed += 1;
        if record.success {
            self.tasks_completed += 1;
            self.performance =
                self.performance * (1.0 - PERFORMANCE_ALPHA) + PERFORMANCE_ALPHA;
        } else {
            self.performance *= 1.0 - PERFORMANCE_ALPHA;
        }
        self.task_history.push_back(record);
        while self.task_history.len() > self.history_retention {
            self.task_history.pop_front();
        }
    }
}

/// One step handed to a worker.
pub(crate) struct Dispatch {
    pub step: u32,
    pub step_type: StepType,
    pub cognitive: CognitiveState,
    pub timeout: Duration,
    pub cancel: CancellationToken,
    pub reply: oneshot::Sender<StepOutcome>,
}

/// What a worker sends back for one dispatched step.
#[derive(Debug)]
pub(crate) struct StepOutcome {
    pub engine: EngineId,
    pub result: StepResult,
    pub error: Option<String>,
    pub latency_ms: u64,
}

pub(crate) enum WorkerCommand {
    Dispatch(Dispatch),
    /// A link added after spawn: the worker's receive half and its sender
    /// toward the peer.
    AttachLink {
        inbound: (LinkId, mpsc::Receiver<LinkMessage>),
        outbound: LinkEndpoint,
    },
}

pub(crate) struct EngineWorker {
    id: EngineId,
    handler: Arc<dyn StepHandler>,
    meta: Arc<Mutex<EngineMeta>>,
    outbound: Vec<LinkEndpoint>,
    inbound: Vec<(LinkId, mpsc::Receiver<LinkMessage>)>,
    commands: mpsc::Receiver<WorkerCommand>,
}

impl EngineWorker {
    pub fn new(
        id: EngineId,
        handler: Arc<dyn StepHandler>,
        meta: Arc<Mutex<EngineMeta>>,
        outbound: Vec<LinkEndpoint>,
        inbound: Vec<(LinkId, mpsc::Receiver<LinkMessage>)>,
        commands: mpsc::Receiver<WorkerCommand>,
    ) -> Self {
        Self {
            id,
            handler,
            meta,
            outbound,
            inbound,
            commands,
        }
    }

    /// Worker loop. Ends when the scheduler drops its command sender.
    pub async fn run(mut self) {
        debug!("{} worker started ({})", self.id, self.handler.name());
        while let Some(command) = self.commands.recv().await {
            match command {
                WorkerCommand::Dispatch(dispatch) => self.handle_dispatch(dispatch).await,
                WorkerCommand::AttachLink { inbound, outbound } => {
                    self.inbound.push(inbound);
                    self.outbound.push(outbound);
                }
            }
        }
        debug!("{} worker stopped", self.id);
    }

    async fn handle_dispatch(&mut self, dispatch: Dispatch) {
        let inbox = self.drain_inbox();
        let view = StateView {
            cognitive: dispatch.cognitive.clone(),
            inbox,
        };

        let started_at = chrono::Utc::now();
        let started = std::time::Instant::now();

        let invocation = self.handler.handle_step(
            dispatch.cancel.clone(),
            dispatch.step,
            dispatch.step_type,
            view,
        );

        let outcome = match tokio::time::timeout(dispatch.timeout, invocation).await {
            Ok(Ok(result)) => {
                let summary = summarize(&result, dispatch.step);
                self.record_task(&dispatch, started_at, started, result.success, &summary);
                if result.success {
                    self.forward(dispatch.step, dispatch.step_type, &summary);
                }
                StepOutcome {
                    engine: self.id,
                    result,
                    error: None,
                    latency_ms: started.elapsed().as_millis() as u64,
                }
            }
            Ok(Err(e)) => {
                warn!("{} handler error on step {}: {}", self.id, dispatch.step, e);
                self.record_task(&dispatch, started_at, started, false, "handler error");
                StepOutcome {
                    engine: self.id,
                    result: StepResult::empty(),
                    error: Some(e.to_string()),
                    latency_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(_) => {
                warn!(
                    "{} handler timed out on step {} after {}ms",
                    self.id,
                    dispatch.step,
                    dispatch.timeout.as_millis()
                );
                self.record_task(&dispatch, started_at, started, false, "handler timeout");
                StepOutcome {
                    engine: self.id,
                    result: StepResult::empty(),
                    error: Some(format!(
                        "timed out after {}ms",
                        dispatch.timeout.as_millis()
                    )),
                    latency_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        // The scheduler may have given up on this step during the grace
        // period; a closed reply channel is not an error here.
        let _ = dispatch.reply.send(outcome);
    }

    /// Pull everything that arrived since the previous scheduled step.
    fn drain_inbox(&mut self) -> Vec<LinkMessage> {
        let mut inbox = Vec::new();
        for (_, rx) in &mut self.inbound {
            while let Ok(message) = rx.try_recv() {
                inbox.push(message);
            }
        }
        inbox
    }

    /// Best-effort result summary to every neighbor. Full queues shed.
    fn forward(&self, step: u32, step_type: StepType, summary: &str) {
        let priority = match step_type {
            StepType::RelevanceRealization => 0.9,
            StepType::AffordanceInteraction => 0.7,
            StepType::SalienceSimulation => 0.5,
        };
        for endpoint in &self.outbound {
            let mut message = LinkMessage::new(self.id, endpoint.to, "step_result", summary);
            message.priority = priority;
            message.timestamp = chrono::Utc::now();
            let _ = endpoint.send(message);
        }
    }

    fn record_task(
        &self,
        dispatch: &Dispatch,
        started_at: chrono::DateTime<chrono::Utc>,
        started: std::time::Instant,
        success: bool,
        summary: &str,
    ) {
        let record = TaskRecord {
            id: uuid::Uuid::new_v4().to_string(),
            step: dispatch.step,
            step_type: dispatch.step_type,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            success,
            summary: summary.to_string(),
        };
        let mut meta = self
            .meta
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        meta.record(record);
    }
}

fn summarize(result: &StepResult, step: u32) -> String {
    if let Some(insight) = result.insights.first() {
        return insight.clone();
    }
    if let Some(commitment) = result
        .state_updates
        .get(echoloop_core::PRESENT_COMMITMENT_KEY)
        .and_then(|v| v.as_str())
    {
        return commitment.to_string();
    }
    format!("step {} complete", step)
}
