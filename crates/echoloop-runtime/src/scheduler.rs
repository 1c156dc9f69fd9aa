//! Scheduler — owns the clock, the arenas, and the shared cognitive state
//!
//! Engines, links, and triads live in flat indexed collections here;
//! cross-references are `EngineId`/`LinkId`/`TriadId` indices. One driver
//! loop advances the shared step counter; engines never mutate shared state
//! directly — their results are merged under the state lock in engine-id
//! ascending order, so on a same-key collision the highest id lands last.

use crate::clock::StepClock;
use crate::config::RuntimeConfig;
use crate::engine::{Dispatch, EngineMeta, EngineWorker, StepOutcome, WorkerCommand};
use crate::link::Link;
use crate::topology::Topology;
use echoloop_core::{
    step_name, Artifact, CognitiveState, EngineId, EngineMetrics, EngineSnapshot, Error,
    LinkId, LinkMessage, LinkSnapshot, Metrics, Phase, Result, StepHandler, StepResult,
    StepType, CYCLE_LENGTH,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const WORKER_COMMAND_BUFFER: usize = 8;

struct EngineHandle {
    meta: Arc<std::sync::Mutex<EngineMeta>>,
    commands: mpsc::Sender<WorkerCommand>,
}

#[derive(Default)]
struct Counters {
    total_steps: u64,
    total_cycles: u64,
    handler_errors: u64,
    step_latency_ms: [u64; CYCLE_LENGTH as usize],
    started_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct Scheduler {
    config: RuntimeConfig,
    topology: Arc<Topology>,
    clock: StepClock,
    state: Mutex<CognitiveState>,
    engines: Vec<EngineHandle>,
    links: Mutex<Vec<Link>>,
    /// One mutual-exclusion token per step index. A later cycle reaching a
    /// step index still held by an earlier one is delayed, never
    /// double-dispatched.
    step_tokens: Vec<Arc<Mutex<()>>>,
    counters: std::sync::Mutex<Counters>,
    running: AtomicBool,
    run_cancel: Mutex<Option<CancellationToken>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    root_cancel: CancellationToken,
}

impl Scheduler {
    /// Build the scheduler and spawn one long-lived worker per engine.
    /// `handlers[i]` becomes engine i's reasoning provider. Must be called
    /// from within a tokio runtime.
    pub fn new(config: RuntimeConfig, handlers: Vec<Arc<dyn StepHandler>>) -> Result<Self> {
        let topology = Arc::new(Topology::build(config.engines)?);
        if handlers.len() != topology.engine_count() {
            return Err(Error::invalid_topology(format!(
                "{} handlers for {} engines",
                handlers.len(),
                topology.engine_count()
            )));
        }

        let n = topology.engine_count();
        let mut inbounds: Vec<Vec<(LinkId, mpsc::Receiver<LinkMessage>)>> =
            (0..n).map(|_| Vec::new()).collect();
        let mut outbounds: Vec<Vec<crate::link::LinkEndpoint>> =
            (0..n).map(|_| Vec::new()).collect();

        let mut links = Vec::with_capacity(topology.links().len());
        for spec in topology.links() {
            let (link, rx_a, rx_b) = Link::new(spec.id, spec.a, spec.b, config.link_capacity);
            let (to_a, to_b) = link.endpoints();
            inbounds[spec.a.0].push((spec.id, rx_a));
            inbounds[spec.b.0].push((spec.id, rx_b));
            outbounds[spec.a.0].push(to_b.clone());
            outbounds[spec.b.0].push(to_a.clone());
            links.push(link);
        }

        let mut engines = Vec::with_capacity(n);
        let mut inbounds = inbounds.into_iter();
        let mut outbounds = outbounds.into_iter();
        for (seed, handler) in topology.engines().iter().zip(handlers) {
            let meta = Arc::new(std::sync::Mutex::new(EngineMeta::new(
                seed.id,
                seed.specialization,
                seed.phase_offset,
                config.task_history_retention,
            )));
            let (command_tx, command_rx) = mpsc::channel(WORKER_COMMAND_BUFFER);
            let worker = EngineWorker::new(
                seed.id,
                handler,
                meta.clone(),
                outbounds.next().unwrap_or_default(),
                inbounds.next().unwrap_or_default(),
                command_rx,
            );
            tokio::spawn(worker.run());
            engines.push(EngineHandle {
                meta,
                commands: command_tx,
            });
        }

        let step_tokens = (0..CYCLE_LENGTH)
            .map(|_| Arc::new(Mutex::new(())))
            .collect();

        Ok(Self {
            clock: StepClock::new(topology.clone()),
            state: Mutex::new(CognitiveState::new(config.insight_retention)),
            engines,
            links: Mutex::new(links),
            step_tokens,
            counters: std::sync::Mutex::new(Counters::default()),
            running: AtomicBool::new(false),
            run_cancel: Mutex::new(None),
            driver: Mutex::new(None),
            root_cancel: CancellationToken::new(),
            topology,
            config,
        })
    }

    /// Same handler for every engine.
    pub fn with_shared_handler(
        config: RuntimeConfig,
        handler: Arc<dyn StepHandler>,
    ) -> Result<Self> {
        let handlers = (0..config.engines).map(|_| handler.clone()).collect();
        Self::new(config, handlers)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the driving loop. Rejects a second start while running.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }

        let cancel = self.root_cancel.child_token();
        *self.run_cancel.lock().await = Some(cancel.clone());
        {
            let mut counters = lock(&self.counters);
            if counters.started_at.is_none() {
                counters.started_at = Some(chrono::Utc::now());
            }
        }

        let scheduler = Arc::clone(self);
        let interval = self.config.step_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.step().await {
                            error!("Step failed: {}", e);
                        }
                    }
                }
            }
            debug!("Driver loop exited");
        });
        *self.driver.lock().await = Some(handle);

        info!(
            "Scheduler started: {} engines, {}ms per step",
            self.topology.engine_count(),
            self.config.step_interval_ms
        );
        Ok(())
    }

    /// Stop dispatching, cancel in-flight handlers, and wait out the grace
    /// period. Teardown proceeds regardless of stragglers.
    pub async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(Error::NotRunning);
        }

        if let Some(cancel) = self.run_cancel.lock().await.take() {
            cancel.cancel();
        }

        if let Some(mut handle) = self.driver.lock().await.take() {
            let grace = self.config.handler_timeout() + self.config.grace_period();
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(
                        "Driver did not settle within {}ms, tearing down anyway",
                        grace.as_millis()
                    );
                    handle.abort();
                }
            }
        }

        info!("Scheduler stopped at step {}", self.clock.current_step());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Run one step of the cycle: dispatch, merge, advance. Also the manual
    /// single-step entry point for tests and demos.
    pub async fn step(&self) -> Result<()> {
        let step = self.clock.current_step();
        let step_type = StepType::for_step(step);

        let token = self.step_tokens[(step - 1) as usize].clone();
        let _guard = token.lock().await;

        let active = self.clock.engine_set_for(step);
        let mut outcomes = if active.is_empty() {
            Vec::new()
        } else {
            self.dispatch_step(step, step_type, &active).await
        };

        // Fixed merge order: engine-id ascending, last writer per key wins.
        outcomes.sort_by_key(|o| o.engine);
        {
            let mut state = self.state.lock().await;
            for outcome in &outcomes {
                if outcome.error.is_none() {
                    state.apply(outcome.engine, step, &outcome.result);
                }
            }
        }

        {
            let mut counters = lock(&self.counters);
            counters.total_steps += 1;
            for outcome in &outcomes {
                counters.step_latency_ms[(step - 1) as usize] += outcome.latency_ms;
                if outcome.error.is_some() {
                    counters.handler_errors += 1;
                }
            }
        }

        let (new_step, cycle_completed) = self.clock.advance();
        if cycle_completed {
            let cycles = {
                let mut counters = lock(&self.counters);
                counters.total_cycles += 1;
                counters.total_cycles
            };
            info!("Cycle {} complete", cycles);
        } else {
            debug!(
                "Step {} ({}) done, next step {}",
                step,
                step_name(step),
                new_step
            );
        }
        Ok(())
    }

    async fn dispatch_step(
        &self,
        step: u32,
        step_type: StepType,
        active: &[EngineId],
    ) -> Vec<StepOutcome> {
        let cancel = self
            .run_cancel
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| self.root_cancel.clone());
        let cognitive = self.state.lock().await.clone();

        let mut replies = Vec::with_capacity(active.len());
        for id in active {
            let (reply_tx, reply_rx) = oneshot::channel();
            let dispatch = Dispatch {
                step,
                step_type,
                cognitive: cognitive.clone(),
                timeout: self.config.handler_timeout(),
                cancel: cancel.clone(),
                reply: reply_tx,
            };
            let sent = self.engines[id.0]
                .commands
                .send(WorkerCommand::Dispatch(dispatch))
                .await;
            if sent.is_err() {
                warn!("{} worker unreachable, skipping dispatch", id);
                continue;
            }
            replies.push((*id, reply_rx));
        }

        // Engines sharing a step run concurrently; the wait is bounded by the
        // slowest handler's timeout plus the grace period.
        let overall = self.config.handler_timeout() + self.config.grace_period();
        let waits = replies.into_iter().map(|(id, rx)| async move {
            match tokio::time::timeout(overall, rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) | Err(_) => StepOutcome {
                    engine: id,
                    result: StepResult::empty(),
                    error: Some("no reply from worker".to_string()),
                    latency_ms: overall.as_millis() as u64,
                },
            }
        });
        futures::future::join_all(waits).await
    }

    // -----------------------------------------------------------------------
    // Links and messages
    // -----------------------------------------------------------------------

    /// Add a link between two engines at runtime. A no-op if the pair is
    /// already linked.
    pub async fn add_link(&self, a: EngineId, b: EngineId) -> Result<()> {
        self.check_engine(a)?;
        self.check_engine(b)?;
        if a == b {
            return Err(Error::invalid_topology(format!("self-link on {}", a)));
        }

        let mut links = self.links.lock().await;
        if links
            .iter()
            .any(|l| (l.a == a && l.b == b) || (l.a == b && l.b == a))
        {
            debug!("Link {} <-> {} already exists", a, b);
            return Ok(());
        }

        let id = LinkId(links.len());
        let (link, rx_a, rx_b) = Link::new(id, a, b, self.config.link_capacity);
        let (to_a, to_b) = link.endpoints();

        let attach_a = WorkerCommand::AttachLink {
            inbound: (id, rx_a),
            outbound: to_b.clone(),
        };
        let attach_b = WorkerCommand::AttachLink {
            inbound: (id, rx_b),
            outbound: to_a.clone(),
        };
        if self.engines[a.0].commands.send(attach_a).await.is_err() {
            warn!("{} worker unreachable while attaching link", a);
        }
        if self.engines[b.0].commands.send(attach_b).await.is_err() {
            warn!("{} worker unreachable while attaching link", b);
        }

        links.push(link);
        info!("Link added: {} <-> {}", a, b);
        Ok(())
    }

    /// Enqueue one message over the link between two engines. Non-blocking:
    /// a full queue returns `QueueFull` (the message is dropped and counted).
    pub async fn emit_message(&self, from: EngineId, to: EngineId, payload: &str) -> Result<()> {
        self.check_engine(from)?;
        self.check_engine(to)?;

        let links = self.links.lock().await;
        let link = links
            .iter()
            .find(|l| (l.a == from && l.b == to) || (l.a == to && l.b == from))
            .ok_or(Error::UnknownLink { a: from, b: to })?;

        if link.send(LinkMessage::new(from, to, "external", payload)) {
            Ok(())
        } else {
            Err(Error::QueueFull { from, to })
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub async fn metrics(&self) -> Metrics {
        let (total_steps, total_cycles, handler_errors, step_latency_ms, started_at) = {
            let counters = lock(&self.counters);
            (
                counters.total_steps,
                counters.total_cycles,
                counters.handler_errors,
                counters.step_latency_ms,
                counters.started_at,
            )
        };

        let engines = self
            .engines
            .iter()
            .map(|handle| {
                let meta = lock(&handle.meta);
                EngineMetrics {
                    id: meta.id,
                    specialization: meta.specialization,
                    steps_processed: meta.steps_processed,
                    performance: meta.performance,
                }
            })
            .collect();

        let (messages_sent, messages_dropped) = {
            let links = self.links.lock().await;
            links.iter().fold((0, 0), |(sent, dropped), link| {
                (
                    sent + link.messages_sent(),
                    dropped + link.messages_dropped(),
                )
            })
        };

        Metrics {
            total_steps,
            total_cycles,
            current_step: self.clock.current_step(),
            handler_errors,
            messages_sent,
            messages_dropped,
            step_latency_ms,
            engines,
            started_at,
        }
    }

    /// Status map for dashboards and logs.
    pub async fn status(&self) -> serde_json::Value {
        let step = self.clock.current_step();
        let metrics = self.metrics().await;
        let state = self.state.lock().await;
        let active_triad = self.topology.active_triad(step);

        let engines: Vec<serde_json::Value> = self
            .engines
            .iter()
            .map(|handle| {
                let meta = lock(&handle.meta);
                serde_json::json!({
                    "id": meta.id.0,
                    "specialization": meta.specialization.to_string(),
                    "phase_offset": meta.phase_offset,
                    "performance": meta.performance,
                    "steps_processed": meta.steps_processed,
                    "task_history": meta.task_history.len(),
                })
            })
            .collect();

        let triads: Vec<serde_json::Value> = self
            .topology
            .triads()
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id.0,
                    "engines": t.engines.iter().map(|e| e.0).collect::<Vec<_>>(),
                    "orientation": t.orientation,
                    "active": active_triad == Some(t.id),
                })
            })
            .collect();

        serde_json::json!({
            "running": self.is_running(),
            "current_step": step,
            "step_name": step_name(step),
            "step_type": StepType::for_step(step).to_string(),
            "phase": Phase::for_step(step).to_string(),
            "cycle_count": self.clock.cycle_count(),
            "total_steps": metrics.total_steps,
            "handler_errors": metrics.handler_errors,
            "cognitive_load": state.cognitive_load,
            "present_commitment": state.present_commitment,
            "insights": state.insights.len(),
            "engines": engines,
            "triads": triads,
            "links": {
                "count": self.links.lock().await.len(),
                "messages_sent": metrics.messages_sent,
                "messages_dropped": metrics.messages_dropped,
            },
        })
    }

    pub async fn cognitive_state(&self) -> CognitiveState {
        self.state.lock().await.clone()
    }

    // -----------------------------------------------------------------------
    // Capture / restore
    // -----------------------------------------------------------------------

    /// Snapshot every durable field into an artifact.
    pub async fn capture_artifact(&self, description: &str) -> Artifact {
        let mut artifact = Artifact::new(description, self.config.insight_retention);
        artifact.clock = self.clock.snapshot();

        artifact.engines = self
            .engines
            .iter()
            .map(|handle| {
                let meta = lock(&handle.meta);
                EngineSnapshot {
                    id: meta.id,
                    specialization: meta.specialization,
                    phase_offset: meta.phase_offset,
                    performance: meta.performance,
                    steps_processed: meta.steps_processed,
                    tasks_completed: meta.tasks_completed,
                    task_history: meta.task_history.iter().cloned().collect(),
                }
            })
            .collect();

        artifact.links = {
            let links = self.links.lock().await;
            links
                .iter()
                .map(|l| LinkSnapshot {
                    a: l.a,
                    b: l.b,
                    strength: l.strength,
                    dropped: l.messages_dropped(),
                })
                .collect()
        };

        artifact.cognitive = self.state.lock().await.clone();
        artifact.metrics = self.metrics().await;
        artifact
    }

    /// Re-apply the recoverable fields of an artifact: clock scalars,
    /// aggregate metrics, per-engine performance and history, cognitive
    /// state, link strengths.
    ///
    /// In-flight handler invocations and any reasoning-provider session
    /// context held outside this process are not restored.
    pub async fn restore(&self, artifact: &Artifact) -> Result<()> {
        self.clock.restore(artifact.clock)?;

        {
            let mut counters = lock(&self.counters);
            counters.total_steps = artifact.metrics.total_steps;
            counters.total_cycles = artifact.metrics.total_cycles;
            counters.handler_errors = artifact.metrics.handler_errors;
            counters.step_latency_ms = artifact.metrics.step_latency_ms;
        }

        for snapshot in &artifact.engines {
            let Some(handle) = self.engines.get(snapshot.id.0) else {
                warn!("Artifact references unknown {}, skipping", snapshot.id);
                continue;
            };
            let mut meta = lock(&handle.meta);
            meta.performance = snapshot.performance.clamp(0.0, 1.0);
            meta.steps_processed = snapshot.steps_processed;
            meta.tasks_completed = snapshot.tasks_completed;
            meta.task_history = snapshot.task_history.iter().cloned().collect();
        }

        {
            let mut links = self.links.lock().await;
            for snapshot in &artifact.links {
                if let Some(link) = links.iter_mut().find(|l| {
                    (l.a == snapshot.a && l.b == snapshot.b)
                        || (l.a == snapshot.b && l.b == snapshot.a)
                }) {
                    link.strength = snapshot.strength;
                }
            }
        }

        *self.state.lock().await = artifact.cognitive.clone();

        info!(
            "Restored state: step {}, cycle {}, {} total steps",
            artifact.clock.current_step, artifact.clock.cycle_count, artifact.metrics.total_steps
        );
        Ok(())
    }

    fn check_engine(&self, id: EngineId) -> Result<()> {
        if id.0 < self.engines.len() {
            Ok(())
        } else {
            Err(Error::UnknownEngine(id))
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Workers exit when their command senders drop; in-flight handlers
        // see the cancellation.
        self.root_cancel.cancel();
    }
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
