//! Mock reasoning provider
//!
//! Deterministic stand-in for an LLM-backed handler: canned content per step
//! type, optional artificial latency, scripted failures for error-path tests.

use echoloop_core::{
    step_name, Error, Result, Specialization, StateView, StepHandler, StepResult, StepType,
    PRESENT_COMMITMENT_KEY,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct MockReasoner {
    name: String,
    specialization: Specialization,
    latency: Duration,
    fail_on_steps: Vec<u32>,
    invocations: AtomicU64,
}

impl MockReasoner {
    pub fn new(specialization: Specialization) -> Self {
        Self {
            name: format!("mock-{}", specialization).to_lowercase(),
            specialization,
            latency: Duration::ZERO,
            fail_on_steps: Vec::new(),
            invocations: AtomicU64::new(0),
        }
    }

    /// Simulate provider latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Return a handler error on the given steps.
    pub fn failing_on(mut self, steps: Vec<u32>) -> Self {
        self.fail_on_steps = steps;
        self
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl StepHandler for MockReasoner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle_step(
        &self,
        ctx: CancellationToken,
        step: u32,
        step_type: StepType,
        state: StateView,
    ) -> Result<StepResult> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        if !self.latency.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.latency) => {}
                _ = ctx.cancelled() => return Err(Error::handler("cancelled")),
            }
        }

        if self.fail_on_steps.contains(&step) {
            return Err(Error::handler(format!("scripted failure on step {}", step)));
        }

        let mut result = StepResult {
            success: true,
            cognitive_load: 0.3 + state.inbox.len() as f64 * 0.05,
            ..Default::default()
        };

        match step_type {
            StepType::RelevanceRealization => {
                result.state_updates.insert(
                    PRESENT_COMMITMENT_KEY.to_string(),
                    serde_json::json!(format!(
                        "[{}] committing to {}",
                        self.specialization,
                        step_name(step)
                    )),
                );
            }
            StepType::AffordanceInteraction => {
                result
                    .insights
                    .push(format!("[{}] acted: {}", self.specialization, step_name(step)));
            }
            StepType::SalienceSimulation => {
                result.insights.push(format!(
                    "[{}] simulated: {}",
                    self.specialization,
                    step_name(step)
                ));
            }
        }

        result.state_updates.insert(
            format!("last_step_{}", self.specialization).to_lowercase(),
            serde_json::json!(step),
        );

        Ok(result)
    }
}
