//! StepHandler — the injected reasoning interface
//!
//! The scheduler never generates thought content itself. Each engine holds a
//! `StepHandler` (an LLM-backed provider in production, a mock in tests) and
//! invokes it once per assigned step, bounded by the configured timeout.

use crate::error::Result;
use crate::types::{CognitiveState, LinkMessage, StepResult, StepType};
use tokio_util::sync::CancellationToken;

/// Read-only view of the world handed to a handler for one step.
///
/// `cognitive` is a clone of the shared state at dispatch time; mutating it
/// has no effect on the scheduler. `inbox` holds the link messages that
/// arrived since the engine's previous scheduled step, in FIFO order per link.
#[derive(Debug, Clone)]
pub struct StateView {
    pub cognitive: CognitiveState,
    pub inbox: Vec<LinkMessage>,
}

/// Reasoning provider invoked on an engine's assigned steps.
///
/// Implementations must be cancel-aware: when `ctx` fires the scheduler is
/// shutting down and the handler should return promptly. A returned error is
/// logged and recorded — the step still completes and the cycle advances.
#[async_trait::async_trait]
pub trait StepHandler: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn handle_step(
        &self,
        ctx: CancellationToken,
        step: u32,
        step_type: StepType,
        state: StateView,
    ) -> Result<StepResult>;
}
