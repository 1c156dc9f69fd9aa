//! Echoloop core — shared vocabulary of the cognitive scheduler
//!
//! Pure data and contracts: step/phase/engine types, the shared cognitive
//! state, the `StepHandler` reasoning interface, the artifact schema, and the
//! error taxonomy. The live machine lives in `echoloop-runtime`, durability
//! in `echoloop-state`.

pub mod artifact;
pub mod error;
pub mod handler;
pub mod types;

pub use artifact::{Artifact, ClockSnapshot, EngineSnapshot, LinkSnapshot, SnapshotInfo, ARTIFACT_VERSION};
pub use error::{Error, Result};
pub use handler::{StateView, StepHandler};
pub use types::{
    step_name, CognitiveState, EngineId, EngineMetrics, Insight, LinkId, LinkMessage, Metrics,
    Phase, Specialization, StepResult, StepType, TaskRecord, TriadId, CYCLE_LENGTH,
    PRESENT_COMMITMENT_KEY, STEP_NAMES,
};
