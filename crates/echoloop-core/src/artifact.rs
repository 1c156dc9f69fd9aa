//! Artifact data model — the durable shape of a running scheduler
//!
//! An artifact is immutable once written. The binary encoding, checksumming,
//! and storage live in `echoloop-state`; this module is the schema only.

use crate::types::{CognitiveState, EngineId, Metrics, Specialization, TaskRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Schema version written into every artifact and its binary header.
pub const ARTIFACT_VERSION: u32 = 1;

/// Step clock scalars — the always-recoverable part of a snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub current_step: u32,
    pub cycle_count: u64,
}

/// One engine's durable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub id: EngineId,
    pub specialization: Specialization,
    pub phase_offset: u32,
    pub performance: f64,
    pub steps_processed: u64,
    pub tasks_completed: u64,
    /// Bounded recent history; in-flight tasks are never captured.
    pub task_history: Vec<TaskRecord>,
}

/// One link's durable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub a: EngineId,
    pub b: EngineId,
    pub strength: f64,
    pub dropped: u64,
}

/// Complete durable state of the scheduler at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    /// Hex SHA-256 of the artifact JSON serialized with this field empty.
    /// Filled in by the snapshot store at save time; deltas are recorded
    /// against it.
    pub checksum: String,
    pub description: String,
    pub clock: ClockSnapshot,
    pub engines: Vec<EngineSnapshot>,
    pub links: Vec<LinkSnapshot>,
    pub cognitive: CognitiveState,
    pub metrics: Metrics,
}

impl Artifact {
    pub fn new(description: impl Into<String>, insight_retention: usize) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            timestamp: Utc::now(),
            checksum: String::new(),
            description: description.into(),
            clock: ClockSnapshot::default(),
            engines: Vec::new(),
            links: Vec::new(),
            cognitive: CognitiveState::new(insight_retention),
            metrics: Metrics::default(),
        }
    }
}

/// Index row for one stored artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
    /// Hex SHA-256 of the uncompressed binary payload, as written in the
    /// artifact header.
    pub checksum: String,
    pub description: String,
    pub is_checkpoint: bool,
}
