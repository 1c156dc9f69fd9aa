//! Incremental delta log — cheap checkpoints between full saves
//!
//! Deltas are recorded against the base artifact's checksum and replayed onto
//! a clone of the base to produce the current logical state. `compact`
//! materializes the replay as the new base and clears the log.

use crate::codec;
use chrono::{DateTime, Utc};
use echoloop_core::{Artifact, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One recorded change against a base artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub base_checksum: String,
    pub timestamp: DateTime<Utc>,
    pub changes: HashMap<String, serde_json::Value>,
}

pub struct DeltaLog {
    base: Artifact,
    deltas: Vec<Delta>,
}

impl DeltaLog {
    /// Start a log over a base artifact. An unsealed base is sealed first so
    /// deltas always key off a real checksum.
    pub fn new(mut base: Artifact) -> Result<Self> {
        if base.checksum.is_empty() {
            codec::seal(&mut base)?;
        }
        Ok(Self {
            base,
            deltas: Vec::new(),
        })
    }

    pub fn base(&self) -> &Artifact {
        &self.base
    }

    pub fn pending(&self) -> usize {
        self.deltas.len()
    }

    /// Record one field change against the current base.
    pub fn record(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let mut changes = HashMap::new();
        changes.insert(key.into(), value);
        self.deltas.push(Delta {
            base_checksum: self.base.checksum.clone(),
            timestamp: Utc::now(),
            changes,
        });
    }

    /// Replay all deltas onto a clone of the base. The base itself is never
    /// mutated here.
    pub fn apply_deltas(&self) -> Artifact {
        let mut state = self.base.clone();
        for delta in &self.deltas {
            for (key, value) in &delta.changes {
                apply_change(&mut state, key, value);
            }
        }
        state.timestamp = Utc::now();
        state
    }

    /// Fold the deltas into a new base with a fresh checksum and clear the log.
    pub fn compact(&mut self) -> Result<()> {
        let mut next = self.apply_deltas();
        codec::seal(&mut next)?;
        self.base = next;
        self.deltas.clear();
        Ok(())
    }
}

/// Apply one keyed change. Clock and aggregate-metric scalars are recognized
/// by name; anything else lands in the cognitive update map.
fn apply_change(state: &mut Artifact, key: &str, value: &serde_json::Value) {
    match key {
        "current_step" => {
            if let Some(v) = value.as_u64() {
                state.clock.current_step = v as u32;
                state.metrics.current_step = v as u32;
            }
        }
        "cycle_count" => {
            if let Some(v) = value.as_u64() {
                state.clock.cycle_count = v;
            }
        }
        "total_steps" => {
            if let Some(v) = value.as_u64() {
                state.metrics.total_steps = v;
            }
        }
        "total_cycles" => {
            if let Some(v) = value.as_u64() {
                state.metrics.total_cycles = v;
            }
        }
        _ => {
            state
                .cognitive
                .state_updates
                .insert(key.to_string(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Artifact {
        let mut artifact = Artifact::new("delta base", 8);
        artifact.clock.current_step = 3;
        artifact.clock.cycle_count = 1;
        artifact
    }

    #[test]
    fn record_keys_off_base_checksum() {
        let mut log = DeltaLog::new(base()).unwrap();
        let base_checksum = log.base().checksum.clone();
        assert!(!base_checksum.is_empty());

        log.record("current_step", json!(9));
        assert_eq!(log.pending(), 1);
        log.record("mood", json!("focused"));

        let replayed = log.apply_deltas();
        assert_eq!(replayed.clock.current_step, 9);
        assert_eq!(replayed.cognitive.state_updates["mood"], json!("focused"));
        // Base untouched until compaction
        assert_eq!(log.base().clock.current_step, 3);
    }

    #[test]
    fn later_delta_wins_per_key() {
        let mut log = DeltaLog::new(base()).unwrap();
        log.record("cycle_count", json!(5));
        log.record("cycle_count", json!(7));
        assert_eq!(log.apply_deltas().clock.cycle_count, 7);
    }

    #[test]
    fn compact_rebases_and_clears() {
        let mut log = DeltaLog::new(base()).unwrap();
        let old_checksum = log.base().checksum.clone();

        log.record("current_step", json!(12));
        log.record("total_steps", json!(24));
        log.compact().unwrap();

        assert_eq!(log.pending(), 0);
        assert_eq!(log.base().clock.current_step, 12);
        assert_eq!(log.base().metrics.total_steps, 24);
        assert_ne!(log.base().checksum, old_checksum);

        // New deltas key off the new base
        log.record("cycle_count", json!(2));
        let replayed = log.apply_deltas();
        assert_eq!(replayed.clock.current_step, 12);
        assert_eq!(replayed.clock.cycle_count, 2);
    }
}
