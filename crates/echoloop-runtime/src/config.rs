//! Runtime configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use echoloop_state::SnapshotConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of engines. Must be at least 2 and divide the 12-step cycle.
    pub engines: usize,
    /// Milliseconds between driven steps.
    pub step_interval_ms: u64,
    /// Per-invocation handler timeout in milliseconds. Handlers usually make
    /// a network call to a reasoning provider.
    pub handler_timeout_ms: u64,
    /// Extra wait past the handler timeout before the scheduler tears down
    /// regardless of stragglers.
    pub grace_period_ms: u64,
    /// Bounded capacity of each link direction. A full queue sheds.
    pub link_capacity: usize,
    /// Insights kept in shared state before the oldest are evicted.
    pub insight_retention: usize,
    /// Task records kept per engine.
    pub task_history_retention: usize,
    /// Seconds between auto-saves. 0 disables the auto-save task.
    pub auto_save_secs: u64,
    /// Snapshot storage.
    pub snapshot: SnapshotConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engines: 4,
            step_interval_ms: 500,
            handler_timeout_ms: 30_000,
            grace_period_ms: 5_000,
            link_capacity: 10,
            insight_retention: 64,
            task_history_retention: 32,
            auto_save_secs: 0,
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}
