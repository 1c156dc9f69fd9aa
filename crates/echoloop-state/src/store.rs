//! SnapshotStore — durable artifacts with an index and retention
//!
//! One file per save, published atomically (write tmp, rename). The index is
//! a single JSON document rewritten atomically on every mutation. Retention
//! prunes the oldest non-checkpoint artifacts past `max_snapshots`;
//! checkpoint-flagged artifacts are never auto-deleted.

use crate::codec;
use echoloop_core::{Artifact, Error, Result, SnapshotInfo};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

const INDEX_FILE: &str = "snapshots.json";

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Directory for artifact files and the index.
    pub storage_dir: PathBuf,
    /// Maximum non-checkpoint artifacts kept on disk.
    pub max_snapshots: usize,
    /// Gzip the whole artifact stream.
    pub compress: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("echoloop-state"),
            max_snapshots: 10,
            compress: true,
        }
    }
}

pub struct SnapshotStore {
    config: SnapshotConfig,
    snapshots: Mutex<Vec<SnapshotInfo>>,
}

impl SnapshotStore {
    /// Open (or create) a store. A missing or unreadable index is not fatal —
    /// the store starts with an empty list, matching the first-run case.
    pub fn open(config: SnapshotConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.storage_dir)?;

        let index_path = config.storage_dir.join(INDEX_FILE);
        let snapshots = match std::fs::read_to_string(&index_path) {
            Ok(json) => match serde_json::from_str::<Vec<SnapshotInfo>>(&json) {
                Ok(list) => list,
                Err(e) => {
                    warn!("Failed to parse snapshot index: {} — starting empty", e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Ok(Self {
            config,
            snapshots: Mutex::new(snapshots),
        })
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Seal and persist an artifact. Returns its index row.
    pub fn save(&self, mut artifact: Artifact, description: &str) -> Result<SnapshotInfo> {
        artifact.description = description.to_string();
        codec::seal(&mut artifact)?;

        let (bytes, checksum) = codec::encode(&artifact, self.config.compress)?;

        let nanos = artifact.timestamp.timestamp_nanos_opt().unwrap_or(0);
        let mut filename = format!("state_{}.echo", nanos);
        if self.config.compress {
            filename.push_str(".gz");
        }
        let path = self.config.storage_dir.join(&filename);

        // Atomic publish: a failed write leaves no partial artifact behind.
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &path)?;

        let record = SnapshotInfo {
            path: path.clone(),
            timestamp: artifact.timestamp,
            size: bytes.len() as u64,
            checksum,
            description: description.to_string(),
            is_checkpoint: false,
        };

        {
            let mut snapshots = lock(&self.snapshots);
            snapshots.push(record.clone());
            self.prune(&mut snapshots);
            self.write_index(&snapshots)?;
        }

        info!(
            "Saved snapshot {} ({} bytes): {}",
            path.display(),
            record.size,
            description
        );
        Ok(record)
    }

    /// Save, then flag the resulting entry as a checkpoint (exempt from
    /// retention pruning).
    pub fn create_checkpoint(&self, artifact: Artifact, description: &str) -> Result<SnapshotInfo> {
        let mut record = self.save(artifact, description)?;

        let mut snapshots = lock(&self.snapshots);
        if let Some(entry) = snapshots.iter_mut().find(|s| s.path == record.path) {
            entry.is_checkpoint = true;
        }
        self.write_index(&snapshots)?;

        record.is_checkpoint = true;
        info!("Checkpoint created: {}", record.path.display());
        Ok(record)
    }

    /// Load and verify one artifact. Fails closed on any corruption.
    pub fn load(&self, path: &Path) -> Result<Artifact> {
        let bytes = std::fs::read(path)?;
        codec::decode(&bytes)
    }

    pub fn list_snapshots(&self) -> Vec<SnapshotInfo> {
        lock(&self.snapshots).clone()
    }

    pub fn latest_snapshot(&self) -> Option<SnapshotInfo> {
        lock(&self.snapshots).last().cloned()
    }

    pub fn latest_checkpoint(&self) -> Option<SnapshotInfo> {
        lock(&self.snapshots)
            .iter()
            .rev()
            .find(|s| s.is_checkpoint)
            .cloned()
    }

    /// Remove one artifact from disk and the index.
    pub fn delete_snapshot(&self, path: &Path) -> Result<()> {
        let mut snapshots = lock(&self.snapshots);
        let before = snapshots.len();
        snapshots.retain(|s| s.path != path);
        if snapshots.len() == before {
            return Err(Error::SnapshotNotFound(path.display().to_string()));
        }

        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        self.write_index(&snapshots)?;
        Ok(())
    }

    /// Drop the oldest non-checkpoint entries until at most `max_snapshots`
    /// remain. Checkpoints are untouchable here.
    fn prune(&self, snapshots: &mut Vec<SnapshotInfo>) {
        loop {
            let plain = snapshots.iter().filter(|s| !s.is_checkpoint).count();
            if plain <= self.config.max_snapshots {
                return;
            }
            let Some(oldest) = snapshots.iter().position(|s| !s.is_checkpoint) else {
                return;
            };
            let victim = snapshots.remove(oldest);
            if let Err(e) = std::fs::remove_file(&victim.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to prune {}: {}", victim.path.display(), e);
                }
            } else {
                info!("Pruned snapshot {}", victim.path.display());
            }
        }
    }

    fn write_index(&self, snapshots: &[SnapshotInfo]) -> Result<()> {
        let path = self.config.storage_dir.join(INDEX_FILE);
        let json = serde_json::to_string_pretty(snapshots)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
