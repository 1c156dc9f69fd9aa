//! Persistence glue — wiring the scheduler to the snapshot store
//!
//! Startup policy: a failed load of any kind yields fresh state with a
//! warning, never a refused start. Auto-save failures are logged and retried
//! on the next tick; they never stop the running scheduler.

use crate::scheduler::Scheduler;
use echoloop_core::{Result, SnapshotInfo};
use echoloop_state::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capture the scheduler and persist one snapshot.
pub async fn save(
    scheduler: &Scheduler,
    store: &SnapshotStore,
    description: &str,
) -> Result<SnapshotInfo> {
    let artifact = scheduler.capture_artifact(description).await;
    store.save(artifact, description)
}

/// Capture the scheduler and persist a checkpoint (never auto-pruned).
pub async fn create_checkpoint(
    scheduler: &Scheduler,
    store: &SnapshotStore,
    description: &str,
) -> Result<SnapshotInfo> {
    let artifact = scheduler.capture_artifact(description).await;
    store.create_checkpoint(artifact, description)
}

/// Restore from the latest snapshot if one loads cleanly; otherwise start
/// fresh. Returns whether a restore happened.
pub async fn restore_latest_or_fresh(scheduler: &Scheduler, store: &SnapshotStore) -> bool {
    let Some(latest) = store.latest_snapshot() else {
        info!("No snapshots found — starting fresh");
        return false;
    };

    match store.load(&latest.path) {
        Ok(artifact) => match scheduler.restore(&artifact).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Could not apply snapshot {}: {} — starting fresh",
                    latest.path.display(),
                    e
                );
                false
            }
        },
        Err(e) => {
            warn!(
                "Could not load snapshot {}: {} — starting fresh",
                latest.path.display(),
                e
            );
            false
        }
    }
}

/// Periodic auto-save task. Runs until cancelled.
pub fn spawn_auto_save(
    scheduler: Arc<Scheduler>,
    store: Arc<SnapshotStore>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the first save lands
        // a full interval after startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match save(&scheduler, &store, "auto-save").await {
                        Ok(saved) => info!("Auto-saved {}", saved.path.display()),
                        Err(e) => warn!("Auto-save failed: {} — will retry next tick", e),
                    }
                }
            }
        }
    })
}
