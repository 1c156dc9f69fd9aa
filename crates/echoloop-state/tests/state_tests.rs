//! Integration tests for echoloop-state
//!
//! Validates the durable surface: save/load roundtrips through the binary
//! codec, fail-closed corruption handling, retention with checkpoint
//! exemption, index persistence across store reopens, and deletion.

use echoloop_core::{Artifact, Error, SnapshotInfo};
use echoloop_state::{SnapshotConfig, SnapshotStore};
use std::path::PathBuf;
use tempfile::TempDir;

fn store_in(dir: &TempDir, max_snapshots: usize, compress: bool) -> SnapshotStore {
    SnapshotStore::open(SnapshotConfig {
        storage_dir: dir.path().to_path_buf(),
        max_snapshots,
        compress,
    })
    .unwrap()
}

fn artifact_at(step: u32, cycle: u64) -> Artifact {
    let mut artifact = Artifact::new("", 8);
    artifact.clock.current_step = step;
    artifact.clock.cycle_count = cycle;
    artifact.metrics.current_step = step;
    artifact.metrics.total_steps = cycle * 12 + u64::from(step);
    artifact.metrics.total_cycles = cycle;
    artifact
}

fn artifact_files(dir: &TempDir) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("state_"))
        })
        .collect();
    files.sort();
    files
}

// ============================================================
// Save / load roundtrip
// ============================================================

#[test]
fn save_then_load_reproduces_clock_and_metrics() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, 10, false);

    let info = store.save(artifact_at(7, 3), "mid-cycle").unwrap();
    assert!(info.path.exists());
    assert_eq!(info.description, "mid-cycle");
    assert_eq!(info.checksum.len(), 64);

    let restored = store.load(&info.path).unwrap();
    assert_eq!(restored.clock.current_step, 7);
    assert_eq!(restored.clock.cycle_count, 3);
    assert_eq!(restored.metrics.total_steps, 43);
    assert_eq!(restored.metrics.total_cycles, 3);
    assert_eq!(restored.description, "mid-cycle");
    assert!(!restored.checksum.is_empty());
}

#[test]
fn compressed_save_roundtrips_and_is_gzip_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, 10, true);

    let info = store.save(artifact_at(12, 9), "compressed").unwrap();
    assert!(info.path.to_string_lossy().ends_with(".echo.gz"));

    let bytes = std::fs::read(&info.path).unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b], "outer file must be a gzip stream");

    let restored = store.load(&info.path).unwrap();
    assert_eq!(restored.clock.current_step, 12);
    assert_eq!(restored.clock.cycle_count, 9);
}

#[test]
fn no_tmp_file_left_behind_after_save() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, 10, false);
    store.save(artifact_at(1, 0), "clean").unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty(), "atomic publish must not leave tmp files");
}

// ============================================================
// Corruption — fail closed
// ============================================================

#[test]
fn flipped_byte_fails_closed_with_checksum_mismatch() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, 10, false);

    let info = store.save(artifact_at(5, 2), "to corrupt").unwrap();

    let mut bytes = std::fs::read(&info.path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    std::fs::write(&info.path, &bytes).unwrap();

    match store.load(&info.path) {
        Err(Error::ChecksumMismatch) => {}
        Err(other) => panic!("expected ChecksumMismatch, got {other}"),
        Ok(_) => panic!("corrupted artifact must not load"),
    }
}

#[test]
fn garbage_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, 10, false);
    let path = dir.path().join("state_0.echo");
    std::fs::write(&path, b"not an artifact at all").unwrap();
    assert!(store.load(&path).is_err());
}

// ============================================================
// Retention — checkpoints are exempt
// ============================================================

#[test]
fn retention_keeps_newest_plain_and_all_checkpoints() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, 3, false);

    let c1 = store
        .create_checkpoint(artifact_at(1, 0), "checkpoint one")
        .unwrap();
    store.save(artifact_at(2, 0), "plain 1").unwrap();
    store.save(artifact_at(3, 0), "plain 2").unwrap();
    let c2 = store
        .create_checkpoint(artifact_at(4, 0), "checkpoint two")
        .unwrap();
    store.save(artifact_at(5, 0), "plain 3").unwrap();
    store.save(artifact_at(6, 0), "plain 4").unwrap();
    store.save(artifact_at(7, 0), "plain 5").unwrap();

    let snapshots = store.list_snapshots();
    let plain: Vec<&SnapshotInfo> = snapshots.iter().filter(|s| !s.is_checkpoint).collect();
    let checkpoints: Vec<&SnapshotInfo> = snapshots.iter().filter(|s| s.is_checkpoint).collect();

    assert_eq!(plain.len(), 3, "only the 3 newest plain snapshots survive");
    let descriptions: Vec<&str> = plain.iter().map(|s| s.description.as_str()).collect();
    assert_eq!(descriptions, ["plain 3", "plain 4", "plain 5"]);

    assert_eq!(checkpoints.len(), 2);
    assert!(c1.path.exists(), "checkpoints are never auto-pruned");
    assert!(c2.path.exists());

    // Disk agrees with the index: 3 plain + 2 checkpoints
    assert_eq!(artifact_files(&dir).len(), 5);
}

#[test]
fn latest_snapshot_and_latest_checkpoint() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, 10, false);

    assert!(store.latest_snapshot().is_none());
    assert!(store.latest_checkpoint().is_none());

    store.save(artifact_at(1, 0), "first").unwrap();
    let cp = store
        .create_checkpoint(artifact_at(2, 0), "the checkpoint")
        .unwrap();
    store.save(artifact_at(3, 0), "last").unwrap();

    assert_eq!(store.latest_snapshot().unwrap().description, "last");
    let latest_cp = store.latest_checkpoint().unwrap();
    assert_eq!(latest_cp.path, cp.path);
    assert!(latest_cp.is_checkpoint);
}

// ============================================================
// Index — atomic, survives reopen
// ============================================================

#[test]
fn index_survives_store_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = store_in(&dir, 10, false);
        store.save(artifact_at(4, 1), "persisted").unwrap();
        store
            .create_checkpoint(artifact_at(8, 1), "persisted checkpoint")
            .unwrap();
    }

    let reopened = store_in(&dir, 10, false);
    let snapshots = reopened.list_snapshots();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].description, "persisted");
    assert!(snapshots[1].is_checkpoint);

    let restored = reopened.load(&snapshots[0].path).unwrap();
    assert_eq!(restored.clock.current_step, 4);
}

#[test]
fn corrupt_index_starts_empty_not_fatal() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("snapshots.json"), "{{{ not json").unwrap();
    let store = store_in(&dir, 10, false);
    assert!(store.list_snapshots().is_empty());
}

// ============================================================
// Deletion
// ============================================================

#[test]
fn delete_snapshot_removes_file_and_index_row() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir, 10, false);

    let info = store.save(artifact_at(6, 0), "doomed").unwrap();
    assert!(info.path.exists());

    store.delete_snapshot(&info.path).unwrap();
    assert!(!info.path.exists());
    assert!(store.list_snapshots().is_empty());

    assert!(matches!(
        store.delete_snapshot(&info.path),
        Err(Error::SnapshotNotFound(_))
    ));
}
