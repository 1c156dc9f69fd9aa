//! Echoloop state — durable snapshots of the cognitive scheduler
//!
//! - `codec`: the binary artifact format (ECHO magic, SHA-256 checksum,
//!   optional gzip outer stream)
//! - `store`: one-file-per-save snapshot store with an atomic JSON index,
//!   retention pruning, and checkpoint flagging
//! - `delta`: incremental field changes against a base artifact, compacted
//!   periodically into a new base

pub mod codec;
pub mod delta;
pub mod store;

pub use codec::{decode, encode, seal, FLAG_COMPRESSED, MAGIC};
pub use delta::{Delta, DeltaLog};
pub use store::{SnapshotConfig, SnapshotStore};
