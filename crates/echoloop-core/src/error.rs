//! Error types for Echoloop

use crate::types::EngineId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("scheduler already running")]
    AlreadyRunning,

    #[error("scheduler not running")]
    NotRunning,

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("unknown engine: {0}")]
    UnknownEngine(EngineId),

    #[error("no link between {a} and {b}")]
    UnknownLink { a: EngineId, b: EngineId },

    #[error("message queue full: {from} -> {to}")]
    QueueFull { from: EngineId, to: EngineId },

    #[error("step handler failed: {0}")]
    Handler(String),

    #[error("handler timed out after {0}ms")]
    HandlerTimeout(u64),

    #[error("artifact checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn invalid_topology(message: impl Into<String>) -> Self {
        Self::InvalidTopology(message.into())
    }
}
