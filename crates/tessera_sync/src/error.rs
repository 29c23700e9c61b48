//! Replication errors.
//!
//! Nothing here is fatal: protocol errors are recovered by serving or
//! requesting a fresh snapshot, and sync errors surface to the local
//! caller that initiated the action.

use tessera_grid::{BatchError, SnapshotError};

/// Protocol-level failures between a room and its replicas
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A message that does not parse or is structurally invalid
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// A batch conflicts with concurrent changes and cannot be replayed
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The sender's baseline is too old to reason about; it must resync
    #[error("Resync required: {0}")]
    ResyncRequired(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors surfaced to the local caller of a replica or hub
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// A local batch is still waiting for the room to acknowledge it
    #[error("A batch is already awaiting acknowledgement")]
    Busy,

    /// The replica holds no usable grid (not loaded yet, or resyncing)
    #[error("Replica is not synced (state: {0})")]
    NotSynced(&'static str),

    /// The local grid rejected the batch; nothing was applied
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// A snapshot could not be loaded
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// A protocol violation
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The room task is gone
    #[error("Room {0} is no longer running")]
    Disconnected(String),
}
