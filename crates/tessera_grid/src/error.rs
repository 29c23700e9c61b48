//! Grid engine errors.
//!
//! `GridError` is local and recoverable: the grid is unchanged after any
//! rejected call, so callers may retry with different parameters.

use crate::geometry::Rect;
use tessera_core::{Fingerprint, ItemId};

/// Errors from a single engine mutation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    /// An item with this id is already on the grid
    #[error("Item already exists: {id}")]
    DuplicateId {
        /// The id already in use
        id: ItemId,
    },

    /// No item with this id is on the grid
    #[error("Item not found: {id}")]
    NotFound {
        /// The missing id
        id: ItemId,
    },

    /// The rectangle leaves the grid
    #[error("Item {id} at {rect} exceeds the {width}x{height} grid")]
    OutOfBounds {
        /// Item being placed
        id: ItemId,
        /// Requested placement
        rect: Rect,
        /// Grid columns
        width: u32,
        /// Grid rows
        height: u32,
    },

    /// The rectangle overlaps existing items
    #[error("Item {id} at {rect} collides with {}", join_ids(.with))]
    Collision {
        /// Item being placed
        id: ItemId,
        /// Requested placement
        rect: Rect,
        /// Items it would overlap, sorted
        with: Vec<ItemId>,
    },

    /// Width or height is zero
    #[error("Item {id} has empty size {w}x{h}")]
    InvalidSize {
        /// Item being placed
        id: ItemId,
        /// Requested width
        w: u32,
        /// Requested height
        h: u32,
    },
}

impl GridError {
    /// Short machine-readable name of the error kind
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateId { .. } => "duplicate_id",
            Self::NotFound { .. } => "not_found",
            Self::OutOfBounds { .. } => "out_of_bounds",
            Self::Collision { .. } => "collision",
            Self::InvalidSize { .. } => "invalid_size",
        }
    }
}

fn join_ids(ids: &[ItemId]) -> String {
    ids.iter()
        .map(ItemId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from applying a group of changes as one batch
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// Nothing was recorded
    #[error("Batch is empty")]
    Empty,

    /// A change failed; every earlier change was reverted
    #[error("Change {index} failed: {source}")]
    Step {
        /// Position of the failing change in the batch
        index: usize,
        /// Why the engine refused it
        #[source]
        source: GridError,
    },

    /// The batch was built against a different grid state
    #[error("Batch base {expected} does not match grid {actual}")]
    StaleBase {
        /// The batch's `hash_before`
        expected: Fingerprint,
        /// The grid's fingerprint
        actual: Fingerprint,
    },

    /// The changes applied but did not produce the declared fingerprint
    #[error("Batch declared result {declared} but produced {actual}")]
    HashMismatch {
        /// The batch's `hash_after`
        declared: Fingerprint,
        /// What the changes produced
        actual: Fingerprint,
    },
}

impl BatchError {
    /// The underlying grid error, if a change was rejected
    #[must_use]
    pub fn grid_error(&self) -> Option<&GridError> {
        match self {
            Self::Step { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Snapshot errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// Snapshot format version is not understood
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    /// An item violates the grid invariants
    #[error("Snapshot item rejected: {0}")]
    InvalidItem(#[from] GridError),

    /// The embedded fingerprint does not match the items
    #[error("Snapshot fingerprint mismatch: declared {declared}, computed {computed}")]
    FingerprintMismatch {
        /// Fingerprint carried by the snapshot
        declared: Fingerprint,
        /// Fingerprint of the decoded items
        computed: Fingerprint,
    },

    /// The bytes could not be encoded or decoded
    #[error("Snapshot encoding failed: {0}")]
    Encoding(String),
}
