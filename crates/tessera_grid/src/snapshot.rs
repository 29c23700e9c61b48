//! Full-state grid snapshots.
//!
//! A snapshot carries the dimensions, every item and the fingerprint.
//! Loading one re-validates all grid invariants and recomputes the
//! fingerprint, so a corrupted or forged snapshot never becomes a grid.

use crate::engine::GridEngine;
use crate::error::SnapshotError;
use crate::item::Item;
use serde::{Deserialize, Serialize};
use tessera_core::Fingerprint;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable full state of a grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Format version
    pub version: u32,
    /// Number of columns
    pub width: u32,
    /// Number of rows
    pub height: u32,
    /// Items sorted by id
    pub items: Vec<Item>,
    /// Fingerprint of the grid the snapshot was taken from
    pub fingerprint: Fingerprint,
}

impl GridSnapshot {
    /// Encode as JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::Encoding(e.to_string()))
    }

    /// Decode from JSON without validating the contents
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(json).map_err(|e| SnapshotError::Encoding(e.to_string()))
    }

    /// Encode in the compact binary form
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        postcard::to_allocvec(self).map_err(|e| SnapshotError::Encoding(e.to_string()))
    }

    /// Decode from the compact binary form without validating the contents
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are malformed
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        postcard::from_bytes(bytes).map_err(|e| SnapshotError::Encoding(e.to_string()))
    }
}

impl GridEngine {
    /// Capture the full grid state
    #[must_use]
    pub fn serialize(&self) -> GridSnapshot {
        GridSnapshot {
            version: SNAPSHOT_VERSION,
            width: self.width(),
            height: self.height(),
            items: self.items().collect(),
            fingerprint: self.hash(),
        }
    }

    /// Rebuild a grid from a snapshot
    ///
    /// Observers are not part of a snapshot; the new grid has none.
    ///
    /// # Errors
    ///
    /// `UnsupportedVersion`, `InvalidItem` if any item breaks a grid
    /// invariant, or `FingerprintMismatch`
    pub fn deserialize(snapshot: &GridSnapshot) -> Result<Self, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }

        let mut engine = Self::new(snapshot.width, snapshot.height);
        for item in &snapshot.items {
            engine.add_item(item.id.clone(), item.x, item.y, item.w, item.h)?;
        }

        let computed = engine.hash();
        if computed != snapshot.fingerprint {
            return Err(SnapshotError::FingerprintMismatch {
                declared: snapshot.fingerprint,
                computed,
            });
        }
        Ok(engine)
    }

    /// Replace this grid's items with a snapshot's, keeping observers
    ///
    /// # Errors
    ///
    /// Same as [`GridEngine::deserialize`]; the grid is unchanged on error
    pub fn restore(&mut self, snapshot: &GridSnapshot) -> Result<(), SnapshotError> {
        let restored = Self::deserialize(snapshot)?;
        self.replace_state(restored);
        Ok(())
    }
}
