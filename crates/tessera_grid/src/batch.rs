//! Atomic groups of changes.

use crate::change::Change;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tessera_core::{Fingerprint, ItemId};

/// Ordered changes plus the fingerprints around them
///
/// `hash_before` is the grid fingerprint prior to the first change and
/// `hash_after` the fingerprint after the last one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Changes in application order
    pub changes: Vec<Change>,
    /// Fingerprint before the first change
    pub hash_before: Fingerprint,
    /// Fingerprint after the last change
    pub hash_after: Fingerprint,
}

impl Batch {
    /// Create a batch
    #[must_use]
    pub fn new(changes: Vec<Change>, hash_before: Fingerprint, hash_after: Fingerprint) -> Self {
        Self {
            changes,
            hash_before,
            hash_after,
        }
    }

    /// Number of changes
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True if the batch has no changes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Ids of every item the batch adds, moves or removes
    #[must_use]
    pub fn touched_ids(&self) -> BTreeSet<ItemId> {
        self.changes.iter().map(|c| c.id().clone()).collect()
    }
}
