//! Bounded record of applied batches.
//!
//! The room consults it to decide whether a batch built on a stale
//! fingerprint can be replayed: replay is only safe when none of the
//! batch's items were altered after that fingerprint.

use std::collections::{BTreeSet, VecDeque};
use tessera_core::{Fingerprint, ItemId};
use tessera_grid::Batch;

#[derive(Debug, Clone)]
struct Entry {
    hash_before: Fingerprint,
    hash_after: Fingerprint,
    touched: BTreeSet<ItemId>,
}

/// Ring of the most recent applied batches
#[derive(Debug, Clone)]
pub struct BatchHistory {
    depth: usize,
    entries: VecDeque<Entry>,
}

impl BatchHistory {
    /// Keep at most `depth` batches (minimum one)
    #[must_use]
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            depth,
            entries: VecDeque::with_capacity(depth),
        }
    }

    /// Record an applied batch, evicting the oldest when full
    pub fn push(&mut self, batch: &Batch) {
        if self.entries.len() == self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back(Entry {
            hash_before: batch.hash_before,
            hash_after: batch.hash_after,
            touched: batch.touched_ids(),
        });
    }

    /// Ids altered since the grid last had fingerprint `hash`
    ///
    /// Returns `None` when `hash` is not within the retained window.
    #[must_use]
    pub fn touched_since(&self, hash: Fingerprint) -> Option<BTreeSet<ItemId>> {
        let mut touched = BTreeSet::new();
        for entry in self.entries.iter().rev() {
            if entry.hash_after == hash {
                return Some(touched);
            }
            touched.extend(entry.touched.iter().cloned());
            if entry.hash_before == hash {
                return Some(touched);
            }
        }
        None
    }

    /// Number of retained batches
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained batches
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }
}
