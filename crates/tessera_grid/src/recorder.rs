//! Atomic multi-change recording.
//!
//! A recorder applies changes to the engine as they are recorded and
//! remembers each inverse. Committing turns the recorded changes into a
//! `Batch`; dropping the recorder without committing, or a failing
//! change, reverts everything in reverse order.

use crate::batch::Batch;
use crate::change::Change;
use crate::engine::GridEngine;
use crate::error::BatchError;
use tessera_core::{Fingerprint, ItemId};

/// Records changes against one engine until committed or dropped
///
/// # Examples
///
/// ```
/// use tessera_grid::{ChangeRecorder, GridEngine};
///
/// let mut engine = GridEngine::new(16, 12);
/// let batch = ChangeRecorder::begin(&mut engine)
///     .add("a", 0, 0, 2, 2)
///     .unwrap()
///     .move_item("a", 4, 4)
///     .unwrap()
///     .commit()
///     .unwrap();
/// assert_eq!(batch.len(), 2);
/// assert_eq!(engine.hash(), batch.hash_after);
/// ```
#[derive(Debug)]
pub struct ChangeRecorder<'a> {
    engine: &'a mut GridEngine,
    hash_before: Fingerprint,
    changes: Vec<Change>,
    inverses: Vec<Change>,
}

impl<'a> ChangeRecorder<'a> {
    /// Start recording on an engine
    #[must_use]
    pub fn begin(engine: &'a mut GridEngine) -> Self {
        let hash_before = engine.hash();
        Self {
            engine,
            hash_before,
            changes: Vec::new(),
            inverses: Vec::new(),
        }
    }

    /// Apply and record one change
    ///
    /// # Errors
    ///
    /// `BatchError::Step` if the engine rejects the change; everything
    /// recorded so far is reverted first
    pub fn apply(mut self, change: Change) -> Result<Self, BatchError> {
        match self.engine.apply(&change) {
            Ok(inverse) => {
                self.changes.push(change);
                self.inverses.push(inverse);
                Ok(self)
            }
            Err(source) => Err(BatchError::Step {
                index: self.changes.len(),
                source,
            }),
        }
    }

    /// Record an add
    ///
    /// # Errors
    ///
    /// See [`ChangeRecorder::apply`]
    pub fn add(
        self,
        id: impl Into<ItemId>,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<Self, BatchError> {
        self.apply(Change::add(id, x, y, w, h))
    }

    /// Record a move
    ///
    /// # Errors
    ///
    /// See [`ChangeRecorder::apply`]
    pub fn move_item(self, id: impl Into<ItemId>, x: u32, y: u32) -> Result<Self, BatchError> {
        self.apply(Change::move_to(id, x, y))
    }

    /// Record a remove
    ///
    /// # Errors
    ///
    /// See [`ChangeRecorder::apply`]
    pub fn remove(self, id: impl Into<ItemId>) -> Result<Self, BatchError> {
        self.apply(Change::remove(id))
    }

    /// Number of changes recorded so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True if nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Fingerprint the grid had when recording began
    #[must_use]
    pub const fn hash_before(&self) -> Fingerprint {
        self.hash_before
    }

    /// Fingerprint of the grid with every recorded change applied
    #[must_use]
    pub fn current_hash(&self) -> Fingerprint {
        self.engine.hash()
    }

    /// Revert everything recorded
    pub fn abort(self) {
        drop(self);
    }

    /// Keep the recorded changes and notify the engine's observers
    ///
    /// # Errors
    ///
    /// `BatchError::Empty` if nothing was recorded
    pub fn commit(mut self) -> Result<Batch, BatchError> {
        if self.changes.is_empty() {
            return Err(BatchError::Empty);
        }
        self.inverses.clear();
        let batch = Batch::new(
            std::mem::take(&mut self.changes),
            self.hash_before,
            self.engine.hash(),
        );
        tracing::debug!(
            changes = batch.len(),
            before = %batch.hash_before.short(),
            after = %batch.hash_after.short(),
            "batch committed"
        );
        self.engine.notify(&batch);
        Ok(batch)
    }

    fn rollback(&mut self) {
        while let Some(inverse) = self.inverses.pop() {
            if let Err(e) = self.engine.apply(&inverse) {
                // Inverses are applied in exact reverse order, so this
                // only happens if the engine was mutated behind our back.
                tracing::error!(change = %inverse, error = %e, "failed to revert change");
            }
        }
        self.changes.clear();
    }
}

impl Drop for ChangeRecorder<'_> {
    fn drop(&mut self) {
        if !self.inverses.is_empty() {
            tracing::debug!(changes = self.inverses.len(), "reverting uncommitted changes");
            self.rollback();
        }
    }
}

/// Apply `changes` to the engine as one atomic batch
///
/// # Errors
///
/// `Empty` for no changes, otherwise `Step` naming the first rejected
/// change; the grid is unchanged on error
pub fn record(
    engine: &mut GridEngine,
    changes: impl IntoIterator<Item = Change>,
) -> Result<Batch, BatchError> {
    let mut recorder = ChangeRecorder::begin(engine);
    for change in changes {
        recorder = recorder.apply(change)?;
    }
    recorder.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;
    use crate::observer::ObserverFn;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_commit_produces_batch() {
        let mut engine = GridEngine::new(16, 12);
        let before = engine.hash();
        let batch = record(
            &mut engine,
            vec![Change::add("a", 0, 0, 2, 2), Change::add("b", 2, 0, 2, 2)],
        )
        .unwrap();

        assert_eq!(batch.hash_before, before);
        assert_eq!(batch.hash_after, engine.hash());
        assert_eq!(batch.changes.len(), 2);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn test_failure_reverts_earlier_changes() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("wall", 8, 0, 1, 12).unwrap();
        let before = engine.hash();

        let err = record(
            &mut engine,
            vec![
                Change::add("a", 0, 0, 2, 2),
                Change::move_to("wall", 0, 0),
                Change::add("b", 7, 0, 2, 2),
            ],
        )
        .unwrap_err();

        match err {
            BatchError::Step { index, ref source } => {
                assert_eq!(index, 1);
                assert_eq!(source.kind(), "collision");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.hash(), before);
        assert_eq!(engine.items().collect::<Vec<_>>(), vec![Item::new("wall", 8, 0, 1, 12)]);
    }

    #[test]
    fn test_drop_without_commit_reverts() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("a", 0, 0, 1, 1).unwrap();
        let before = engine.hash();

        {
            let recorder = ChangeRecorder::begin(&mut engine)
                .move_item("a", 5, 5)
                .unwrap()
                .remove("a")
                .unwrap()
                .add("a", 9, 9, 3, 3)
                .unwrap();
            assert_eq!(recorder.len(), 3);
            assert_ne!(recorder.current_hash(), recorder.hash_before());
        }

        assert_eq!(engine.hash(), before);
        assert_eq!(engine.get_item("a"), Some(Item::new("a", 0, 0, 1, 1)));
    }

    #[test]
    fn test_abort_reverts() {
        let mut engine = GridEngine::new(16, 12);
        let before = engine.hash();
        ChangeRecorder::begin(&mut engine)
            .add("a", 0, 0, 1, 1)
            .unwrap()
            .abort();
        assert_eq!(engine.hash(), before);
    }

    #[test]
    fn test_empty_commit_rejected() {
        let mut engine = GridEngine::new(16, 12);
        let recorder = ChangeRecorder::begin(&mut engine);
        assert!(recorder.is_empty());
        assert_eq!(recorder.commit().unwrap_err(), BatchError::Empty);
        assert_eq!(record(&mut engine, Vec::new()).unwrap_err(), BatchError::Empty);
    }

    #[test]
    fn test_observers_see_committed_batches_only() {
        let mut engine = GridEngine::new(16, 12);
        let (tx, rx) = mpsc::channel();
        engine.subscribe(Box::new(tx));

        let _ = record(&mut engine, vec![Change::remove("missing")]);
        assert!(rx.try_recv().is_err());

        let batch = record(&mut engine, vec![Change::add("a", 0, 0, 1, 1)]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), batch);
    }

    #[test]
    fn test_unsubscribed_observer_not_notified() {
        let mut engine = GridEngine::new(16, 12);
        let count = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&count);
        let id = engine.subscribe(Box::new(ObserverFn(move |_: &Batch| {
            *seen.lock().unwrap() += 1;
        })));

        record(&mut engine, vec![Change::add("a", 0, 0, 1, 1)]).unwrap();
        assert!(engine.unsubscribe(id));
        record(&mut engine, vec![Change::remove("a")]).unwrap();

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(engine.observer_count(), 0);
    }

    #[test]
    fn test_batch_replays_on_fresh_engine() {
        let mut a = GridEngine::new(16, 12);
        let mut b = GridEngine::new(16, 12);
        let batch = ChangeRecorder::begin(&mut a)
            .add("x", 1, 1, 2, 2)
            .unwrap()
            .move_item("x", 3, 3)
            .unwrap()
            .commit()
            .unwrap();
        b.apply_batch(&batch).unwrap();
        assert_eq!(a.hash(), b.hash());
    }
}
