//! The grid engine.
//!
//! Owns one grid's items. Every mutating call either applies fully or
//! leaves the grid byte-for-byte unchanged, which lets the replication
//! layer treat a rejection as safe to retry or discard.

use crate::batch::Batch;
use crate::change::Change;
use crate::error::{BatchError, GridError};
use crate::geometry::Rect;
use crate::item::Item;
use crate::observer::{BatchObserver, ObserverId, ObserverList};
use crate::recorder::ChangeRecorder;
use std::collections::BTreeMap;
use tessera_core::{Fingerprint, FingerprintBuilder, ItemId};

/// Domain tag folded into every grid fingerprint
pub const FINGERPRINT_DOMAIN: &str = "tessera.grid.v1";

/// A fixed-size grid of non-overlapping rectangular items
///
/// # Examples
///
/// ```
/// use tessera_grid::GridEngine;
///
/// let mut engine = GridEngine::new(16, 12);
/// engine.add_item("a", 2, 2, 2, 4).unwrap();
/// assert!(engine.add_item("b", 2, 2, 2, 4).is_err());
/// engine.move_item("a", 0, 0).unwrap();
/// engine.remove_item("a").unwrap();
/// assert!(engine.is_empty());
/// ```
#[derive(Debug)]
pub struct GridEngine {
    width: u32,
    height: u32,
    items: BTreeMap<ItemId, Item>,
    fingerprint: Fingerprint,
    observers: ObserverList,
}

impl GridEngine {
    /// Create an empty grid of `width` columns and `height` rows
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let items = BTreeMap::new();
        let fingerprint = fingerprint_of(width, height, items.values());
        Self {
            width,
            height,
            items,
            fingerprint,
            observers: ObserverList::new(),
        }
    }

    /// Number of columns
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the grid holds no items
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True if an item with this id is on the grid
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// Place a new item
    ///
    /// # Errors
    ///
    /// `DuplicateId`, `InvalidSize`, `OutOfBounds` or `Collision`; the grid
    /// is unchanged on error
    pub fn add_item(
        &mut self,
        id: impl Into<ItemId>,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<Change, GridError> {
        let item = Item::new(id, x, y, w, h);
        if self.items.contains_key(&item.id) {
            return Err(GridError::DuplicateId { id: item.id });
        }
        if item.rect().is_empty() {
            return Err(GridError::InvalidSize { id: item.id, w, h });
        }
        self.check_placement(&item.id, item.rect())?;

        let change = Change::from(&item);
        self.items.insert(item.id.clone(), item);
        self.refresh_fingerprint();
        Ok(change)
    }

    /// Move an item, keeping its size
    ///
    /// The item itself is ignored by the collision check, so moving onto
    /// a position that overlaps only its old footprint is allowed.
    ///
    /// # Errors
    ///
    /// `NotFound`, `OutOfBounds` or `Collision`; the grid is unchanged on
    /// error
    pub fn move_item(&mut self, id: &str, x: u32, y: u32) -> Result<Change, GridError> {
        let current = self.item_ref(id)?;
        let target = current.rect().at(x, y);
        let id = current.id.clone();
        self.check_placement(&id, target)?;

        if let Some(item) = self.items.get_mut(&id) {
            item.x = x;
            item.y = y;
        }
        self.refresh_fingerprint();
        Ok(Change::Move { id, x, y })
    }

    /// Delete an item and free its id
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is not on the grid
    pub fn remove_item(&mut self, id: &str) -> Result<Change, GridError> {
        let removed = self.take_item(id)?;
        Ok(Change::Remove { id: removed.id })
    }

    /// Apply one change and return its exact inverse
    ///
    /// # Errors
    ///
    /// Same as the matching `add_item`/`move_item`/`remove_item` call
    pub fn apply(&mut self, change: &Change) -> Result<Change, GridError> {
        match change {
            Change::Add { id, x, y, w, h } => {
                self.add_item(id.clone(), *x, *y, *w, *h)?;
                Ok(Change::Remove { id: id.clone() })
            }
            Change::Move { id, x, y } => {
                let previous = self.item_ref(id.as_str())?;
                let (px, py) = (previous.x, previous.y);
                self.move_item(id.as_str(), *x, *y)?;
                Ok(Change::Move {
                    id: id.clone(),
                    x: px,
                    y: py,
                })
            }
            Change::Remove { id } => {
                let removed = self.take_item(id.as_str())?;
                Ok(Change::from(&removed))
            }
        }
    }

    /// Apply a batch built against this grid
    ///
    /// The batch must start from the current fingerprint and must end on
    /// its declared `hash_after`; otherwise nothing changes.
    ///
    /// # Errors
    ///
    /// `StaleBase`, `Step` or `HashMismatch`
    pub fn apply_batch(&mut self, batch: &Batch) -> Result<(), BatchError> {
        let actual = self.fingerprint;
        if batch.hash_before != actual {
            return Err(BatchError::StaleBase {
                expected: batch.hash_before,
                actual,
            });
        }

        let mut recorder = ChangeRecorder::begin(self);
        for change in &batch.changes {
            recorder = recorder.apply(change.clone())?;
        }

        let produced = recorder.current_hash();
        if produced != batch.hash_after {
            recorder.abort();
            return Err(BatchError::HashMismatch {
                declared: batch.hash_after,
                actual: produced,
            });
        }

        recorder.commit()?;
        Ok(())
    }

    /// Value snapshot of one item
    #[must_use]
    pub fn get_item(&self, id: &str) -> Option<Item> {
        self.items.get(id).cloned()
    }

    /// Value snapshots of every item, sorted by id
    pub fn items(&self) -> impl Iterator<Item = Item> + '_ {
        self.items.values().cloned()
    }

    /// Ids of items a rectangle would overlap, sorted, skipping `except`
    #[must_use]
    pub fn collisions(&self, rect: Rect, except: Option<&ItemId>) -> Vec<ItemId> {
        self.items
            .values()
            .filter(|item| Some(&item.id) != except)
            .filter(|item| item.rect().intersects(&rect))
            .map(|item| item.id.clone())
            .collect()
    }

    /// Deterministic fingerprint of the full item set
    ///
    /// Items are folded in id order, so two grids holding the same items
    /// hash identically whatever their history.
    #[must_use]
    pub const fn hash(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Register an observer of committed batches
    pub fn subscribe(&mut self, observer: Box<dyn BatchObserver>) -> ObserverId {
        self.observers.subscribe(observer)
    }

    /// Remove an observer
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Number of registered observers
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn notify(&mut self, batch: &Batch) {
        self.observers.notify(batch);
    }

    /// Take over another grid's dimensions and items; observers stay
    pub(crate) fn replace_state(&mut self, other: Self) {
        self.width = other.width;
        self.height = other.height;
        self.items = other.items;
        self.fingerprint = other.fingerprint;
    }

    fn item_ref(&self, id: &str) -> Result<&Item, GridError> {
        self.items.get(id).ok_or_else(|| GridError::NotFound {
            id: ItemId::new(id),
        })
    }

    fn take_item(&mut self, id: &str) -> Result<Item, GridError> {
        let removed = self.items.remove(id).ok_or_else(|| GridError::NotFound {
            id: ItemId::new(id),
        })?;
        self.refresh_fingerprint();
        Ok(removed)
    }

    fn check_placement(&self, id: &ItemId, rect: Rect) -> Result<(), GridError> {
        if !rect.fits_within(self.width, self.height) {
            return Err(GridError::OutOfBounds {
                id: id.clone(),
                rect,
                width: self.width,
                height: self.height,
            });
        }
        let with = self.collisions(rect, Some(id));
        if !with.is_empty() {
            return Err(GridError::Collision {
                id: id.clone(),
                rect,
                with,
            });
        }
        Ok(())
    }

    fn refresh_fingerprint(&mut self) {
        self.fingerprint = fingerprint_of(self.width, self.height, self.items.values());
    }
}

/// Fold dimensions and items (already in id order) into a fingerprint
pub(crate) fn fingerprint_of<'a>(
    width: u32,
    height: u32,
    items: impl ExactSizeIterator<Item = &'a Item>,
) -> Fingerprint {
    let mut builder = FingerprintBuilder::new(FINGERPRINT_DOMAIN);
    builder.write_u32(width).write_u32(height);
    builder.write_u64(items.len() as u64);
    for item in items {
        builder
            .write_str(item.id.as_str())
            .write_u32(item.x)
            .write_u32(item.y)
            .write_u32(item.w)
            .write_u32(item.h);
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_unchanged(engine: &GridEngine, hash: Fingerprint, items: &[Item]) {
        assert_eq!(engine.hash(), hash);
        assert_eq!(engine.items().collect::<Vec<_>>(), items);
    }

    #[test]
    fn test_new_grid_is_empty() {
        let engine = GridEngine::new(16, 12);
        assert!(engine.is_empty());
        assert_eq!(engine.width(), 16);
        assert_eq!(engine.height(), 12);
        assert_eq!(engine.hash(), GridEngine::new(16, 12).hash());
        assert_ne!(engine.hash(), GridEngine::new(12, 16).hash());
    }

    #[test]
    fn test_collision_scenario() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("a", 2, 2, 2, 4).unwrap();

        let err = engine.add_item("b", 2, 2, 2, 4).unwrap_err();
        assert!(matches!(
            err,
            GridError::Collision { ref with, .. } if with == &[ItemId::from("a")]
        ));

        engine.add_item("b", 4, 2, 2, 4).unwrap();

        let err = engine.move_item("a", 4, 2).unwrap_err();
        assert_eq!(err.kind(), "collision");

        engine.remove_item("b").unwrap();
        engine.move_item("a", 4, 2).unwrap();
        assert_eq!(engine.get_item("a"), Some(Item::new("a", 4, 2, 2, 4)));
    }

    #[test]
    fn test_add_duplicate_id() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("a", 0, 0, 1, 1).unwrap();
        let err = engine.add_item("a", 5, 5, 1, 1).unwrap_err();
        assert_eq!(err, GridError::DuplicateId { id: ItemId::from("a") });
    }

    #[test]
    fn test_add_out_of_bounds() {
        let mut engine = GridEngine::new(16, 12);
        assert_eq!(engine.add_item("a", 15, 0, 2, 1).unwrap_err().kind(), "out_of_bounds");
        assert_eq!(engine.add_item("a", 0, 11, 1, 2).unwrap_err().kind(), "out_of_bounds");
        assert_eq!(engine.add_item("a", 16, 0, 1, 1).unwrap_err().kind(), "out_of_bounds");
        engine.add_item("a", 15, 11, 1, 1).unwrap();
    }

    #[test]
    fn test_add_zero_size() {
        let mut engine = GridEngine::new(16, 12);
        let err = engine.add_item("a", 1, 1, 0, 3).unwrap_err();
        assert_eq!(err.kind(), "invalid_size");
        assert!(engine.is_empty());
    }

    #[test]
    fn test_move_excludes_self() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("a", 0, 0, 3, 3).unwrap();
        engine.move_item("a", 1, 1).unwrap();
        assert_eq!(engine.get_item("a").unwrap().rect(), Rect::new(1, 1, 3, 3));
    }

    #[test]
    fn test_move_and_remove_missing() {
        let mut engine = GridEngine::new(16, 12);
        assert_eq!(engine.move_item("ghost", 0, 0).unwrap_err().kind(), "not_found");
        assert_eq!(engine.remove_item("ghost").unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_move_out_of_bounds_keeps_position() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("a", 0, 0, 4, 4).unwrap();
        let hash = engine.hash();
        let items: Vec<_> = engine.items().collect();

        assert_eq!(engine.move_item("a", 13, 0).unwrap_err().kind(), "out_of_bounds");
        assert_unchanged(&engine, hash, &items);
    }

    #[test]
    fn test_rejected_calls_leave_grid_unchanged() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("a", 2, 2, 2, 4).unwrap();
        engine.add_item("b", 4, 2, 2, 4).unwrap();
        let hash = engine.hash();
        let items: Vec<_> = engine.items().collect();

        assert!(engine.add_item("c", 3, 3, 2, 2).is_err());
        assert_unchanged(&engine, hash, &items);
        assert!(engine.move_item("a", 3, 2).is_err());
        assert_unchanged(&engine, hash, &items);
        assert!(engine.add_item("a", 10, 10, 1, 1).is_err());
        assert_unchanged(&engine, hash, &items);
    }

    #[test]
    fn test_removed_id_can_be_reused() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("a", 0, 0, 1, 1).unwrap();
        engine.remove_item("a").unwrap();
        engine.add_item("a", 3, 3, 1, 1).unwrap();
        assert!(engine.contains("a"));
    }

    #[test]
    fn test_apply_returns_inverse() {
        let mut engine = GridEngine::new(16, 12);
        let empty = engine.hash();

        let inverse = engine.apply(&Change::add("a", 1, 1, 2, 2)).unwrap();
        assert_eq!(inverse, Change::remove("a"));
        let after_add = engine.hash();

        let inverse_move = engine.apply(&Change::move_to("a", 5, 5)).unwrap();
        assert_eq!(inverse_move, Change::move_to("a", 1, 1));
        engine.apply(&inverse_move).unwrap();
        assert_eq!(engine.hash(), after_add);

        let inverse_remove = engine.apply(&Change::remove("a")).unwrap();
        assert_eq!(inverse_remove, Change::add("a", 1, 1, 2, 2));
        assert_eq!(engine.hash(), empty);
    }

    #[test]
    fn test_items_are_value_snapshots() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("a", 0, 0, 1, 1).unwrap();
        let mut snapshot = engine.get_item("a").unwrap();
        snapshot.x = 9;
        assert_eq!(engine.get_item("a").unwrap().x, 0);
    }

    #[test]
    fn test_items_sorted_by_id() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("c", 0, 0, 1, 1).unwrap();
        engine.add_item("a", 2, 0, 1, 1).unwrap();
        engine.add_item("b", 4, 0, 1, 1).unwrap();
        let ids: Vec<String> = engine.items().map(|i| i.id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_collisions_query() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("a", 0, 0, 2, 2).unwrap();
        engine.add_item("b", 2, 0, 2, 2).unwrap();
        let hits = engine.collisions(Rect::new(1, 1, 2, 2), None);
        assert_eq!(hits, vec![ItemId::from("a"), ItemId::from("b")]);
        let a = ItemId::from("a");
        assert_eq!(engine.collisions(Rect::new(1, 1, 2, 2), Some(&a)), vec![ItemId::from("b")]);
    }

    #[test]
    fn test_apply_batch_reaches_declared_hash() {
        let mut source = GridEngine::new(16, 12);
        let batch = ChangeRecorder::begin(&mut source)
            .add("a", 0, 0, 2, 2)
            .unwrap()
            .add("b", 4, 0, 2, 2)
            .unwrap()
            .commit()
            .unwrap();

        let mut target = GridEngine::new(16, 12);
        assert_eq!(target.hash(), batch.hash_before);
        target.apply_batch(&batch).unwrap();
        assert_eq!(target.hash(), batch.hash_after);
    }

    #[test]
    fn test_apply_batch_stale_base() {
        let mut engine = GridEngine::new(16, 12);
        engine.add_item("z", 10, 10, 1, 1).unwrap();
        let batch = Batch::new(
            vec![Change::add("a", 0, 0, 1, 1)],
            GridEngine::new(16, 12).hash(),
            Fingerprint::compute(b"whatever"),
        );
        assert!(matches!(engine.apply_batch(&batch), Err(BatchError::StaleBase { .. })));
    }

    #[test]
    fn test_apply_batch_hash_mismatch_reverts() {
        let mut engine = GridEngine::new(16, 12);
        let before = engine.hash();
        let batch = Batch::new(
            vec![Change::add("a", 0, 0, 1, 1)],
            before,
            Fingerprint::compute(b"lie"),
        );
        assert!(matches!(engine.apply_batch(&batch), Err(BatchError::HashMismatch { .. })));
        assert_eq!(engine.hash(), before);
        assert!(engine.is_empty());
    }

    /// Non-overlapping items on a 2x2 lattice of a 16x12 grid
    fn lattice_items() -> impl Strategy<Value = Vec<Item>> {
        prop::collection::btree_set(0u32..48, 1..20).prop_flat_map(|cells| {
            let cells: Vec<u32> = cells.into_iter().collect();
            let n = cells.len();
            prop::collection::vec((1u32..=2, 1u32..=2), n).prop_map(move |sizes| {
                cells
                    .iter()
                    .zip(sizes)
                    .map(|(cell, (w, h))| {
                        Item::new(format!("item-{cell}"), (cell % 8) * 2, (cell / 8) * 2, w, h)
                    })
                    .collect::<Vec<_>>()
            })
        })
    }

    fn build(items: &[Item]) -> GridEngine {
        let mut engine = GridEngine::new(16, 12);
        for item in items {
            engine
                .add_item(item.id.clone(), item.x, item.y, item.w, item.h)
                .unwrap();
        }
        engine
    }

    proptest! {
        #[test]
        fn prop_non_overlapping_items_coexist(items in lattice_items()) {
            let engine = build(&items);
            prop_assert_eq!(engine.len(), items.len());
            prop_assert_ne!(engine.hash(), GridEngine::new(16, 12).hash());
        }

        #[test]
        fn prop_hash_invariant_under_insertion_order(
            (items, shuffled) in lattice_items().prop_flat_map(|items| {
                let shuffled = Just(items.clone()).prop_shuffle();
                (Just(items), shuffled)
            })
        ) {
            prop_assert_eq!(build(&items).hash(), build(&shuffled).hash());
        }

        #[test]
        fn prop_overlapping_add_rejected(items in lattice_items(), dx in 0u32..2, dy in 0u32..2) {
            let mut engine = build(&items);
            let hash = engine.hash();
            let target = &items[0];
            let x = target.x + dx.min(target.w - 1);
            let y = target.y + dy.min(target.h - 1);
            let result = engine.add_item("intruder", x, y, 1, 1);
            prop_assert_eq!(result.unwrap_err().kind(), "collision");
            prop_assert_eq!(engine.hash(), hash);
        }
    }
}
