//! Observers of committed batches.
//!
//! The engine keeps an explicit observer list and writes each committed
//! batch to it; how a batch travels further is up to the observer.

use crate::batch::Batch;
use std::fmt;
use std::sync::mpsc;

/// Receives every batch committed on a grid
pub trait BatchObserver: Send {
    /// Called once per committed batch, after the grid changed
    fn on_batch(&mut self, batch: &Batch);
}

/// Output-channel observer; a disconnected receiver is ignored
impl BatchObserver for mpsc::Sender<Batch> {
    fn on_batch(&mut self, batch: &Batch) {
        let _ = self.send(batch.clone());
    }
}

/// Adapts a closure into an observer
pub struct ObserverFn<F>(pub F);

impl<F: FnMut(&Batch) + Send> BatchObserver for ObserverFn<F> {
    fn on_batch(&mut self, batch: &Batch) {
        (self.0)(batch);
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Ordered observer registry
#[derive(Default)]
pub struct ObserverList {
    next_id: u64,
    observers: Vec<(ObserverId, Box<dyn BatchObserver>)>,
}

impl ObserverList {
    /// Create an empty list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; observers are notified in subscription order
    pub fn subscribe(&mut self, observer: Box<dyn BatchObserver>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    /// Remove an observer; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Notify every observer
    pub fn notify(&mut self, batch: &Batch) {
        for (_, observer) in &mut self.observers {
            observer.on_batch(batch);
        }
    }

    /// Number of registered observers
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// True if nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.observers.len())
            .finish()
    }
}
