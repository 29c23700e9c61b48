//! Tessera Grid Engine
//!
//! A fixed-size 2-D grid of non-overlapping rectangular items.
//! Every mutation is all-or-nothing, fingerprints are independent of
//! insertion history, and sequences of mutations can be grouped into
//! atomic batches that carry before/after fingerprints.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod change;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod item;
pub mod observer;
pub mod recorder;
pub mod snapshot;
pub mod view;

pub use batch::Batch;
pub use change::Change;
pub use engine::GridEngine;
pub use error::{BatchError, GridError, SnapshotError};
pub use geometry::Rect;
pub use item::Item;
pub use observer::{BatchObserver, ObserverFn, ObserverId};
pub use recorder::ChangeRecorder;
pub use snapshot::{GridSnapshot, SNAPSHOT_VERSION};
pub use view::{MAX_RENDER_CELLS, render_text};
