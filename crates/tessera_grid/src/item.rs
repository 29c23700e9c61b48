//! Items placed on the grid.

use crate::geometry::Rect;
use serde::{Deserialize, Serialize};
use tessera_core::ItemId;

/// A uniquely identified rectangle on the grid
///
/// Values handed out by the engine are snapshots; mutating one never
/// affects the grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    /// Caller-supplied id
    pub id: ItemId,
    /// Left column
    pub x: u32,
    /// Top row
    pub y: u32,
    /// Width in cells (fixed after creation)
    pub w: u32,
    /// Height in cells (fixed after creation)
    pub h: u32,
}

impl Item {
    /// Create an item
    #[must_use]
    pub fn new(id: impl Into<ItemId>, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            w,
            h,
        }
    }

    /// The rectangle this item covers
    #[must_use]
    pub const fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }
}
