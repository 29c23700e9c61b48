//! Mutation intents.

use crate::item::Item;
use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::ItemId;

/// An immutable mutation intent
///
/// Serialized as `{"type": "add"|"move"|"remove", "id": .., ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Change {
    /// Place a new item
    Add {
        /// Item id
        id: ItemId,
        /// Left column
        x: u32,
        /// Top row
        y: u32,
        /// Width
        w: u32,
        /// Height
        h: u32,
    },
    /// Move an existing item, keeping its size
    Move {
        /// Item id
        id: ItemId,
        /// New left column
        x: u32,
        /// New top row
        y: u32,
    },
    /// Delete an item
    Remove {
        /// Item id
        id: ItemId,
    },
}

impl Change {
    /// Build an add change
    #[must_use]
    pub fn add(id: impl Into<ItemId>, x: u32, y: u32, w: u32, h: u32) -> Self {
        Self::Add {
            id: id.into(),
            x,
            y,
            w,
            h,
        }
    }

    /// Build a move change
    #[must_use]
    pub fn move_to(id: impl Into<ItemId>, x: u32, y: u32) -> Self {
        Self::Move { id: id.into(), x, y }
    }

    /// Build a remove change
    #[must_use]
    pub fn remove(id: impl Into<ItemId>) -> Self {
        Self::Remove { id: id.into() }
    }

    /// Id of the item this change targets
    #[must_use]
    pub fn id(&self) -> &ItemId {
        match self {
            Self::Add { id, .. } | Self::Move { id, .. } | Self::Remove { id } => id,
        }
    }

    /// Wire name of the change type
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Move { .. } => "move",
            Self::Remove { .. } => "remove",
        }
    }
}

impl From<&Item> for Change {
    fn from(item: &Item) -> Self {
        Self::add(item.id.clone(), item.x, item.y, item.w, item.h)
    }
}

/// Formats in the tooling command syntax (`add`, `mv`, `rm`)
impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add { id, x, y, w, h } => write!(f, "add {} {} {} {} {}", id, x, y, w, h),
            Self::Move { id, x, y } => write!(f, "mv {} {} {}", id, x, y),
            Self::Remove { id } => write!(f, "rm {}", id),
        }
    }
}
