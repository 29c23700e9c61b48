//! Identifiers for tessera entities.
//!
//! Item and room ids are supplied by callers and treated as opaque
//! strings. Replica ids are random UUIDs minted per connection.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Item identifier - caller-supplied, unique among live items of a grid
///
/// Ordering is by UTF-8 bytes, which is the order fingerprints fold
/// items in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create an item id without validation
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse an item id, rejecting empty ids and ids with whitespace
    ///
    /// # Errors
    ///
    /// Returns error if the id cannot round-trip through the command surface
    pub fn parse(id: &str) -> CoreResult<Self> {
        let item = Self::new(id);
        item.validate()?;
        Ok(item)
    }

    /// Check that the id is non-empty and whitespace-free
    ///
    /// # Errors
    ///
    /// Returns error describing the first problem found
    pub fn validate(&self) -> CoreResult<()> {
        if self.0.is_empty() {
            return Err(CoreError::InvalidId {
                reason: "item id is empty".to_string(),
            });
        }
        if self.0.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidId {
                reason: format!("item id {:?} contains whitespace", self.0),
            });
        }
        Ok(())
    }

    /// Get as str
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::borrow::Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Room identifier - opaque string handed over by the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Create a room id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as str
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "room_{}", self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Replica identifier - identifies one connected replica of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    /// Create a new random ReplicaId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "replica_{}", self.0)
    }
}
