//! Replication configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sync configuration shared by the room hub and replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Columns of lazily created room grids
    pub grid_width: u32,
    /// Rows of lazily created room grids
    pub grid_height: u32,
    /// Applied batches a room keeps for conflict replay
    pub history_depth: usize,
    /// How long a replica waits for its batch to be acknowledged, in milliseconds
    pub ack_timeout_ms: u64,
}

impl SyncConfig {
    /// Create a config with default values
    #[must_use]
    pub fn new() -> Self {
        Self {
            grid_width: 16,
            grid_height: 12,
            history_depth: 64,
            ack_timeout_ms: 5000,
        }
    }

    /// Set grid dimensions for new rooms
    #[must_use]
    pub fn with_grid_size(mut self, width: u32, height: u32) -> Self {
        self.grid_width = width;
        self.grid_height = height;
        self
    }

    /// Set history depth (at least one batch is always kept)
    #[must_use]
    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth.max(1);
        self
    }

    /// Set the acknowledgement timeout
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout_ms: u64) -> Self {
        self.ack_timeout_ms = timeout_ms;
        self
    }

    /// The acknowledgement timeout as a duration
    #[must_use]
    pub const fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!((config.grid_width, config.grid_height), (16, 12));
        assert_eq!(config.history_depth, 64);
        assert_eq!(config.ack_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_builders() {
        let config = SyncConfig::new()
            .with_grid_size(32, 8)
            .with_history_depth(0)
            .with_ack_timeout(250);
        assert_eq!(config.grid_width, 32);
        assert_eq!(config.history_depth, 1);
        assert_eq!(config.ack_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&SyncConfig::default()).unwrap();
        let back: SyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SyncConfig::default());
    }
}
