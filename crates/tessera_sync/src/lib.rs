//! Tessera Replication
//!
//! Keeps one authoritative grid per room and any number of replicas
//! converged by comparing fingerprints instead of merging operations.
//! `RoomCoordinator` and `ReplicaSynchronizer` are synchronous state
//! machines; `RoomHub` runs rooms as tokio tasks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod history;
pub mod hub;
pub mod message;
pub mod replica;
pub mod room;

pub use config::SyncConfig;
pub use error::{ProtocolError, SyncError};
pub use history::BatchHistory;
pub use hub::{ReplicaConnection, RoomCommand, RoomHub};
pub use message::{ClientMessage, ServerMessage};
pub use replica::{Reaction, ReplicaSynchronizer, SyncState};
pub use room::{Dispatch, Resolution, RoomCoordinator, Target, Verdict};
