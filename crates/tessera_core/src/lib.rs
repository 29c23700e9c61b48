//! Tessera Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Identifiers and fingerprints shared by the grid engine and the
//! replication protocol live here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hash;
pub mod id;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use hash::{Fingerprint, FingerprintBuilder, HashError};
pub use id::{ItemId, ReplicaId, RoomId};
