//! Authoritative room state and batch resolution.
//!
//! `RoomCoordinator` is synchronous and owns no channels: it decides what
//! happens to each inbound message and returns the messages to deliver.
//! The hub runs one coordinator per room inside a single task, which is
//! what serializes batches for a room.

use crate::config::SyncConfig;
use crate::error::ProtocolError;
use crate::history::BatchHistory;
use crate::message::{ClientMessage, ServerMessage};
use std::collections::BTreeSet;
use tessera_core::{Fingerprint, ReplicaId, RoomId};
use tessera_grid::{Batch, GridEngine, GridSnapshot, recorder};
use tracing::{debug, info, warn};

/// Who a message goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every replica in the room, sender included
    Everyone,
    /// One replica
    Replica(ReplicaId),
}

/// A message addressed to one or all replicas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Recipient(s)
    pub target: Target,
    /// Message to deliver
    pub message: ServerMessage,
}

impl Dispatch {
    /// Address a message to every replica
    #[must_use]
    pub fn everyone(message: ServerMessage) -> Self {
        Self {
            target: Target::Everyone,
            message,
        }
    }

    /// Address a message to one replica
    #[must_use]
    pub fn to(replica: ReplicaId, message: ServerMessage) -> Self {
        Self {
            target: Target::Replica(replica),
            message,
        }
    }
}

/// What the room did with an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Built on the current fingerprint and applied as sent
    Accepted,
    /// Already reflected in the grid; acknowledged without reapplying
    Duplicate,
    /// Built on a stale fingerprint but replayed cleanly; the sender resyncs
    Rebased,
    /// Not applied; the sender resyncs, except for malformed messages,
    /// which are dropped without a reply
    Rejected(ProtocolError),
    /// An explicit resync request was served
    Resynced,
}

impl Verdict {
    /// Short name for log lines
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Duplicate => "duplicate",
            Self::Rebased => "rebased",
            Self::Rejected(_) => "rejected",
            Self::Resynced => "resynced",
        }
    }
}

/// Outcome of handling one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Decision
    pub verdict: Verdict,
    /// Messages to deliver, in order
    pub dispatches: Vec<Dispatch>,
}

/// Owns a room's authoritative grid
#[derive(Debug)]
pub struct RoomCoordinator {
    room: RoomId,
    engine: GridEngine,
    history: BatchHistory,
    replicas: BTreeSet<ReplicaId>,
}

impl RoomCoordinator {
    /// Create a room with an empty grid sized by the config
    #[must_use]
    pub fn new(room: RoomId, config: &SyncConfig) -> Self {
        Self::with_engine(
            room,
            GridEngine::new(config.grid_width, config.grid_height),
            config.history_depth,
        )
    }

    /// Create a room around an existing grid
    #[must_use]
    pub fn with_engine(room: RoomId, engine: GridEngine, history_depth: usize) -> Self {
        Self {
            room,
            engine,
            history: BatchHistory::new(history_depth),
            replicas: BTreeSet::new(),
        }
    }

    /// Room id
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// The authoritative grid
    #[must_use]
    pub fn engine(&self) -> &GridEngine {
        &self.engine
    }

    /// Authoritative fingerprint
    #[must_use]
    pub fn hash(&self) -> Fingerprint {
        self.engine.hash()
    }

    /// Full authoritative state
    #[must_use]
    pub fn snapshot(&self) -> GridSnapshot {
        self.engine.serialize()
    }

    /// Connected replicas
    pub fn replicas(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.replicas.iter().copied()
    }

    /// Register a replica and return the snapshot it starts from
    pub fn join(&mut self, replica: ReplicaId) -> ServerMessage {
        self.replicas.insert(replica);
        info!(room = %self.room, %replica, replicas = self.replicas.len(), "replica joined");
        ServerMessage::snapshot(self.snapshot())
    }

    /// Forget a replica; the grid is never touched
    pub fn leave(&mut self, replica: ReplicaId) -> bool {
        let removed = self.replicas.remove(&replica);
        if removed {
            info!(room = %self.room, %replica, replicas = self.replicas.len(), "replica left");
        }
        removed
    }

    /// Resolve one inbound message from `replica`
    pub fn handle(&mut self, replica: ReplicaId, message: ClientMessage) -> Resolution {
        if let Err(e) = message.validate() {
            warn!(room = %self.room, %replica, error = %e, "discarding malformed message");
            return Resolution {
                verdict: Verdict::Rejected(e),
                dispatches: Vec::new(),
            };
        }
        let resolution = match message {
            ClientMessage::Batch(batch) => self.handle_batch(replica, batch),
            ClientMessage::ResyncRequest { .. } => Resolution {
                verdict: Verdict::Resynced,
                dispatches: vec![self.resync(replica)],
            },
        };
        debug!(
            room = %self.room,
            %replica,
            verdict = resolution.verdict.kind(),
            hash = %self.hash().short(),
            "message resolved"
        );
        resolution
    }

    fn handle_batch(&mut self, replica: ReplicaId, batch: Batch) -> Resolution {
        let current = self.hash();

        if batch.hash_before == current {
            match self.engine.apply_batch(&batch) {
                Ok(()) => {
                    self.history.push(&batch);
                    return Resolution {
                        verdict: Verdict::Accepted,
                        dispatches: vec![Dispatch::everyone(ServerMessage::Batch(batch))],
                    };
                }
                Err(e) => {
                    debug!(
                        room = %self.room,
                        %replica,
                        error = %e,
                        "direct apply failed, replaying"
                    );
                }
            }
        } else if batch.hash_after == current {
            return Resolution {
                verdict: Verdict::Duplicate,
                dispatches: vec![Dispatch::to(replica, ServerMessage::Ack { ack: current })],
            };
        }

        self.replay(replica, batch)
    }

    /// Conflict path: replay the changes on top of the current grid
    fn replay(&mut self, replica: ReplicaId, batch: Batch) -> Resolution {
        let touched = if batch.hash_before == self.hash() {
            Some(BTreeSet::new())
        } else {
            self.history.touched_since(batch.hash_before)
        };
        let Some(touched) = touched else {
            warn!(
                room = %self.room,
                %replica,
                base = %batch.hash_before.short(),
                "batch base outside history"
            );
            return self.reject(
                replica,
                ProtocolError::ResyncRequired(format!(
                    "base {} is not in the last {} batches",
                    batch.hash_before.short(),
                    self.history.depth()
                )),
            );
        };

        if let Some(change) = batch.changes.iter().find(|c| touched.contains(c.id())) {
            warn!(
                room = %self.room,
                %replica,
                item = %change.id(),
                "batch touches concurrently altered item"
            );
            return self.reject(
                replica,
                ProtocolError::Conflict(format!("item {} was altered concurrently", change.id())),
            );
        }

        match recorder::record(&mut self.engine, batch.changes) {
            Ok(rebased) => {
                warn!(
                    room = %self.room,
                    %replica,
                    hash = %rebased.hash_after.short(),
                    "stale batch replayed, sender resyncs"
                );
                self.history.push(&rebased);
                Resolution {
                    verdict: Verdict::Rebased,
                    dispatches: vec![
                        Dispatch::everyone(ServerMessage::Batch(rebased)),
                        self.resync(replica),
                    ],
                }
            }
            Err(e) => {
                warn!(room = %self.room, %replica, error = %e, "replay failed");
                self.reject(replica, ProtocolError::Conflict(e.to_string()))
            }
        }
    }

    fn reject(&self, replica: ReplicaId, reason: ProtocolError) -> Resolution {
        Resolution {
            verdict: Verdict::Rejected(reason),
            dispatches: vec![self.resync(replica)],
        }
    }

    fn resync(&self, replica: ReplicaId) -> Dispatch {
        Dispatch::to(replica, ServerMessage::snapshot(self.snapshot()))
    }
}
