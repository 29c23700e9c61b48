//! Client-side replica state machine.
//!
//! A replica applies its own batches speculatively, sends them to the
//! room, and reconciles every inbound message purely by fingerprint:
//!
//! - a batch whose `hash_after` equals the local fingerprint is already
//!   reflected (this is how a replica's own echo arrives);
//! - a batch whose `hash_before` equals the local fingerprint is applied;
//! - anything else means the replica diverged, so it drops its state and
//!   asks for a snapshot.
//!
//! Time is always passed in by the caller.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::message::{ClientMessage, ServerMessage};
use std::fmt;
use std::time::{Duration, Instant};
use tessera_core::{Fingerprint, ItemId, ReplicaId};
use tessera_grid::{Batch, Change, GridEngine, recorder};
use tracing::{debug, warn};

/// Replica synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No snapshot received yet
    Uninitialized,
    /// Local grid matches the room as far as the replica knows
    Synced,
    /// A local batch was sent and is not yet confirmed
    AwaitingAck,
    /// Local state was discarded; waiting for a snapshot
    Resyncing,
}

impl SyncState {
    /// Short name for log lines and errors
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Synced => "synced",
            Self::AwaitingAck => "awaiting_ack",
            Self::Resyncing => "resyncing",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the replica reacted to an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// A snapshot replaced the local grid
    Loaded,
    /// A batch was applied locally
    Applied,
    /// The message was already reflected locally
    AlreadyApplied,
    /// The pending batch was confirmed
    Acknowledged,
    /// The message does not apply in the current state
    Ignored,
    /// Local state was discarded; send a resync request
    Resync,
}

impl Reaction {
    /// Message the caller should send back, if any
    #[must_use]
    pub const fn reply(&self) -> Option<ClientMessage> {
        match self {
            Self::Resync => Some(ClientMessage::resync_request()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Pending {
    batch: Batch,
    sent_at: Instant,
}

/// One replica of a room's grid
#[derive(Debug)]
pub struct ReplicaSynchronizer {
    id: ReplicaId,
    state: SyncState,
    engine: Option<GridEngine>,
    pending: Option<Pending>,
    resync_requested_at: Option<Instant>,
    ack_timeout: Duration,
}

impl ReplicaSynchronizer {
    /// Create an uninitialized replica
    #[must_use]
    pub fn new(id: ReplicaId, config: &SyncConfig) -> Self {
        Self {
            id,
            state: SyncState::Uninitialized,
            engine: None,
            pending: None,
            resync_requested_at: None,
            ack_timeout: config.ack_timeout(),
        }
    }

    /// Replica id
    #[must_use]
    pub const fn id(&self) -> ReplicaId {
        self.id
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SyncState {
        self.state
    }

    /// The local grid, once a snapshot has been loaded
    #[must_use]
    pub fn engine(&self) -> Option<&GridEngine> {
        self.engine.as_ref()
    }

    /// Local fingerprint, once a snapshot has been loaded
    #[must_use]
    pub fn hash(&self) -> Option<Fingerprint> {
        self.engine.as_ref().map(GridEngine::hash)
    }

    /// The batch awaiting acknowledgement
    #[must_use]
    pub fn pending(&self) -> Option<&Batch> {
        self.pending.as_ref().map(|p| &p.batch)
    }

    /// Apply changes locally as one batch and return the message to send
    ///
    /// # Errors
    ///
    /// `Busy` while a batch awaits acknowledgement, `NotSynced` without a
    /// usable grid, `Batch` if the local grid rejects the changes (nothing
    /// is applied and the replica stays `Synced`)
    pub fn submit(
        &mut self,
        changes: impl IntoIterator<Item = Change>,
        now: Instant,
    ) -> Result<ClientMessage, SyncError> {
        match self.state {
            SyncState::Synced => {}
            SyncState::AwaitingAck => return Err(SyncError::Busy),
            other => return Err(SyncError::NotSynced(other.as_str())),
        }
        let engine = self
            .engine
            .as_mut()
            .ok_or(SyncError::NotSynced(SyncState::Uninitialized.as_str()))?;

        let batch = recorder::record(engine, changes)?;
        debug!(
            replica = %self.id,
            changes = batch.len(),
            after = %batch.hash_after.short(),
            "submitting batch"
        );
        self.pending = Some(Pending {
            batch: batch.clone(),
            sent_at: now,
        });
        self.state = SyncState::AwaitingAck;
        Ok(ClientMessage::Batch(batch))
    }

    /// Submit a single add
    ///
    /// # Errors
    ///
    /// See [`ReplicaSynchronizer::submit`]
    pub fn add_item(
        &mut self,
        id: impl Into<ItemId>,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        now: Instant,
    ) -> Result<ClientMessage, SyncError> {
        self.submit([Change::add(id, x, y, w, h)], now)
    }

    /// Submit a single move
    ///
    /// # Errors
    ///
    /// See [`ReplicaSynchronizer::submit`]
    pub fn move_item(
        &mut self,
        id: impl Into<ItemId>,
        x: u32,
        y: u32,
        now: Instant,
    ) -> Result<ClientMessage, SyncError> {
        self.submit([Change::move_to(id, x, y)], now)
    }

    /// Submit a single remove
    ///
    /// # Errors
    ///
    /// See [`ReplicaSynchronizer::submit`]
    pub fn remove_item(
        &mut self,
        id: impl Into<ItemId>,
        now: Instant,
    ) -> Result<ClientMessage, SyncError> {
        self.submit([Change::remove(id)], now)
    }

    /// Reconcile one message from the room
    pub fn handle(&mut self, message: ServerMessage, now: Instant) -> Reaction {
        let reaction = match message {
            ServerMessage::Snapshot { grid } => match GridEngine::deserialize(&grid) {
                Ok(engine) => {
                    self.engine = Some(engine);
                    self.pending = None;
                    self.resync_requested_at = None;
                    self.state = SyncState::Synced;
                    Reaction::Loaded
                }
                Err(e) => {
                    warn!(replica = %self.id, error = %e, "discarding invalid snapshot");
                    self.start_resync(now)
                }
            },
            ServerMessage::Batch(batch) => self.handle_batch(&batch, now),
            ServerMessage::Ack { ack } => self.handle_ack(ack, now),
        };
        debug!(replica = %self.id, state = %self.state, ?reaction, "message handled");
        reaction
    }

    fn handle_batch(&mut self, batch: &Batch, now: Instant) -> Reaction {
        if !matches!(self.state, SyncState::Synced | SyncState::AwaitingAck) {
            return Reaction::Ignored;
        }
        let Some(engine) = self.engine.as_mut() else {
            return self.start_resync(now);
        };
        let local = engine.hash();

        if batch.hash_after == local {
            self.settle();
            return Reaction::AlreadyApplied;
        }
        if batch.hash_before == local {
            return match engine.apply_batch(batch) {
                Ok(()) => {
                    self.settle();
                    Reaction::Applied
                }
                Err(e) => {
                    warn!(replica = %self.id, error = %e, "broadcast batch failed locally");
                    self.start_resync(now)
                }
            };
        }

        warn!(
            replica = %self.id,
            local = %local.short(),
            before = %batch.hash_before.short(),
            after = %batch.hash_after.short(),
            "replica diverged"
        );
        self.start_resync(now)
    }

    fn handle_ack(&mut self, ack: Fingerprint, now: Instant) -> Reaction {
        if !matches!(self.state, SyncState::Synced | SyncState::AwaitingAck) {
            return Reaction::Ignored;
        }
        if self.hash() != Some(ack) {
            return self.start_resync(now);
        }
        if self.state == SyncState::AwaitingAck {
            self.settle();
            Reaction::Acknowledged
        } else {
            Reaction::AlreadyApplied
        }
    }

    /// Enforce the acknowledgement bound
    ///
    /// Returns a resync request when a pending batch or an outstanding
    /// resync request has waited longer than the ack timeout.
    pub fn check_liveness(&mut self, now: Instant) -> Option<ClientMessage> {
        let waiting_since = match self.state {
            SyncState::AwaitingAck => self.pending.as_ref().map(|p| p.sent_at),
            SyncState::Resyncing => self.resync_requested_at,
            _ => None,
        }?;
        if now.saturating_duration_since(waiting_since) < self.ack_timeout {
            return None;
        }
        warn!(replica = %self.id, state = %self.state, "no answer within ack timeout, resyncing");
        self.start_resync(now).reply()
    }

    /// Drop all local state; a snapshot is needed before the next action
    pub fn disconnect(&mut self) {
        debug!(replica = %self.id, state = %self.state, "replica disconnected");
        self.engine = None;
        self.pending = None;
        self.resync_requested_at = None;
        self.state = SyncState::Uninitialized;
    }

    fn settle(&mut self) {
        self.pending = None;
        self.state = SyncState::Synced;
    }

    fn start_resync(&mut self, now: Instant) -> Reaction {
        self.pending = None;
        self.resync_requested_at = Some(now);
        self.state = SyncState::Resyncing;
        Reaction::Resync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomCoordinator;
    use tessera_core::RoomId;

    fn synced(room: &mut RoomCoordinator, now: Instant) -> ReplicaSynchronizer {
        let mut replica = ReplicaSynchronizer::new(ReplicaId::new(), &SyncConfig::default());
        let snapshot = room.join(replica.id());
        assert_eq!(replica.handle(snapshot, now), Reaction::Loaded);
        replica
    }

    fn batch_of(message: ClientMessage) -> Batch {
        match message {
            ClientMessage::Batch(batch) => batch,
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn test_starts_uninitialized() {
        let mut replica = ReplicaSynchronizer::new(ReplicaId::new(), &SyncConfig::default());
        let now = Instant::now();
        assert_eq!(replica.state(), SyncState::Uninitialized);
        assert!(replica.hash().is_none());
        assert_eq!(
            replica.add_item("a", 0, 0, 1, 1, now).unwrap_err(),
            SyncError::NotSynced("uninitialized")
        );
    }

    #[test]
    fn test_submit_is_speculative_and_blocks() {
        let now = Instant::now();
        let mut room = RoomCoordinator::new(RoomId::from("r"), &SyncConfig::default());
        let mut replica = synced(&mut room, now);

        let batch = batch_of(replica.add_item("a", 2, 2, 2, 4, now).unwrap());
        assert_eq!(replica.state(), SyncState::AwaitingAck);
        assert_eq!(replica.hash(), Some(batch.hash_after));
        assert_eq!(replica.pending(), Some(&batch));
        assert_eq!(replica.move_item("a", 0, 0, now).unwrap_err(), SyncError::Busy);
    }

    #[test]
    fn test_rejected_local_change_keeps_synced() {
        let now = Instant::now();
        let mut room = RoomCoordinator::new(RoomId::from("r"), &SyncConfig::default());
        let mut replica = synced(&mut room, now);
        let err = replica.remove_item("ghost", now).unwrap_err();
        assert!(matches!(err, SyncError::Batch(_)));
        assert_eq!(replica.state(), SyncState::Synced);
    }

    #[test]
    fn test_own_echo_confirms() {
        let now = Instant::now();
        let mut room = RoomCoordinator::new(RoomId::from("r"), &SyncConfig::default());
        let mut replica = synced(&mut room, now);
        let message = replica.add_item("a", 2, 2, 2, 4, now).unwrap();
        let echo = room.handle(replica.id(), message).dispatches.remove(0).message;

        assert_eq!(replica.handle(echo, now), Reaction::AlreadyApplied);
        assert_eq!(replica.state(), SyncState::Synced);
        assert!(replica.pending().is_none());
        assert_eq!(replica.hash(), Some(room.hash()));
    }

    #[test]
    fn test_ack_confirms() {
        let now = Instant::now();
        let mut room = RoomCoordinator::new(RoomId::from("r"), &SyncConfig::default());
        let mut replica = synced(&mut room, now);
        replica.add_item("a", 2, 2, 2, 4, now).unwrap();
        let ack = ServerMessage::Ack {
            ack: replica.hash().unwrap(),
        };
        assert_eq!(replica.handle(ack, now), Reaction::Acknowledged);
        assert_eq!(replica.state(), SyncState::Synced);
    }

    #[test]
    fn test_foreign_ack_forces_resync() {
        let now = Instant::now();
        let mut room = RoomCoordinator::new(RoomId::from("r"), &SyncConfig::default());
        let mut replica = synced(&mut room, now);
        let ack = ServerMessage::Ack {
            ack: Fingerprint::compute(b"elsewhere"),
        };
        let reaction = replica.handle(ack, now);
        assert_eq!(reaction, Reaction::Resync);
        assert_eq!(reaction.reply(), Some(ClientMessage::resync_request()));
    }

    #[test]
    fn test_other_replica_batch_applies() {
        let now = Instant::now();
        let mut room = RoomCoordinator::new(RoomId::from("r"), &SyncConfig::default());
        let mut writer = synced(&mut room, now);
        let mut reader = synced(&mut room, now);

        let message = writer.add_item("a", 0, 0, 3, 3, now).unwrap();
        let broadcast = room.handle(writer.id(), message).dispatches.remove(0).message;

        assert_eq!(reader.handle(broadcast, now), Reaction::Applied);
        assert_eq!(reader.hash(), Some(room.hash()));
        assert_eq!(reader.engine().unwrap().get_item("a").unwrap().w, 3);
    }

    #[test]
    fn test_divergence_resyncs_then_snapshot_recovers() {
        let now = Instant::now();
        let mut room = RoomCoordinator::new(RoomId::from("r"), &SyncConfig::default());
        let mut replica = synced(&mut room, now);
        replica.add_item("mine", 0, 0, 1, 1, now).unwrap();

        let mut other = GridEngine::deserialize(&room.snapshot()).unwrap();
        let foreign =
            recorder::record(&mut other, vec![Change::add("theirs", 5, 5, 1, 1)]).unwrap();
        room.handle(ReplicaId::new(), ClientMessage::Batch(foreign.clone()));

        assert_eq!(replica.handle(ServerMessage::Batch(foreign), now), Reaction::Resync);
        assert_eq!(replica.state(), SyncState::Resyncing);
        assert!(replica.pending().is_none());
        assert_eq!(
            replica.submit([Change::remove("mine")], now).unwrap_err(),
            SyncError::NotSynced("resyncing")
        );

        let later = ServerMessage::Batch(foreign_followup(&room));
        assert_eq!(replica.handle(later, now), Reaction::Ignored);

        let snapshot = ServerMessage::snapshot(room.snapshot());
        assert_eq!(replica.handle(snapshot, now), Reaction::Loaded);
        assert_eq!(replica.hash(), Some(room.hash()));
        assert!(replica.engine().unwrap().get_item("mine").is_none());
    }

    fn foreign_followup(room: &RoomCoordinator) -> Batch {
        let mut copy = GridEngine::deserialize(&room.snapshot()).unwrap();
        recorder::record(&mut copy, vec![Change::move_to("theirs", 6, 6)]).unwrap()
    }

    #[test]
    fn test_ack_timeout_triggers_resync() {
        let start = Instant::now();
        let config = SyncConfig::default().with_ack_timeout(100);
        let mut room = RoomCoordinator::new(RoomId::from("r"), &config);
        let mut replica = ReplicaSynchronizer::new(ReplicaId::new(), &config);
        replica.handle(room.join(replica.id()), start);

        replica.add_item("a", 0, 0, 1, 1, start).unwrap();
        assert!(replica.check_liveness(start + Duration::from_millis(50)).is_none());
        assert_eq!(
            replica.check_liveness(start + Duration::from_millis(100)),
            Some(ClientMessage::resync_request())
        );
        assert_eq!(replica.state(), SyncState::Resyncing);

        // unanswered resync requests are repeated after another timeout
        let resent = start + Duration::from_millis(100);
        assert!(replica.check_liveness(resent + Duration::from_millis(10)).is_none());
        assert!(replica.check_liveness(resent + Duration::from_millis(100)).is_some());
    }

    #[test]
    fn test_invalid_snapshot_resyncs() {
        let now = Instant::now();
        let mut replica = ReplicaSynchronizer::new(ReplicaId::new(), &SyncConfig::default());
        let mut grid = GridEngine::new(4, 4).serialize();
        grid.fingerprint = Fingerprint::compute(b"bogus");
        assert_eq!(replica.handle(ServerMessage::snapshot(grid), now), Reaction::Resync);
        assert_eq!(replica.state(), SyncState::Resyncing);
    }

    #[test]
    fn test_disconnect_drops_state() {
        let now = Instant::now();
        let mut room = RoomCoordinator::new(RoomId::from("r"), &SyncConfig::default());
        let mut replica = synced(&mut room, now);
        replica.add_item("a", 0, 0, 1, 1, now).unwrap();

        replica.disconnect();
        assert_eq!(replica.state(), SyncState::Uninitialized);
        assert!(replica.engine().is_none());
        assert!(replica.pending().is_none());
        assert!(replica.check_liveness(now + Duration::from_secs(60)).is_none());
    }
}
