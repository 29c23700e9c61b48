//! Async room hub.
//!
//! Each room runs as one spawned task that owns its `RoomCoordinator`
//! and drains a command queue strictly in arrival order. Rooms are
//! created lazily on first connection and run for as long as the hub
//! exists. Replica outboxes are held weakly by the room, so a dropped
//! connection simply stops receiving and is pruned on the next fan-out.

use crate::config::SyncConfig;
use crate::error::{ProtocolError, SyncError};
use crate::message::{ClientMessage, ServerMessage};
use crate::room::{Dispatch, RoomCoordinator, Target};
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::{ReplicaId, RoomId};
use tessera_grid::GridSnapshot;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, info, warn};

/// Commands consumed by a room task
#[derive(Debug)]
pub enum RoomCommand {
    /// A replica connected
    Join {
        /// New replica
        replica: ReplicaId,
        /// Where to deliver its messages
        outbox: WeakUnboundedSender<ServerMessage>,
    },
    /// A replica disconnected
    Leave {
        /// Departing replica
        replica: ReplicaId,
    },
    /// A message from a replica
    Inbound {
        /// Sender
        replica: ReplicaId,
        /// Decoded message
        message: ClientMessage,
    },
    /// Read the authoritative grid
    Inspect {
        /// Reply channel
        reply: oneshot::Sender<GridSnapshot>,
    },
}

type RoomMap = Arc<RwLock<HashMap<RoomId, UnboundedSender<RoomCommand>>>>;

/// Server role: routes replica connections to their room tasks
#[derive(Debug, Clone)]
pub struct RoomHub {
    config: SyncConfig,
    rooms: RoomMap,
}

impl RoomHub {
    /// Create a hub; rooms are created on first connection
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Hub configuration
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Connect a new replica to a room, creating the room if needed
    ///
    /// The first message on the connection is the room's snapshot.
    ///
    /// # Errors
    ///
    /// `Disconnected` if the room task is gone
    pub async fn connect(&self, room: impl Into<RoomId>) -> Result<ReplicaConnection, SyncError> {
        let room = room.into();
        let commands = self.room_sender(&room).await;
        let replica = ReplicaId::new();
        let (outbox, inbox) = mpsc::unbounded_channel();

        commands
            .send(RoomCommand::Join {
                replica,
                outbox: outbox.downgrade(),
            })
            .map_err(|_| SyncError::Disconnected(room.to_string()))?;

        Ok(ReplicaConnection {
            replica,
            room,
            commands,
            _outbox: outbox,
            inbox,
        })
    }

    /// Current authoritative snapshot of a room, if it exists
    pub async fn snapshot(&self, room: &RoomId) -> Option<GridSnapshot> {
        let commands = self.rooms.read().await.get(room).cloned()?;
        let (reply, response) = oneshot::channel();
        commands.send(RoomCommand::Inspect { reply }).ok()?;
        response.await.ok()
    }

    /// Ids of every room created so far
    pub async fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.rooms.read().await.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    async fn room_sender(&self, room: &RoomId) -> UnboundedSender<RoomCommand> {
        if let Some(sender) = self.rooms.read().await.get(room) {
            return sender.clone();
        }

        let mut rooms = self.rooms.write().await;
        // another connection may have created it between the two locks
        if let Some(sender) = rooms.get(room) {
            return sender.clone();
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let coordinator = RoomCoordinator::new(room.clone(), &self.config);
        info!(
            room = %room,
            width = self.config.grid_width,
            height = self.config.grid_height,
            "room created"
        );
        tokio::spawn(run_room(coordinator, receiver));
        rooms.insert(room.clone(), sender.clone());
        sender
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

/// Room task: one command at a time, in arrival order
async fn run_room(mut coordinator: RoomCoordinator, mut commands: UnboundedReceiver<RoomCommand>) {
    let mut outboxes: HashMap<ReplicaId, WeakUnboundedSender<ServerMessage>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            RoomCommand::Join { replica, outbox } => {
                let snapshot = coordinator.join(replica);
                outboxes.insert(replica, outbox);
                deliver(&mut coordinator, &mut outboxes, replica, snapshot);
            }
            RoomCommand::Leave { replica } => {
                outboxes.remove(&replica);
                coordinator.leave(replica);
            }
            RoomCommand::Inbound { replica, message } => {
                debug!(room = %coordinator.room(), %replica, kind = message.kind(), "inbound");
                let resolution = coordinator.handle(replica, message);
                for dispatch in resolution.dispatches {
                    fan_out(&mut coordinator, &mut outboxes, dispatch);
                }
            }
            RoomCommand::Inspect { reply } => {
                let _ = reply.send(coordinator.snapshot());
            }
        }
    }
    debug!(room = %coordinator.room(), "room stopped");
}

fn fan_out(
    coordinator: &mut RoomCoordinator,
    outboxes: &mut HashMap<ReplicaId, WeakUnboundedSender<ServerMessage>>,
    dispatch: Dispatch,
) {
    match dispatch.target {
        Target::Replica(replica) => deliver(coordinator, outboxes, replica, dispatch.message),
        Target::Everyone => {
            let replicas: Vec<ReplicaId> = outboxes.keys().copied().collect();
            for replica in replicas {
                deliver(coordinator, outboxes, replica, dispatch.message.clone());
            }
        }
    }
}

/// Fire-and-forget delivery; dead outboxes are pruned
fn deliver(
    coordinator: &mut RoomCoordinator,
    outboxes: &mut HashMap<ReplicaId, WeakUnboundedSender<ServerMessage>>,
    replica: ReplicaId,
    message: ServerMessage,
) {
    let Some(outbox) = outboxes.get(&replica) else {
        return;
    };
    let delivered = outbox
        .upgrade()
        .is_some_and(|sender| sender.send(message).is_ok());
    if !delivered {
        debug!(room = %coordinator.room(), %replica, "pruning dead replica");
        outboxes.remove(&replica);
        coordinator.leave(replica);
    }
}

/// One replica's connection to a room
///
/// Dropping the connection leaves the room.
#[derive(Debug)]
pub struct ReplicaConnection {
    replica: ReplicaId,
    room: RoomId,
    commands: UnboundedSender<RoomCommand>,
    _outbox: UnboundedSender<ServerMessage>,
    inbox: UnboundedReceiver<ServerMessage>,
}

impl ReplicaConnection {
    /// This connection's replica id
    #[must_use]
    pub const fn replica(&self) -> ReplicaId {
        self.replica
    }

    /// The room this connection belongs to
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Queue a message for the room
    ///
    /// # Errors
    ///
    /// `Disconnected` if the room task is gone
    pub fn send(&self, message: ClientMessage) -> Result<(), SyncError> {
        self.commands
            .send(RoomCommand::Inbound {
                replica: self.replica,
                message,
            })
            .map_err(|_| SyncError::Disconnected(self.room.to_string()))
    }

    /// Decode a JSON message and queue it for the room
    ///
    /// Malformed text is discarded and never reaches the room.
    ///
    /// # Errors
    ///
    /// `Protocol(Malformed)` for bad input, `Disconnected` if the room
    /// task is gone
    pub fn send_raw(&self, text: &str) -> Result<(), SyncError> {
        let message = ClientMessage::decode(text).map_err(|e: ProtocolError| {
            warn!(
                room = %self.room,
                replica = %self.replica,
                error = %e,
                "discarding malformed message"
            );
            e
        })?;
        self.send(message)
    }

    /// Wait for the next message from the room
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.inbox.recv().await
    }

    /// Next message if one is already queued
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.inbox.try_recv().ok()
    }
}

impl Drop for ReplicaConnection {
    fn drop(&mut self) {
        let _ = self.commands.send(RoomCommand::Leave {
            replica: self.replica,
        });
    }
}
