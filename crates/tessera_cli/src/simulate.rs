//! `tessera simulate`: drive several replicas through an in-process hub.
//!
//! Scripts are interleaved round-robin, one command per replica per
//! step. After every step the room is drained: inspecting the room acts
//! as a barrier because its queue is strictly ordered, so once the
//! snapshot comes back every earlier broadcast is already queued.

use crate::command::{Command, ScriptLine};
use color_eyre::eyre::{Result, WrapErr, eyre};
use std::io::Write;
use std::time::Instant;
use tessera_core::{Fingerprint, RoomId};
use tessera_grid::render_text;
use tessera_sync::{ReplicaConnection, ReplicaSynchronizer, RoomHub, SyncError, SyncState};
use tracing::{debug, info};

/// A named script for one replica
#[derive(Debug, Clone)]
pub struct Script {
    /// Label used in output
    pub name: String,
    /// Parsed lines
    pub lines: Vec<ScriptLine>,
}

/// Final state of one replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaReport {
    /// Script label
    pub name: String,
    /// Synchronization state
    pub state: SyncState,
    /// Local fingerprint
    pub hash: Option<Fingerprint>,
    /// Local item count
    pub items: usize,
    /// Commands the local grid refused
    pub refused: usize,
}

/// Outcome of a simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    /// Authoritative fingerprint
    pub room_hash: Fingerprint,
    /// One entry per replica, in script order
    pub replicas: Vec<ReplicaReport>,
}

impl SimulationReport {
    /// True if every replica is synced at the room's fingerprint
    #[must_use]
    pub fn converged(&self) -> bool {
        self.replicas
            .iter()
            .all(|r| r.state == SyncState::Synced && r.hash == Some(self.room_hash))
    }
}

struct Participant {
    name: String,
    connection: ReplicaConnection,
    replica: ReplicaSynchronizer,
    refused: usize,
}

/// Run the scripts against one room of `hub`, logging to `out`
///
/// # Errors
///
/// If the room task goes away or writing to `out` fails
pub async fn simulate(
    hub: &RoomHub,
    room: &RoomId,
    scripts: Vec<Script>,
    out: &mut impl Write,
) -> Result<SimulationReport> {
    let mut participants = Vec::with_capacity(scripts.len());
    for script in &scripts {
        let connection = hub.connect(room.clone()).await?;
        let replica = ReplicaSynchronizer::new(connection.replica(), hub.config());
        info!(name = %script.name, replica = %connection.replica(), "replica connected");
        participants.push(Participant {
            name: script.name.clone(),
            connection,
            replica,
            refused: 0,
        });
    }
    settle(hub, room, &mut participants).await?;

    let steps = scripts.iter().map(|s| s.lines.len()).max().unwrap_or(0);
    for step in 0..steps {
        for (participant, script) in participants.iter_mut().zip(&scripts) {
            let Some((line, parsed)) = script.lines.get(step) else {
                continue;
            };
            let label = format!("{}:{}", participant.name, line);
            match parsed {
                Err(e) => writeln!(out, "{label}: {e}")?,
                Ok(command) => step_command(participant, command, &label, out)?,
            }
        }
        settle(hub, room, &mut participants).await?;
    }

    let room_hash = hub
        .snapshot(room)
        .await
        .ok_or_else(|| eyre!("room {} disappeared", room.as_str()))?
        .fingerprint;
    let replicas = participants
        .iter()
        .map(|p| ReplicaReport {
            name: p.name.clone(),
            state: p.replica.state(),
            hash: p.replica.hash(),
            items: p.replica.engine().map_or(0, |e| e.len()),
            refused: p.refused,
        })
        .collect();
    Ok(SimulationReport { room_hash, replicas })
}

fn step_command(
    participant: &mut Participant,
    command: &Command,
    label: &str,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        Command::Apply(change) => {
            match participant.replica.submit([change.clone()], Instant::now()) {
                Ok(message) => participant.connection.send(message)?,
                Err(SyncError::Batch(e)) => {
                    participant.refused += 1;
                    let reason = e
                        .grid_error()
                        .map_or_else(|| e.to_string(), ToString::to_string);
                    writeln!(out, "{label}: {change}: {reason}")?;
                }
                Err(e) => {
                    participant.refused += 1;
                    writeln!(out, "{label}: {change}: {e}")?;
                }
            }
        }
        Command::Print => match participant.replica.engine() {
            Some(engine) => write!(out, "{label}:\n{}", render_text(engine))?,
            None => writeln!(out, "{label}: no grid")?,
        },
        Command::Hash => match participant.replica.hash() {
            Some(hash) => writeln!(out, "{label}: {hash}")?,
            None => writeln!(out, "{label}: no grid")?,
        },
    }
    Ok(())
}

/// Deliver queued messages until the room has nothing more to say
async fn settle(hub: &RoomHub, room: &RoomId, participants: &mut [Participant]) -> Result<()> {
    loop {
        hub.snapshot(room)
            .await
            .ok_or_else(|| eyre!("room {} disappeared", room.as_str()))?;

        let mut replied = false;
        for participant in participants.iter_mut() {
            while let Some(message) = participant.connection.try_recv() {
                let reaction = participant.replica.handle(message, Instant::now());
                if let Some(reply) = reaction.reply() {
                    participant
                        .connection
                        .send(reply)
                        .wrap_err_with(|| format!("{} lost its room", participant.name))?;
                    replied = true;
                }
            }
        }
        if !replied {
            debug!(room = %room, "settled");
            return Ok(());
        }
    }
}
