//! Tessera CLI
//!
//! Drive a grid from command scripts, locally or through an in-process
//! replication hub.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod command;
mod run;
mod simulate;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tessera_core::RoomId;
use tessera_grid::{GridEngine, render_text};
use tessera_sync::{RoomHub, SyncConfig};
use tracing_subscriber::EnvFilter;

/// Largest accepted grid side, in cells
const MAX_GRID_SIDE: i64 = 4096;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera - collaborative grid engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a command script to a local grid
    Run {
        /// Grid width
        #[arg(
            long,
            default_value_t = 16,
            value_parser = clap::value_parser!(u32).range(1..=MAX_GRID_SIDE)
        )]
        width: u32,
        /// Grid height
        #[arg(
            long,
            default_value_t = 12,
            value_parser = clap::value_parser!(u32).range(1..=MAX_GRID_SIDE)
        )]
        height: u32,
        /// Script file (stdin if omitted)
        file: Option<PathBuf>,
    },
    /// Replay scripts as concurrent replicas of one room
    Simulate {
        /// Replicas to connect; scripts are reused round-robin
        #[arg(short, long)]
        replicas: Option<usize>,
        /// Room id
        #[arg(long, default_value = "sim")]
        room: String,
        /// Grid width
        #[arg(
            long,
            default_value_t = 16,
            value_parser = clap::value_parser!(u32).range(1..=MAX_GRID_SIDE)
        )]
        width: u32,
        /// Grid height
        #[arg(
            long,
            default_value_t = 12,
            value_parser = clap::value_parser!(u32).range(1..=MAX_GRID_SIDE)
        )]
        height: u32,
        /// One script per replica
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tessera=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { width, height, file } => run_local(width, height, file.as_deref()),
        Commands::Simulate {
            replicas,
            room,
            width,
            height,
            files,
        } => {
            let config = SyncConfig::new().with_grid_size(width, height);
            run_simulation(config, room, replicas, files).await
        }
    }
}

fn read_script(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .wrap_err("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn run_local(width: u32, height: u32, file: Option<&Path>) -> Result<()> {
    let script = read_script(file)?;
    let mut engine = GridEngine::new(width, height);
    let mut stdout = io::stdout().lock();

    let stats = run::run_script(&mut engine, &script, &mut stdout)?;
    drop(stdout);
    print!("{}", render_text(&engine));
    println!("fingerprint {}", engine.hash());
    println!(
        "{} applied, {} rejected, {} invalid",
        stats.applied, stats.rejected, stats.invalid
    );
    Ok(())
}

async fn run_simulation(
    config: SyncConfig,
    room: String,
    replicas: Option<usize>,
    files: Vec<PathBuf>,
) -> Result<()> {
    let count = replicas.unwrap_or(files.len());
    if count == 0 {
        bail!("at least one replica is required");
    }

    let mut scripts = Vec::with_capacity(count);
    for index in 0..count {
        let path = &files[index % files.len()];
        let text = read_script(Some(path))?;
        scripts.push(simulate::Script {
            name: format!("r{}", index + 1),
            lines: command::parse_script(&text),
        });
    }

    let hub = RoomHub::new(config);
    let room = RoomId::new(room);
    let mut stdout = io::stdout().lock();
    let report = simulate::simulate(&hub, &room, scripts, &mut stdout).await?;
    drop(stdout);

    println!("room {} at {}", room.as_str(), report.room_hash.short());
    for replica in &report.replicas {
        println!(
            "  {:<4} {:<13} {:<12} {} items, {} refused",
            replica.name,
            replica.state.as_str(),
            replica.hash.map_or_else(|| "-".to_string(), |h| h.short()),
            replica.items,
            replica.refused
        );
    }
    if report.converged() {
        println!("converged");
        Ok(())
    } else {
        bail!("replicas diverged from room {}", room.as_str())
    }
}
