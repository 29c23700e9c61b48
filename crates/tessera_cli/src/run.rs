//! `tessera run`: apply a command script to a local grid.

use crate::command::{Command, parse_script};
use std::io::{self, Write};
use tessera_grid::{GridEngine, render_text};
use tracing::debug;

/// Counts reported after a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Mutations the grid accepted
    pub applied: usize,
    /// Mutations the grid rejected
    pub rejected: usize,
    /// Lines that did not parse
    pub invalid: usize,
}

/// Apply every command in `script`, reporting problems and continuing
///
/// # Errors
///
/// Only if writing to `out` fails
pub fn run_script(
    engine: &mut GridEngine,
    script: &str,
    out: &mut impl Write,
) -> io::Result<RunStats> {
    let mut stats = RunStats::default();

    for (line, parsed) in parse_script(script) {
        let command = match parsed {
            Ok(command) => command,
            Err(e) => {
                stats.invalid += 1;
                writeln!(out, "line {line}: {e}")?;
                continue;
            }
        };

        match command {
            Command::Apply(change) => match engine.apply(&change) {
                Ok(_) => {
                    stats.applied += 1;
                    debug!(line, %change, "applied");
                }
                Err(e) => {
                    stats.rejected += 1;
                    writeln!(out, "line {line}: {change}: {e}")?;
                }
            },
            Command::Print => write!(out, "{}", render_text(engine))?,
            Command::Hash => writeln!(out, "{}", engine.hash())?,
        }
    }
    Ok(stats)
}
