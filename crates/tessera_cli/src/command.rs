//! Line-oriented grid commands.
//!
//! ```text
//! add <id> <x> <y> <w> <h>
//! mv <id> <x> <y>
//! rm <id>
//! print
//! hash
//! ```

use std::str::FromStr;
use tessera_core::ItemId;
use tessera_grid::Change;

/// One parsed script line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A grid mutation
    Apply(Change),
    /// Render the grid
    Print,
    /// Show the fingerprint
    Hash,
}

/// Why a line is not a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCommandError {
    /// Blank line
    #[error("empty command")]
    Empty,

    /// First word is not a known command
    #[error("unknown command `{0}`")]
    Unknown(String),

    /// Wrong number of arguments
    #[error("`{command}` takes {expected} arguments, got {found}")]
    Arity {
        /// Command name
        command: &'static str,
        /// Required argument count
        expected: usize,
        /// Given argument count
        found: usize,
    },

    /// A coordinate or size is not a non-negative integer
    #[error("{field} must be a non-negative integer, got `{value}`")]
    Number {
        /// Argument name
        field: &'static str,
        /// Offending text
        value: String,
    },

    /// The item id is unusable
    #[error("{0}")]
    Id(String),
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(ParseCommandError::Empty)?;
        let args: Vec<&str> = words.collect();

        match name {
            "add" => {
                arity("add", &args, 5)?;
                Ok(Self::Apply(Change::Add {
                    id: item_id(args[0])?,
                    x: number("x", args[1])?,
                    y: number("y", args[2])?,
                    w: number("w", args[3])?,
                    h: number("h", args[4])?,
                }))
            }
            "mv" => {
                arity("mv", &args, 3)?;
                Ok(Self::Apply(Change::Move {
                    id: item_id(args[0])?,
                    x: number("x", args[1])?,
                    y: number("y", args[2])?,
                }))
            }
            "rm" => {
                arity("rm", &args, 1)?;
                Ok(Self::Apply(Change::Remove {
                    id: item_id(args[0])?,
                }))
            }
            "print" => arity("print", &args, 0).map(|()| Self::Print),
            "hash" => arity("hash", &args, 0).map(|()| Self::Hash),
            other => Err(ParseCommandError::Unknown(other.to_string())),
        }
    }
}

fn arity(command: &'static str, args: &[&str], expected: usize) -> Result<(), ParseCommandError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ParseCommandError::Arity {
            command,
            expected,
            found: args.len(),
        })
    }
}

fn number(field: &'static str, value: &str) -> Result<u32, ParseCommandError> {
    value.parse().map_err(|_| ParseCommandError::Number {
        field,
        value: value.to_string(),
    })
}

fn item_id(value: &str) -> Result<ItemId, ParseCommandError> {
    ItemId::parse(value).map_err(|e| ParseCommandError::Id(e.to_string()))
}

/// A command with the 1-based line it came from
pub type ScriptLine = (usize, Result<Command, ParseCommandError>);

/// Parse a script, skipping blank lines and `#` comments
pub fn parse_script(text: &str) -> Vec<ScriptLine> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                None
            } else {
                Some((index + 1, line.parse()))
            }
        })
        .collect()
}
