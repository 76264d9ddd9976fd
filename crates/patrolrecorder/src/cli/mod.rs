//! Command-line interface for the `patrolrec` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{ConfigCommand, HistoryCommand, LastCommand, PointsCommand, ScanCommand};

/// patrolrec - Record patrol checkpoints
///
/// Scan a checkpoint code, capture the guard's GPS position, and keep the
/// visit in a short local history.
#[derive(Debug, Parser)]
#[command(name = "patrolrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan a checkpoint and record the visit
    Scan(ScanCommand),

    /// Show the last recorded visit
    Last(LastCommand),

    /// List recorded visits, most recent first
    History(HistoryCommand),

    /// List known checkpoints
    Points(PointsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
