//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Use this code instead of reading codes from stdin
    #[arg(long, value_name = "CODE")]
    pub code: Option<String>,

    /// Latitude of the current position (overrides configuration)
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude of the current position (overrides configuration)
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Keep scanning after each record until input ends
    #[arg(long, conflicts_with = "code")]
    pub continuous: bool,
}

/// Last-record command arguments.
#[derive(Debug, Args)]
pub struct LastCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Points command arguments.
#[derive(Debug, Args)]
pub struct PointsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
