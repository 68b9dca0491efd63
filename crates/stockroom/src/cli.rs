//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

pub use crate::commands::restore::RestoreArgs;
pub use crate::commands::status::StatusArgs;
pub use crate::commands::worker::WorkerArgs;

/// Stockroom - restore inventories from XML backups
#[derive(Parser, Debug)]
#[command(name = "stockroom")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to stockroom.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore a backup document into the configured scope
    Restore(RestoreArgs),

    /// Show entity counts for the configured scope
    Status(StatusArgs),

    /// Queue backup documents and run them through the background worker
    Worker(WorkerArgs),
}
