use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Card-reader access logger
///
/// Records entry and exit events from a contactless card reader, notifies a
/// webhook, and signs out anyone still present at the daily cutoff.
#[derive(Parser, Debug)]
#[command(name = "access-logger")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the reader loop and scheduler until interrupted
    Run,
    /// Manage registered card holders
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Show the most recent access records
    History {
        /// Number of records to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Only show records for this card identifier
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Sign out everyone still present (once per day)
    Sweep {
        /// Run even if the daily cutoff has not been reached
        #[arg(long)]
        force: bool,
    },
    /// Validate the configuration and exit
    CheckConfig,
    /// Write an example configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Register a card holder
    Add {
        /// Card identifier (hex, separators ignored)
        identifier: String,
        /// Display name
        name: String,
    },
    /// List card holders and whether they are present
    List,
    /// Change a card holder's display name
    Rename {
        identifier: String,
        name: String,
    },
}
