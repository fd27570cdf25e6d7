use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod context;
mod daemon;
mod display;
mod engine;
mod error;
mod notify;
mod reader;
mod schedule;
mod store;

use cli::{Args, Commands};
use config::AppConfig;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    // The configured level applies unless RUST_LOG or --verbose says otherwise
    let configured_level = AppConfig::load(args.config.as_deref())
        .ok()
        .map(|config| config.logging.level);
    init_logging(args.verbose, configured_level.as_deref());

    let config_path = args.config.as_deref();
    match args.command {
        Commands::Run => commands::run_logger(config_path),
        Commands::Users { command } => commands::run_users_command(command, config_path),
        Commands::History { limit, user } => {
            commands::show_history(config_path, limit, user.as_deref())
        }
        Commands::Sweep { force } => commands::run_sweep(config_path, force),
        Commands::CheckConfig => commands::check_config(config_path),
        Commands::InitConfig { force } => commands::init_config(config_path, force),
    }
}

/// Initialize logging
fn init_logging(verbose: bool, configured_level: Option<&str>) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if verbose {
        "debug"
    } else {
        configured_level.unwrap_or("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}
