use anyhow::Result;
use std::path::Path;

use crate::context::AppContext;
use crate::daemon;

/// Run the logger in the foreground until interrupted
pub fn run_logger(config_path: Option<&Path>) -> Result<()> {
    println!("Access Logger v{}", env!("CARGO_PKG_VERSION"));
    println!("Press Ctrl+C to stop");
    println!();

    let ctx = AppContext::from_path(config_path)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(daemon::run_daemon(ctx))
}
