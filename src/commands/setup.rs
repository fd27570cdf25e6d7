use anyhow::{Context, Result};
use std::path::Path;

use crate::config::{self, EXAMPLE_CONFIG};
use crate::context::AppContext;

/// Load, override and validate the configuration, then summarize it
pub fn check_config(config_path: Option<&Path>) -> Result<()> {
    let config = AppContext::load_config(config_path)?;

    println!("✓ Configuration is valid");
    println!();
    println!("Reader:        {:?} {}", config.reader.kind, config.reader.command.as_deref().unwrap_or(""));
    println!("Poll interval: {} ms", config.reader.poll_interval_ms);
    println!("Cool-down:     {} seconds", config.reader.debounce_secs);
    println!("Database:      {}", config.database_path().display());
    println!(
        "Webhook:       {}",
        if config.notifications.webhook_url.is_some() { "configured" } else { "disabled" }
    );
    println!("Daily cutoff:  {}", config.scheduler.cutoff);
    println!("Web listen:    {}", config.web.listen);
    if let Some(device) = &config.display.device {
        println!("Display:       {}", device.display());
    }

    Ok(())
}

/// Write the example configuration to `config_path` or the default location
pub fn init_config(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => config::default_config_path()
            .context("Could not determine the default configuration directory")?,
    };

    write_example_config(&path, force)?;

    println!("✓ Example configuration written to: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set [secrets] edit_password and secret_key");
    println!("  2. Point [reader] command at your card probe helper");
    println!("  3. Register card holders:");
    println!("     access-logger users add <identifier> <name>");

    Ok(())
}

fn write_example_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))
}
