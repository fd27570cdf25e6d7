use anyhow::{Context, Result};
use chrono::Local;
use std::path::Path;

use crate::cli::UserCommands;
use crate::context::AppContext;
use crate::store::{Direction, Store, User, normalize_identifier};

/// Run user management subcommands
pub fn run_users_command(command: UserCommands, config_path: Option<&Path>) -> Result<()> {
    let ctx = AppContext::from_path(config_path)?;

    match command {
        UserCommands::Add { identifier, name } => {
            let user = add_user(&ctx.store, &identifier, &name)?;
            println!("✓ Registered {} ({})", user.name, user.identifier);
        }
        UserCommands::List => list_users(&ctx.store)?,
        UserCommands::Rename { identifier, name } => {
            let identifier = parse_identifier(&identifier)?;
            let user = ctx
                .store
                .rename_user(&identifier, name.trim())
                .context("Failed to rename user")?;
            println!("✓ {} is now {}", user.identifier, user.name);
        }
    }

    Ok(())
}

/// Register a holder after normalizing the identifier
fn add_user(store: &Store, identifier: &str, name: &str) -> Result<User> {
    let identifier = parse_identifier(identifier)?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Name must not be empty");
    }

    store
        .add_user(&identifier, name)
        .context("Failed to register user")
}

fn list_users(store: &Store) -> Result<()> {
    let users = store.list_users().context("Failed to list users")?;
    if users.is_empty() {
        println!("No users registered");
        return Ok(());
    }

    println!("Registered users");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut present = 0;
    for user in &users {
        let last = store
            .last_record_for(user.id)
            .with_context(|| format!("Failed to read records for {}", user.identifier))?;

        let (status, last_seen) = match &last {
            Some(record) => (
                if record.direction == Direction::Entry { "in" } else { "out" },
                record
                    .timestamp
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string(),
            ),
            None => ("out", "never".to_string()),
        };
        if status == "in" {
            present += 1;
        }

        println!(
            "{:<20}  {:<3}  {:<16}  {}",
            user.identifier, status, last_seen, user.name
        );
    }
    println!();
    println!("{} users, {} present", users.len(), present);

    Ok(())
}

fn parse_identifier(raw: &str) -> Result<String> {
    normalize_identifier(raw)
        .with_context(|| format!("Invalid card identifier '{}': expected hex digits", raw))
}
