use anyhow::{Context, Result};
use chrono::Local;
use std::path::Path;

use crate::context::AppContext;
use crate::store::{AccessRecord, Store, User, normalize_identifier};

/// Print the most recent records, newest first
pub fn show_history(config_path: Option<&Path>, limit: usize, identifier: Option<&str>) -> Result<()> {
    let ctx = AppContext::from_path(config_path)?;

    let records = match identifier {
        Some(identifier) => user_history(&ctx.store, identifier, limit)?,
        None => ctx
            .store
            .recent_records(limit)
            .context("Failed to read access history")?,
    };

    if records.is_empty() {
        println!("No access records yet");
        return Ok(());
    }

    println!("Recent access records");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (user, record) in &records {
        println!("{}", format_history_line(user, record));
    }

    Ok(())
}

/// Newest `limit` records of one holder
fn user_history(store: &Store, identifier: &str, limit: usize) -> Result<Vec<(User, AccessRecord)>> {
    let normalized = normalize_identifier(identifier)
        .with_context(|| format!("Invalid card identifier '{}'", identifier))?;
    let user = store
        .find_user_by_identifier(&normalized)
        .context("Failed to look up user")?
        .with_context(|| format!("No user with identifier {}", normalized))?;

    let records = store
        .records_for(user.id)
        .with_context(|| format!("Failed to read records for {}", user.identifier))?;

    Ok(records
        .into_iter()
        .rev()
        .take(limit)
        .map(|record| (user.clone(), record))
        .collect())
}

fn format_history_line(user: &User, record: &AccessRecord) -> String {
    format!(
        "{}  {:<5}  {} ({})",
        record.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        record.direction,
        user.name,
        user.identifier
    )
}
