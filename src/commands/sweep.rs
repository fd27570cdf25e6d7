use anyhow::{Context, Result};
use chrono::Local;
use std::path::Path;

use crate::context::AppContext;
use crate::notify::AccessEvent;
use crate::schedule::{IdleSessionSweeper, SweepOutcome};

/// Run the daily close-out now instead of waiting for the scheduler
pub fn run_sweep(config_path: Option<&Path>, force: bool) -> Result<()> {
    let ctx = AppContext::from_path(config_path)?;
    let cutoff = ctx.config.scheduler.cutoff_time()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut sweeper = IdleSessionSweeper::load(ctx.store.clone(), cutoff)
            .context("Failed to load sweep history")?;

        let outcome = sweeper
            .run_if_due(Local::now(), force)
            .context("Idle session sweep failed")?;

        match outcome {
            SweepOutcome::NotDue => {
                println!(
                    "Sweep not due before {} (use --force to run now)",
                    cutoff.format("%H:%M")
                );
            }
            SweepOutcome::AlreadyDone(date) => {
                println!("✓ Sweep already completed for {}", date);
            }
            SweepOutcome::Ran(report) => {
                // Deliver before the runtime shuts down
                let deliveries: Vec<_> = report
                    .closed
                    .iter()
                    .filter_map(|(user, record)| {
                        ctx.dispatcher.notify(AccessEvent::forced_exit(user, record))
                    })
                    .collect();
                for delivery in deliveries {
                    let _ = delivery.await;
                }

                for (user, _) in &report.closed {
                    println!("  Signed out: {} ({})", user.name, user.identifier);
                }
                if report.failures > 0 {
                    anyhow::bail!(
                        "{} forced exits failed; sweep for {} is incomplete",
                        report.failures,
                        report.date
                    );
                }
                println!(
                    "✓ Sweep for {} closed {} sessions",
                    report.date,
                    report.closed.len()
                );
            }
        }

        Ok(())
    })
}
