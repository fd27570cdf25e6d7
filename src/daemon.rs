use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::context::AppContext;
use crate::display::StatusDisplay;
use crate::engine::{AccessStateResolver, ReaderLoop};
use crate::reader::{self, CardReader};
use crate::schedule::{IdleSessionSweeper, LogSummaryExporter, PeriodicScheduler};

/// The two long-running loops of a running logger
pub struct Daemon {
    reader_task: JoinHandle<()>,
    scheduler_task: JoinHandle<()>,
}

impl Daemon {
    /// Spawn the reader loop and the scheduler on the current runtime
    pub fn start(
        ctx: &AppContext,
        reader: Box<dyn CardReader>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let config = &ctx.config;

        // 1. Reader loop
        let reader_loop = ReaderLoop::new(
            reader,
            AccessStateResolver::new(ctx.store.clone()),
            ctx.dispatcher.clone(),
            &config.reader,
        )
        .with_display(StatusDisplay::new(config.display.device.clone()));

        // 2. Scheduler with export and daily sweep
        let cutoff = config.scheduler.cutoff_time()?;
        let sweeper = IdleSessionSweeper::load(ctx.store.clone(), cutoff)
            .context("Failed to load sweep history")?;
        tracing::info!(
            "Daily cutoff: {} (last sweep: {})",
            cutoff.format("%H:%M"),
            sweeper
                .last_run()
                .map(|date| date.to_string())
                .unwrap_or_else(|| "never".to_string())
        );
        let scheduler = PeriodicScheduler::new(
            config.scheduler.tick_interval(),
            Arc::new(LogSummaryExporter::new(ctx.store.clone())),
            sweeper,
            ctx.dispatcher.clone(),
        );

        Ok(Self {
            reader_task: tokio::spawn(reader_loop.run(shutdown.clone())),
            scheduler_task: tokio::spawn(scheduler.run(shutdown)),
        })
    }

    /// Wait for both loops to finish after shutdown was signalled
    pub async fn join(self) {
        if let Err(e) = self.reader_task.await {
            tracing::error!("Reader loop task failed: {}", e);
        }
        if let Err(e) = self.scheduler_task.await {
            tracing::error!("Scheduler task failed: {}", e);
        }
    }
}

/// Run the logger until Ctrl-C (or SIGTERM on Unix)
pub async fn run_daemon(ctx: AppContext) -> Result<()> {
    tracing::info!("Starting access logger");

    let reader = reader::from_settings(&ctx.config.reader)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let daemon = Daemon::start(&ctx, reader, shutdown_rx)?;

    wait_for_shutdown_signal().await?;
    tracing::info!("Shutdown requested, stopping loops");

    // In-flight notifications are abandoned with the runtime
    let _ = shutdown_tx.send(true);
    daemon.join().await;

    tracing::info!("Access logger stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C"),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ReaderKind};
    use crate::reader::scripted::ScriptedReader;
    use crate::store::Direction;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn loops_record_taps_and_stop_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.reader.kind = ReaderKind::Stdin;
        config.reader.poll_interval_ms = 10;
        config.storage.database = Some(dir.path().join("access_log.db"));
        let ctx = AppContext::initialize(config).unwrap();
        let user = ctx.store.add_user("F637CF05", "Soma Taniguchi").unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let daemon = Daemon::start(
            &ctx,
            Box::new(ScriptedReader::cards(&["F637CF05"])),
            shutdown_rx,
        )
        .unwrap();

        for _ in 0..200 {
            if ctx.store.record_count().unwrap() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), daemon.join())
            .await
            .expect("loops should stop on shutdown");

        let last = ctx.store.last_record_for(user.id).unwrap().unwrap();
        assert_eq!(last.direction, Direction::Entry);
    }
}
