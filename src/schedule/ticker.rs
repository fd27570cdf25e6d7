use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use super::{IdleSessionSweeper, LogExporter, SweepOutcome};
use crate::notify::{AccessEvent, NotificationDispatcher};

/// Fixed-interval ticker driving the export collaborator and the daily sweep
pub struct PeriodicScheduler {
    interval: Duration,
    exporter: Arc<dyn LogExporter>,
    sweeper: IdleSessionSweeper,
    dispatcher: NotificationDispatcher,
}

impl PeriodicScheduler {
    pub fn new(
        interval: Duration,
        exporter: Arc<dyn LogExporter>,
        sweeper: IdleSessionSweeper,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            interval,
            exporter,
            sweeper,
            dispatcher,
        }
    }

    /// Tick until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Needs the multi-threaded runtime; export and sweep block on the store.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Scheduler started (every {} seconds)", self.interval.as_secs());

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            tokio::task::block_in_place(|| {
                self.tick(Local::now());
            });
        }

        tracing::info!("Scheduler stopped");
    }

    /// One tick: export, then sweep if due. Nothing here is fatal.
    pub fn tick(&mut self, now: DateTime<Local>) -> Option<SweepOutcome> {
        // 1. Export collaborator
        if let Err(e) = self.exporter.export() {
            tracing::warn!("Log export failed: {:#}", e);
        }

        // 2. Daily close-out
        match self.sweeper.run_if_due(now, false) {
            Ok(outcome) => {
                if let SweepOutcome::Ran(report) = &outcome {
                    for (user, record) in &report.closed {
                        self.dispatcher.notify(AccessEvent::forced_exit(user, record));
                    }
                    tracing::info!(
                        "Idle session sweep for {} closed {} sessions",
                        report.date,
                        report.closed.len()
                    );
                }
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("Idle session sweep failed: {}", e);
                None
            }
        }
    }
}
