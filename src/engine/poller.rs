use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use super::{AccessStateResolver, CardDebouncer, Resolution};
use crate::config::ReaderSettings;
use crate::display::StatusDisplay;
use crate::error::ReaderError;
use crate::notify::NotificationDispatcher;
use crate::reader::{CardReader, Probe};

/// Slack on top of the probe timeout before the loop gives up on a reader
/// that ignores its own deadline.
const PROBE_GRACE: Duration = Duration::from_secs(2);

/// The polling loop: probe, debounce, resolve, notify, sleep.
///
/// Never exits on reader or persistence errors; only the shutdown signal
/// stops it.
pub struct ReaderLoop {
    reader: Box<dyn CardReader>,
    debouncer: CardDebouncer,
    resolver: AccessStateResolver,
    dispatcher: NotificationDispatcher,
    display: StatusDisplay,
    poll_interval: Duration,
    probe_timeout: Duration,
    /// When the display should return to the idle prompt
    ready_at: Option<Instant>,
    consecutive_failures: u32,
}

impl ReaderLoop {
    pub fn new(
        reader: Box<dyn CardReader>,
        resolver: AccessStateResolver,
        dispatcher: NotificationDispatcher,
        settings: &ReaderSettings,
    ) -> Self {
        Self {
            reader,
            debouncer: CardDebouncer::new(settings.debounce_window()),
            resolver,
            dispatcher,
            display: StatusDisplay::default(),
            poll_interval: settings.poll_interval(),
            probe_timeout: settings.probe_timeout(),
            ready_at: None,
            consecutive_failures: 0,
        }
    }

    pub fn with_display(mut self, display: StatusDisplay) -> Self {
        self.display = display;
        self
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Needs the multi-threaded runtime.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Reader loop started ({})", self.reader.describe());
        tracing::info!(
            "Poll interval: {} ms, cool-down: {} seconds",
            self.poll_interval.as_millis(),
            self.debouncer.window().as_secs()
        );
        self.display.ready();

        loop {
            if *shutdown.borrow() {
                break;
            }

            // 1. Probe, bounded even if the reader misbehaves
            let bound = self.probe_timeout + PROBE_GRACE;
            let probe = tokio::select! {
                _ = shutdown.changed() => break,
                result = timeout(bound, self.reader.probe(self.probe_timeout)) => {
                    result.unwrap_or_else(|_| {
                        tracing::debug!("Probe exceeded {} seconds; treating as no card", bound.as_secs());
                        Ok(Probe::NoCard)
                    })
                }
            };

            // 2. Debounce, resolve, notify. Store writes and display output
            // block, so keep them off the async workers.
            tokio::task::block_in_place(|| {
                self.handle_probe(probe, Instant::now(), Utc::now());
            });

            // 3. Idle until the next probe
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(self.poll_interval) => {}
            }
        }

        tracing::info!("Reader loop stopped");
    }

    /// Process one probe result observed at `now`
    pub fn handle_probe(
        &mut self,
        probe: Result<Probe, ReaderError>,
        now: Instant,
        at: DateTime<Utc>,
    ) -> Option<Resolution> {
        match probe {
            Ok(probe) => {
                if self.consecutive_failures > 0 {
                    tracing::info!(
                        "Card reader recovered after {} failed probes",
                        self.consecutive_failures
                    );
                    self.consecutive_failures = 0;
                }

                match probe {
                    Probe::Card(identifier) => self.handle_card(&identifier, now, at),
                    Probe::NoCard => {
                        self.restore_idle_display(now);
                        None
                    }
                }
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures == 1 {
                    tracing::warn!("Card reader error: {}", e);
                } else {
                    tracing::debug!(
                        failures = self.consecutive_failures,
                        "Card reader still failing: {}",
                        e
                    );
                }
                None
            }
        }
    }

    /// Debounce and resolve one card observation.
    ///
    /// Returns the resolution when the observation was accepted and resolved.
    /// A persistence failure is logged, sends no notification, and leaves the
    /// tap unrecorded so the holder can retry.
    pub fn handle_card(
        &mut self,
        identifier: &str,
        now: Instant,
        at: DateTime<Utc>,
    ) -> Option<Resolution> {
        if !self.debouncer.observe(identifier, now) {
            tracing::debug!(identifier, "Ignoring repeat read within cool-down");
            return None;
        }

        match self.resolver.resolve(identifier, at) {
            Ok(resolution) => {
                self.dispatcher.notify(resolution.event());
                self.display.show_resolution(&resolution);
                self.ready_at = Some(now + self.debouncer.window());
                Some(resolution)
            }
            Err(e) => {
                tracing::error!(identifier, "Failed to record access; tap again: {}", e);
                self.display.show("Error", "Please tap again");
                self.ready_at = Some(now + self.debouncer.window());
                None
            }
        }
    }

    fn restore_idle_display(&mut self, now: Instant) {
        if self.ready_at.is_some_and(|at| now >= at) {
            self.ready_at = None;
            self.display.ready();
        }
    }
}
