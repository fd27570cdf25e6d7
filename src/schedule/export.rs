use anyhow::{Context, Result};

use crate::store::Store;

/// Periodic log export collaborator.
///
/// Invoked once per scheduler tick; a failure is logged by the scheduler and
/// never stops it.
pub trait LogExporter: Send + Sync {
    fn export(&self) -> Result<()>;
}

/// Exporter that reports the state of the log instead of writing a file
pub struct LogSummaryExporter {
    store: Store,
}

impl LogSummaryExporter {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl LogExporter for LogSummaryExporter {
    fn export(&self) -> Result<()> {
        let records = self
            .store
            .record_count()
            .context("Failed to count access records")?;
        let present = self
            .store
            .present_users()
            .context("Failed to list present users")?;

        tracing::debug!(
            "Access log: {} records, {} users present",
            records,
            present.len()
        );
        Ok(())
    }
}
