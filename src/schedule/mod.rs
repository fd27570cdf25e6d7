// Periodic duties running beside the reader loop: log export and the daily
// close-out of sessions left open past the cutoff.

mod export;
mod sweeper;
mod ticker;

pub use export::{LogExporter, LogSummaryExporter};
pub use sweeper::{IdleSessionSweeper, SweepOutcome};
pub use ticker::PeriodicScheduler;
