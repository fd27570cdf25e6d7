use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::PersistenceError;
use crate::store::{AccessRecord, Store, User};

/// What a sweep attempt did
#[derive(Debug, Clone, PartialEq)]
pub enum SweepOutcome {
    /// Today's cutoff has not been reached yet
    NotDue,
    /// The close-out for this date already completed
    AlreadyDone(NaiveDate),
    Ran(SweepReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub date: NaiveDate,
    /// Users whose session was closed, with the forced Exit record
    pub closed: Vec<(User, AccessRecord)>,
    /// Forced exits that could not be written; the date stays unmarked
    pub failures: usize,
}

/// Daily close-out of sessions nobody tapped out of.
///
/// Runs at most once per local calendar date. The last completed date is kept
/// in the database, so restarts and manual sweeps share the same ledger.
pub struct IdleSessionSweeper {
    store: Store,
    cutoff: NaiveTime,
    last_run: Option<NaiveDate>,
}

impl IdleSessionSweeper {
    pub fn load(store: Store, cutoff: NaiveTime) -> Result<Self, PersistenceError> {
        let last_run = store.last_sweep_date()?;
        if let Some(date) = last_run {
            tracing::debug!("Last idle session sweep: {}", date);
        }

        Ok(Self {
            store,
            cutoff,
            last_run,
        })
    }

    pub fn last_run(&self) -> Option<NaiveDate> {
        self.last_run
    }

    /// True when the most recent cutoff that has passed has not been swept.
    ///
    /// Before today's cutoff that is yesterday's, so a logger that was down
    /// over a cutoff catches up on its first tick.
    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        self.sweep_date(now).is_some_and(|date| !self.done_for(date))
    }

    /// Close open sessions if the sweep is due.
    ///
    /// `force` skips the time-of-day check but never the once-per-date check.
    /// Sessions entered after the swept date's cutoff are left open.
    pub fn run_if_due(
        &mut self,
        now: DateTime<Local>,
        force: bool,
    ) -> Result<SweepOutcome, PersistenceError> {
        let today = now.date_naive();

        // Cached check first so idle ticks never touch the database
        if !force && !self.is_due(now) {
            return Ok(if self.done_for(today) {
                SweepOutcome::AlreadyDone(today)
            } else {
                SweepOutcome::NotDue
            });
        }

        let date = if force {
            today
        } else {
            self.sweep_date(now).unwrap_or(today)
        };

        // Pick up sweeps completed by another process since we loaded
        if let Some(last) = self.store.last_sweep_date()? {
            self.last_run = self.last_run.max(Some(last));
        }
        if self.done_for(date) {
            return Ok(SweepOutcome::AlreadyDone(date));
        }

        let sweep_time = now.with_timezone(&Utc);
        let entered_before = cutoff_instant(date, self.cutoff)
            .map(|cutoff| cutoff.min(sweep_time))
            .unwrap_or(sweep_time);

        tracing::info!(
            "Running idle session sweep for {} (entries before {})",
            date,
            entered_before.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );

        let mut report = SweepReport {
            date,
            closed: Vec::new(),
            failures: 0,
        };

        for (user, _) in self.store.present_users()? {
            match self.store.force_exit(user.id, entered_before, sweep_time) {
                Ok(Some(record)) => {
                    tracing::info!(user = %user.name, identifier = %user.identifier, "Forced exit recorded");
                    report.closed.push((user, record));
                }
                Ok(None) => {
                    tracing::debug!(user = %user.name, "Session opened after cutoff; left open");
                }
                Err(e) => {
                    tracing::error!(user = %user.name, "Failed to force exit: {}", e);
                    report.failures += 1;
                }
            }
        }

        if report.failures == 0 {
            match self.store.mark_sweep(date, sweep_time) {
                Ok(()) => self.last_run = self.last_run.max(Some(date)),
                Err(e) => tracing::error!("Failed to record sweep completion: {}", e),
            }
        } else {
            tracing::warn!(
                "{} forced exits failed; sweep will be retried on the next tick",
                report.failures
            );
        }

        Ok(SweepOutcome::Ran(report))
    }

    /// Date of the latest cutoff at or before `now`
    fn sweep_date(&self, now: DateTime<Local>) -> Option<NaiveDate> {
        let today = now.date_naive();
        if now.time() >= self.cutoff {
            Some(today)
        } else {
            today.pred_opt()
        }
    }

    fn done_for(&self, date: NaiveDate) -> bool {
        self.last_run.is_some_and(|last| last >= date)
    }
}

/// The cutoff on `date` as an instant; `None` when it falls in a DST gap
fn cutoff_instant(date: NaiveDate, cutoff: NaiveTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&date.and_time(cutoff))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Direction;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
    }

    fn setup() -> (tempfile::TempDir, Store, IdleSessionSweeper) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("access_log.db")).unwrap();
        let cutoff = NaiveTime::from_hms_opt(23, 59, 0).unwrap();
        let sweeper = IdleSessionSweeper::load(store.clone(), cutoff).unwrap();
        (dir, store, sweeper)
    }

    #[test]
    fn closes_open_session_after_cutoff() {
        let (_dir, store, mut sweeper) = setup();
        let user = store.add_user("F637CF05", "Soma Taniguchi").unwrap();
        store
            .insert_record(user.id, Direction::Entry, local(2026, 3, 10, 9, 0).with_timezone(&Utc))
            .unwrap();

        let outcome = sweeper.run_if_due(local(2026, 3, 10, 23, 59), false).unwrap();

        let SweepOutcome::Ran(report) = outcome else {
            panic!("expected sweep to run, got {outcome:?}");
        };
        assert_eq!(report.closed.len(), 1);
        assert_eq!(report.failures, 0);
        assert_eq!(report.closed[0].1.direction, Direction::Exit);

        let records = store.records_for(user.id).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].direction, Direction::Exit);
        assert!(store.present_users().unwrap().is_empty());
    }

    #[test]
    fn sweep_is_idempotent_per_date() {
        let (_dir, store, mut sweeper) = setup();
        let user = store.add_user("F637CF05", "Soma Taniguchi").unwrap();
        store
            .insert_record(user.id, Direction::Entry, local(2026, 3, 10, 9, 0).with_timezone(&Utc))
            .unwrap();

        sweeper.run_if_due(local(2026, 3, 10, 23, 59), false).unwrap();

        // Re-entry after the sweep stays open for the rest of the day
        store
            .insert_record(user.id, Direction::Entry, local(2026, 3, 10, 23, 59).with_timezone(&Utc))
            .unwrap();
        let again = sweeper.run_if_due(local(2026, 3, 10, 23, 59), true).unwrap();

        assert_eq!(again, SweepOutcome::AlreadyDone(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()));
        assert_eq!(store.records_for(user.id).unwrap().len(), 3);
        assert!(!sweeper.is_due(local(2026, 3, 10, 23, 59)));
    }

    fn swept_through(store: &Store, date: NaiveDate) -> IdleSessionSweeper {
        store.mark_sweep(date, Utc::now()).unwrap();
        IdleSessionSweeper::load(store.clone(), NaiveTime::from_hms_opt(23, 59, 0).unwrap())
            .unwrap()
    }

    #[test]
    fn not_due_before_cutoff() {
        let (_dir, store, _) = setup();
        let march_9 = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let mut sweeper = swept_through(&store, march_9);
        let user = store.add_user("F637CF05", "Soma Taniguchi").unwrap();
        store
            .insert_record(user.id, Direction::Entry, local(2026, 3, 10, 9, 0).with_timezone(&Utc))
            .unwrap();

        assert!(!sweeper.is_due(local(2026, 3, 10, 18, 0)));
        let outcome = sweeper.run_if_due(local(2026, 3, 10, 18, 0), false).unwrap();

        assert_eq!(outcome, SweepOutcome::NotDue);
        assert_eq!(store.records_for(user.id).unwrap().len(), 1);
        assert_eq!(sweeper.last_run(), Some(march_9));
    }

    #[test]
    fn missed_cutoff_is_caught_up_next_morning() {
        let (_dir, store, _) = setup();
        let mut sweeper = swept_through(&store, NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
        let user = store.add_user("F637CF05", "Soma Taniguchi").unwrap();
        store
            .insert_record(user.id, Direction::Entry, local(2026, 3, 10, 9, 0).with_timezone(&Utc))
            .unwrap();

        // Logger was down over the Mar 10 cutoff
        assert!(sweeper.is_due(local(2026, 3, 11, 0, 1)));
        let outcome = sweeper.run_if_due(local(2026, 3, 11, 0, 1), false).unwrap();

        let SweepOutcome::Ran(report) = outcome else {
            panic!("expected catch-up sweep, got {outcome:?}");
        };
        let march_10 = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert_eq!(report.date, march_10);
        assert_eq!(report.closed.len(), 1);
        assert_eq!(sweeper.last_run(), Some(march_10));

        // Later ticks that morning wait for today's cutoff
        let outcome = sweeper.run_if_due(local(2026, 3, 11, 6, 1), false).unwrap();
        assert_eq!(outcome, SweepOutcome::NotDue);

        let record = store
            .record_toggle(user.id, local(2026, 3, 11, 9, 5).with_timezone(&Utc))
            .unwrap();
        assert_eq!(record.direction, Direction::Entry);
    }

    #[test]
    fn catch_up_leaves_sessions_opened_after_that_cutoff() {
        let (_dir, store, _) = setup();
        let mut sweeper = swept_through(&store, NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
        let user = store.add_user("F637CF05", "Soma Taniguchi").unwrap();
        store
            .insert_record(user.id, Direction::Entry, local(2026, 3, 11, 0, 30).with_timezone(&Utc))
            .unwrap();

        let outcome = sweeper.run_if_due(local(2026, 3, 11, 1, 0), false).unwrap();

        assert!(matches!(outcome, SweepOutcome::Ran(ref report) if report.closed.is_empty()));
        assert_eq!(
            store.last_record_for(user.id).unwrap().map(|r| r.direction),
            Some(Direction::Entry)
        );
    }

    #[test]
    fn forced_sweep_ignores_time_of_day() {
        let (_dir, store, mut sweeper) = setup();
        let user = store.add_user("F637CF05", "Soma Taniguchi").unwrap();
        store
            .insert_record(user.id, Direction::Entry, local(2026, 3, 10, 9, 0).with_timezone(&Utc))
            .unwrap();

        let outcome = sweeper.run_if_due(local(2026, 3, 10, 18, 0), true).unwrap();

        assert!(matches!(outcome, SweepOutcome::Ran(ref report) if report.closed.len() == 1));
        assert_eq!(
            sweeper.last_run(),
            Some(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap())
        );
    }

    #[test]
    fn closed_sessions_are_untouched() {
        let (_dir, store, mut sweeper) = setup();
        let user = store.add_user("F637CF05", "Soma Taniguchi").unwrap();
        store
            .insert_record(user.id, Direction::Entry, local(2026, 3, 10, 9, 0).with_timezone(&Utc))
            .unwrap();
        store
            .insert_record(user.id, Direction::Exit, local(2026, 3, 10, 17, 0).with_timezone(&Utc))
            .unwrap();

        let outcome = sweeper.run_if_due(local(2026, 3, 10, 23, 59), false).unwrap();

        assert!(matches!(outcome, SweepOutcome::Ran(ref report) if report.closed.is_empty()));
        assert_eq!(store.records_for(user.id).unwrap().len(), 2);
    }

    #[test]
    fn ledger_survives_reload() {
        let (_dir, store, mut sweeper) = setup();
        sweeper.run_if_due(local(2026, 3, 10, 23, 59), false).unwrap();

        let cutoff = NaiveTime::from_hms_opt(23, 59, 0).unwrap();
        let reloaded = IdleSessionSweeper::load(store.clone(), cutoff).unwrap();

        assert_eq!(
            reloaded.last_run(),
            Some(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap())
        );
        assert!(!reloaded.is_due(local(2026, 3, 10, 23, 59)));
        assert!(reloaded.is_due(local(2026, 3, 11, 23, 59)));
    }

    #[test]
    fn sees_sweeps_marked_by_other_instances() {
        let (_dir, store, mut sweeper) = setup();
        let cutoff = NaiveTime::from_hms_opt(23, 59, 0).unwrap();
        let mut other = IdleSessionSweeper::load(store.clone(), cutoff).unwrap();

        other.run_if_due(local(2026, 3, 10, 23, 59), false).unwrap();
        let outcome = sweeper.run_if_due(local(2026, 3, 10, 23, 59), false).unwrap();

        assert!(matches!(outcome, SweepOutcome::AlreadyDone(_)));
    }
}
