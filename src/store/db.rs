//! SQLite persistence for users and access records.
//!
//! The store is the only writer of access records. Every read-then-write on a
//! user's record sequence runs inside a `BEGIN IMMEDIATE` transaction, which
//! takes the database write lock before the read; two resolutions for the same
//! user therefore can never both see the same "last record".

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};
use std::path::{Path, PathBuf};

use super::models::{AccessRecord, Direction, User, decode_timestamp, encode_timestamp};
use crate::error::PersistenceError;

type Result<T> = std::result::Result<T, PersistenceError>;

/// How long a writer waits for the lock before reporting a conflict
const BUSY_TIMEOUT_MS: i64 = 5000;

/// Handle to the access log database. Cheap to clone; each operation opens
/// its own connection.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

/// Raw columns of an access_records row, converted outside the rusqlite closure
type RecordRow = (i64, i64, String, String);

impl Store {
    /// Open (creating if needed) the database at `path` and migrate the schema
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        self.with_connection(|conn| user_by_identifier(conn, identifier))
    }

    /// Provision a new badge holder
    pub fn add_user(&self, identifier: &str, name: &str) -> Result<User> {
        self.with_connection(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (identifier, name) VALUES (?1, ?2)",
                params![identifier, name],
            );

            match inserted {
                Ok(_) => Ok(User {
                    id: conn.last_insert_rowid(),
                    identifier: identifier.to_string(),
                    name: name.to_string(),
                }),
                Err(err)
                    if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) =>
                {
                    Err(PersistenceError::DuplicateIdentifier(identifier.to_string()))
                }
                Err(err) => Err(PersistenceError::from_sqlite("inserting user", err)),
            }
        })
    }

    /// Change a holder's display name
    pub fn rename_user(&self, identifier: &str, name: &str) -> Result<User> {
        self.with_connection(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET name = ?2 WHERE identifier = ?1",
                    params![identifier, name],
                )
                .map_err(|err| PersistenceError::from_sqlite("renaming user", err))?;

            if changed == 0 {
                return Err(PersistenceError::UnknownIdentifier(identifier.to_string()));
            }

            user_by_identifier(conn, identifier)?
                .ok_or_else(|| PersistenceError::UnknownIdentifier(identifier.to_string()))
        })
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, identifier, name FROM users ORDER BY id ASC")
                .map_err(|err| PersistenceError::from_sqlite("preparing user list", err))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(User {
                        id: row.get(0)?,
                        identifier: row.get(1)?,
                        name: row.get(2)?,
                    })
                })
                .map_err(|err| PersistenceError::from_sqlite("listing users", err))?;

            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| PersistenceError::from_sqlite("decoding user row", err))
        })
    }

    /// Insert the given users if the users table is empty.
    ///
    /// Returns how many users were created.
    pub fn seed_users<'a>(
        &self,
        seeds: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<usize> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| PersistenceError::from_sqlite("starting seed transaction", err))?;

            let existing: i64 = tx
                .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                .map_err(|err| PersistenceError::from_sqlite("counting users", err))?;
            if existing > 0 {
                return Ok(0);
            }

            let mut created = 0;
            for (identifier, name) in seeds {
                created += tx
                    .execute(
                        "INSERT OR IGNORE INTO users (identifier, name) VALUES (?1, ?2)",
                        params![identifier, name],
                    )
                    .map_err(|err| PersistenceError::from_sqlite("seeding user", err))?;
            }

            tx.commit()
                .map_err(|err| PersistenceError::from_sqlite("committing seed users", err))?;
            Ok(created)
        })
    }

    /// Most recent record for a user, by timestamp then insertion order
    pub fn last_record_for(&self, user_id: i64) -> Result<Option<AccessRecord>> {
        self.with_connection(|conn| last_record_in(conn, user_id))
    }

    /// Append a record with an explicit direction, skipping alternation.
    ///
    /// Fixture helper; live taps go through [`Store::record_toggle`].
    #[cfg(test)]
    pub fn insert_record(
        &self,
        user_id: i64,
        direction: Direction,
        timestamp: DateTime<Utc>,
    ) -> Result<AccessRecord> {
        self.in_write_transaction("inserting access record", |tx| {
            ensure_user_exists(tx, user_id)?;
            insert_record_in(tx, user_id, direction, timestamp)
        })
    }

    /// Atomically append the complement of the user's last direction.
    ///
    /// No prior record means Entry. The new timestamp is never earlier than
    /// the previous record's.
    pub fn record_toggle(&self, user_id: i64, now: DateTime<Utc>) -> Result<AccessRecord> {
        self.in_write_transaction("recording access toggle", |tx| {
            ensure_user_exists(tx, user_id)?;
            let last = last_record_in(tx, user_id)?;
            let direction = Direction::following(last.as_ref().map(|r| r.direction));
            let timestamp = clamp_after(last.as_ref(), now);
            insert_record_in(tx, user_id, direction, timestamp)
        })
    }

    /// Atomically close an open session left over from before `entered_before`.
    ///
    /// Returns the forced Exit, or `None` when the user's last record is not an
    /// Entry older than the cutoff (already closed, or entered after it).
    pub fn force_exit(
        &self,
        user_id: i64,
        entered_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessRecord>> {
        self.in_write_transaction("forcing exit", |tx| {
            let last = match last_record_in(tx, user_id)? {
                Some(last) if last.direction == Direction::Entry && last.timestamp < entered_before => {
                    last
                }
                _ => return Ok(None),
            };

            let timestamp = clamp_after(Some(&last), now);
            insert_record_in(tx, user_id, Direction::Exit, timestamp).map(Some)
        })
    }

    /// Users whose most recent record is an Entry, with that record
    pub fn present_users(&self) -> Result<Vec<(User, AccessRecord)>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT u.id, u.identifier, u.name, r.id, r.user_id, r.timestamp, r.direction \
                     FROM users u \
                     JOIN access_records r ON r.id = ( \
                        SELECT id FROM access_records WHERE user_id = u.id \
                        ORDER BY timestamp DESC, id DESC LIMIT 1) \
                     WHERE r.direction = 'entry' \
                     ORDER BY u.id ASC",
                )
                .map_err(|err| PersistenceError::from_sqlite("preparing present users query", err))?;

            let rows = stmt
                .query_map([], user_and_record_row)
                .map_err(|err| PersistenceError::from_sqlite("querying present users", err))?;

            collect_user_records(rows)
        })
    }

    /// All records for a user in chronological order
    pub fn records_for(&self, user_id: i64) -> Result<Vec<AccessRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, timestamp, direction FROM access_records \
                     WHERE user_id = ?1 ORDER BY timestamp ASC, id ASC",
                )
                .map_err(|err| PersistenceError::from_sqlite("preparing records query", err))?;

            let rows = stmt
                .query_map(params![user_id], record_row)
                .map_err(|err| PersistenceError::from_sqlite("querying records", err))?;

            let mut records = Vec::new();
            for row in rows {
                let row = row.map_err(|err| PersistenceError::from_sqlite("decoding record row", err))?;
                records.push(record_from_row(row)?);
            }
            Ok(records)
        })
    }

    /// Newest records across all users, newest first
    pub fn recent_records(&self, limit: usize) -> Result<Vec<(User, AccessRecord)>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT u.id, u.identifier, u.name, r.id, r.user_id, r.timestamp, r.direction \
                     FROM access_records r JOIN users u ON u.id = r.user_id \
                     ORDER BY r.timestamp DESC, r.id DESC LIMIT ?1",
                )
                .map_err(|err| PersistenceError::from_sqlite("preparing history query", err))?;

            let rows = stmt
                .query_map(params![limit as i64], user_and_record_row)
                .map_err(|err| PersistenceError::from_sqlite("querying history", err))?;

            collect_user_records(rows)
        })
    }

    pub fn record_count(&self) -> Result<i64> {
        self.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM access_records", [], |row| row.get(0))
                .map_err(|err| PersistenceError::from_sqlite("counting records", err))
        })
    }

    /// Local date of the most recent completed daily sweep
    pub fn last_sweep_date(&self) -> Result<Option<NaiveDate>> {
        self.with_connection(|conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT run_date FROM sweep_runs ORDER BY run_date DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| PersistenceError::from_sqlite("reading last sweep date", err))?;

            value
                .map(|raw| {
                    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|err| {
                        PersistenceError::Corrupt {
                            table: "sweep_runs",
                            details: format!("bad run_date '{}': {}", raw, err),
                        }
                    })
                })
                .transpose()
        })
    }

    pub fn mark_sweep(&self, date: NaiveDate, completed_at: DateTime<Utc>) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO sweep_runs (run_date, completed_at) VALUES (?1, ?2) \
                 ON CONFLICT(run_date) DO UPDATE SET completed_at = excluded.completed_at",
                params![date.format("%Y-%m-%d").to_string(), encode_timestamp(completed_at)],
            )
            .map_err(|err| PersistenceError::from_sqlite("recording sweep run", err))?;
            Ok(())
        })
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    identifier TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS access_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    direction TEXT NOT NULL CHECK (direction IN ('entry', 'exit'))
                 );
                 CREATE INDEX IF NOT EXISTS idx_access_records_user_latest
                    ON access_records (user_id, timestamp DESC, id DESC);
                 CREATE TABLE IF NOT EXISTS sweep_runs (
                    run_date TEXT PRIMARY KEY,
                    completed_at TEXT NOT NULL
                 );
                 COMMIT;",
            )
            .map_err(|err| PersistenceError::from_sqlite("initializing schema", err))
        })
    }

    fn in_write_transaction<T>(
        &self,
        context: &'static str,
        op: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| PersistenceError::from_sqlite(context, err))?;
            let value = op(&tx)?;
            tx.commit()
                .map_err(|err| PersistenceError::from_sqlite(context, err))?;
            Ok(value)
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.open_connection()?;
        op(&mut conn)
    }

    fn open_connection(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags).map_err(|source| {
            PersistenceError::Open {
                path: self.path.clone(),
                source,
            }
        })?;

        // busy_timeout first: the remaining pragmas may need the lock
        conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
            .map_err(|err| PersistenceError::from_sqlite("setting busy_timeout", err))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| PersistenceError::from_sqlite("enabling WAL", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| PersistenceError::from_sqlite("setting synchronous", err))?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|err| PersistenceError::from_sqlite("enabling foreign keys", err))?;

        Ok(conn)
    }
}

fn user_by_identifier(conn: &Connection, identifier: &str) -> Result<Option<User>> {
    conn.query_row(
        "SELECT id, identifier, name FROM users WHERE identifier = ?1",
        params![identifier],
        |row| {
            Ok(User {
                id: row.get(0)?,
                identifier: row.get(1)?,
                name: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|err| PersistenceError::from_sqlite("looking up user by identifier", err))
}

fn ensure_user_exists(conn: &Connection, user_id: i64) -> Result<()> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM users WHERE id = ?1", params![user_id], |row| row.get(0))
        .optional()
        .map_err(|err| PersistenceError::from_sqlite("checking user exists", err))?;

    match found {
        Some(_) => Ok(()),
        None => Err(PersistenceError::UnknownUser(user_id)),
    }
}

fn last_record_in(conn: &Connection, user_id: i64) -> Result<Option<AccessRecord>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, timestamp, direction FROM access_records \
             WHERE user_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1",
            params![user_id],
            record_row,
        )
        .optional()
        .map_err(|err| PersistenceError::from_sqlite("reading last record", err))?;

    row.map(record_from_row).transpose()
}

fn insert_record_in(
    conn: &Connection,
    user_id: i64,
    direction: Direction,
    timestamp: DateTime<Utc>,
) -> Result<AccessRecord> {
    // Stored with microsecond precision; return what a later read will see
    let timestamp = timestamp.trunc_subsecs(6);
    conn.execute(
        "INSERT INTO access_records (user_id, timestamp, direction) VALUES (?1, ?2, ?3)",
        params![user_id, encode_timestamp(timestamp), direction.as_db_str()],
    )
    .map_err(|err| PersistenceError::from_sqlite("inserting access record", err))?;

    Ok(AccessRecord {
        id: conn.last_insert_rowid(),
        user_id,
        timestamp,
        direction,
    })
}

/// Keep per-user timestamps non-decreasing even if the wall clock steps back
fn clamp_after(last: Option<&AccessRecord>, now: DateTime<Utc>) -> DateTime<Utc> {
    match last {
        Some(last) if last.timestamp > now => last.timestamp,
        _ => now,
    }
}

fn record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn user_and_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(User, RecordRow)> {
    Ok((
        User {
            id: row.get(0)?,
            identifier: row.get(1)?,
            name: row.get(2)?,
        },
        (row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?),
    ))
}

fn collect_user_records(
    rows: impl Iterator<Item = rusqlite::Result<(User, RecordRow)>>,
) -> Result<Vec<(User, AccessRecord)>> {
    let mut out = Vec::new();
    for row in rows {
        let (user, raw) = row.map_err(|err| PersistenceError::from_sqlite("decoding record row", err))?;
        out.push((user, record_from_row(raw)?));
    }
    Ok(out)
}

fn record_from_row((id, user_id, timestamp, direction): RecordRow) -> Result<AccessRecord> {
    let timestamp = decode_timestamp(&timestamp).ok_or_else(|| PersistenceError::Corrupt {
        table: "access_records",
        details: format!("record {} has unparseable timestamp '{}'", id, timestamp),
    })?;
    let direction = direction
        .parse::<Direction>()
        .map_err(|details| PersistenceError::Corrupt {
            table: "access_records",
            details,
        })?;

    Ok(AccessRecord {
        id,
        user_id,
        timestamp,
        direction,
    })
}
