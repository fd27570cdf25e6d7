//! Error types for the access logger.
//!
//! An unrecognized card is not an error: it is one of the outcomes of
//! resolution (see `engine::Resolution`). Everything here is either logged
//! inside the long-running loops or, for configuration, fatal at startup.

use std::path::PathBuf;

/// Failures from the card reader capability.
///
/// The reader loop logs these and treats the cycle as "no card present".
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("card reader unavailable: {0}")]
    Unavailable(String),

    #[error("failed to start reader command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("reader returned a malformed identifier: {0:?}")]
    Malformed(String),

    #[error("reader I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures from the persistent store.
///
/// A resolution that hits one of these is abandoned; the holder taps again.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to open database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database is locked by a concurrent writer while {context}")]
    Conflict { context: &'static str },

    #[error("database error while {context}: {source}")]
    Query {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("a user with identifier {0} already exists")]
    DuplicateIdentifier(String),

    #[error("no user with identifier {0}")]
    UnknownIdentifier(String),

    #[error("no user with id {0}")]
    UnknownUser(i64),

    #[error("corrupt row in {table}: {details}")]
    Corrupt { table: &'static str, details: String },

    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistenceError {
    /// Classify a rusqlite error, separating lock contention from other failures.
    pub fn from_sqlite(context: &'static str, source: rusqlite::Error) -> Self {
        match source.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                PersistenceError::Conflict { context }
            }
            _ => PersistenceError::Query { context, source },
        }
    }
}

/// Failures delivering a notification. Logged and dropped, never retried.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("webhook transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook rejected notification ({status}): {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Startup configuration failures. These stop the process before the core starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required secret '{0}' is not set (config [secrets] or {1})")]
    MissingSecret(&'static str, &'static str),

    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
