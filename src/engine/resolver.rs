use chrono::{DateTime, Utc};

use crate::error::PersistenceError;
use crate::notify::AccessEvent;
use crate::store::{AccessRecord, Store, User};

/// Outcome of resolving one accepted card observation
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Known holder; a new record was committed
    Recorded { user: User, record: AccessRecord },
    /// No holder has this identifier; nothing was written
    Unrecognized {
        identifier: String,
        at: DateTime<Utc>,
    },
}

impl Resolution {
    /// Notification describing this outcome
    pub fn event(&self) -> AccessEvent {
        match self {
            Resolution::Recorded { user, record } => AccessEvent::recorded(user, record),
            Resolution::Unrecognized { identifier, at } => AccessEvent::unrecognized(identifier, *at),
        }
    }
}

/// Maps a card identifier to its holder and toggles their entry/exit state
#[derive(Debug, Clone)]
pub struct AccessStateResolver {
    store: Store,
}

impl AccessStateResolver {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Resolve one accepted observation.
    ///
    /// The direction is computed and persisted in a single transaction. A
    /// persistence failure abandons the tap; the caller logs it and the holder
    /// taps again.
    pub fn resolve(&self, identifier: &str, now: DateTime<Utc>) -> Result<Resolution, PersistenceError> {
        let Some(user) = self.store.find_user_by_identifier(identifier)? else {
            tracing::warn!(identifier, "Unknown card detected");
            return Ok(Resolution::Unrecognized {
                identifier: identifier.to_string(),
                at: now,
            });
        };

        let record = self.store.record_toggle(user.id, now)?;
        tracing::info!(
            user = %user.name,
            identifier,
            direction = %record.direction,
            "Access recorded"
        );

        Ok(Resolution::Recorded { user, record })
    }
}
