//! Best-effort notification of access events to an external channel.
//!
//! Events are rendered into a Discord-compatible embed payload and posted to
//! a webhook from a detached task. Delivery failures are logged and dropped;
//! nothing here can affect a persisted record or the caller's control flow.

mod dispatcher;
mod payload;
mod sink;
#[cfg(test)]
pub mod testing;

use chrono::{DateTime, Utc};

use crate::store::{AccessRecord, Direction, User};

pub use dispatcher::NotificationDispatcher;
pub use payload::WebhookPayload;
pub use sink::{NotificationSink, WebhookSink};

/// What happened at the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// A record with this direction was persisted
    Recorded(Direction),
    /// A card was presented but not accepted
    AccessAttempt,
}

/// Structured description of one access event
#[derive(Debug, Clone, PartialEq)]
pub struct AccessEvent {
    /// Display name of the holder; `None` for unknown cards
    pub actor: Option<String>,
    pub action: EventAction,
    pub success: bool,
    pub occurred_at: DateTime<Utc>,
    /// Extra named fields shown with the event
    pub details: Vec<(String, String)>,
}

pub const DETAIL_FORCED: &str = "Forced";
pub const DETAIL_CARD: &str = "Card";

impl AccessEvent {
    /// A tap that produced a record
    pub fn recorded(user: &User, record: &AccessRecord) -> Self {
        Self {
            actor: Some(user.name.clone()),
            action: EventAction::Recorded(record.direction),
            success: true,
            occurred_at: record.timestamp,
            details: Vec::new(),
        }
    }

    /// An Exit inserted by the daily sweep
    pub fn forced_exit(user: &User, record: &AccessRecord) -> Self {
        let mut event = Self::recorded(user, record);
        event.details.push((DETAIL_FORCED.to_string(), "true".to_string()));
        event
    }

    /// A card with no matching user
    pub fn unrecognized(identifier: &str, occurred_at: DateTime<Utc>) -> Self {
        Self {
            actor: None,
            action: EventAction::AccessAttempt,
            success: false,
            occurred_at,
            details: vec![(DETAIL_CARD.to_string(), identifier.to_string())],
        }
    }

    pub fn is_forced(&self) -> bool {
        self.details.iter().any(|(name, value)| name == DETAIL_FORCED && value == "true")
    }

    pub fn actor_name(&self) -> &str {
        self.actor.as_deref().unwrap_or("Unknown user")
    }

    pub fn action_label(&self) -> String {
        match self.action {
            EventAction::Recorded(direction) => direction.to_string(),
            EventAction::AccessAttempt => "Access attempt".to_string(),
        }
    }
}
