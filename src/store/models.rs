use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A badge holder, keyed by the identifier the card hardware reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub identifier: String,
    pub name: String,
}

/// Whether a record marks the holder arriving or leaving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    /// The opposite direction
    pub fn complement(self) -> Self {
        match self {
            Direction::Entry => Direction::Exit,
            Direction::Exit => Direction::Entry,
        }
    }

    /// Direction of the record that follows `last` for the same user.
    ///
    /// A user with no records starts with an Entry.
    pub fn following(last: Option<Direction>) -> Self {
        last.map(Direction::complement).unwrap_or(Direction::Entry)
    }

    /// Value stored in the `direction` column
    pub fn as_db_str(self) -> &'static str {
        match self {
            Direction::Entry => "entry",
            Direction::Exit => "exit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Entry => write!(f, "Entry"),
            Direction::Exit => write!(f, "Exit"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entry" => Ok(Direction::Entry),
            "exit" => Ok(Direction::Exit),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// One immutable entry/exit event for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub id: i64,
    pub user_id: i64,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
}

/// Encode a timestamp so that text ordering matches time ordering
pub(crate) fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalize raw reader output into a card identifier.
///
/// Strips separators and whitespace and upper-cases the hex digits, so
/// "f6 37 cf 05" and "F6:37:CF:05" both become "F637CF05".
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn following_starts_with_entry() {
        assert_eq!(Direction::following(None), Direction::Entry);
    }

    #[test]
    fn following_alternates() {
        assert_eq!(Direction::following(Some(Direction::Entry)), Direction::Exit);
        assert_eq!(Direction::following(Some(Direction::Exit)), Direction::Entry);
    }

    #[test]
    fn direction_parses_db_values() {
        assert_eq!("entry".parse::<Direction>().unwrap(), Direction::Entry);
        assert_eq!("EXIT".parse::<Direction>().unwrap(), Direction::Exit);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert!(encode_timestamp(earlier) < encode_timestamp(later));
        assert_eq!(decode_timestamp(&encode_timestamp(later)), Some(later));
    }

    #[test]
    fn normalize_identifier_accepts_reader_formats() {
        assert_eq!(normalize_identifier("f6 37 cf 05\n").as_deref(), Some("F637CF05"));
        assert_eq!(normalize_identifier("F6:37:CF:05").as_deref(), Some("F637CF05"));
        assert_eq!(normalize_identifier("00000000").as_deref(), Some("00000000"));
    }

    #[test]
    fn normalize_identifier_rejects_garbage() {
        assert_eq!(normalize_identifier(""), None);
        assert_eq!(normalize_identifier("   "), None);
        assert_eq!(normalize_identifier("not-a-card"), None);
    }
}
