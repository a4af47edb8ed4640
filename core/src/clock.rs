//! Submission clock: the single source of timestamps for new records.

use crate::types::Timestamp;
use chrono::{Local, NaiveDateTime};

/// Mirror timestamp layout. Lexicographic order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionClock {
    /// Local wall clock.
    System,
    /// Frozen time, for tests and replays.
    Fixed(Timestamp),
}

impl SubmissionClock {
    pub fn now(&self) -> Timestamp {
        match self {
            Self::System => Local::now().naive_local(),
            Self::Fixed(ts) => *ts,
        }
    }
}

pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses the mirror layout, falling back to a bare `YYYY-MM-DD` date.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Converts an on-chain unix timestamp (seconds) to local naive time.
pub fn from_unix_seconds(secs: u64) -> Option<Timestamp> {
    let secs = i64::try_from(secs).ok()?;
    chrono::DateTime::from_timestamp(secs, 0).map(|dt| dt.with_timezone(&Local).naive_local())
}
