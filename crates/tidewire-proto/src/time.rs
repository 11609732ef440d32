//! Timestamp formatting for the wire contract.
//!
//! Every event carries a UTC ISO-8601 timestamp with millisecond precision
//! and a `Z` suffix, e.g. `2026-01-01T00:00:00.000Z`.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a wall-clock instant the way every event carries it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp produced by [`format_timestamp`]. `None` if malformed.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text).ok().map(|at| at.with_timezone(&Utc))
}
