//! UTC timestamps for context snapshots.

use chrono::{DateTime, SecondsFormat, Utc};

/// A UTC point in time.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as RFC 3339 with microseconds and a `Z` suffix.
#[must_use]
pub fn format_iso8601(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Returns the current UTC time formatted by [`format_iso8601`].
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&now_utc())
}
