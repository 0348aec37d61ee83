//! Core types for Chatstore
//!
//! Timestamps in the document are Unix epoch milliseconds, the format the
//! chat application writes. Backup names use second-resolution UTC stamps.

use chrono::{DateTime, TimeZone, Utc};

/// Milliseconds since the Unix epoch
pub type Millis = i64;

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Create a timestamp for the current moment
pub fn now() -> Timestamp {
    Utc::now()
}

/// Current wall clock in epoch milliseconds
pub fn now_millis() -> Millis {
    Utc::now().timestamp_millis()
}

/// Next value for a monotonically increasing stamp.
///
/// Never returns a value `<= previous`, even if the wall clock stepped back
/// or two stamps land in the same millisecond.
pub fn next_stamp(previous: Option<Millis>) -> Millis {
    let now = now_millis();
    match previous {
        Some(prev) if prev >= now => prev + 1,
        _ => now,
    }
}

/// `YYYYMMDDTHHMMSSZ`, used in backup file names
pub fn compact_utc(ts: Timestamp) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

/// ISO-8601 rendering of an epoch-millisecond value, `None` when out of range
pub fn iso_from_millis(ms: Millis) -> Option<String> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
}
