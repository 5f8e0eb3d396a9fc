//! Wall clock and date-string helpers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Current wall clock, in seconds or milliseconds
pub fn now(in_ms: bool) -> u64 {
    let now = Utc::now();
    if in_ms {
        now.timestamp_millis().max(0) as u64
    } else {
        now.timestamp().max(0) as u64
    }
}

/// Parse a date string into UTC seconds.
///
/// Accepts RFC 3339, `YYYY-MM-DD[ T]HH:MM[:SS]`, `YYYY-MM-DD` and plain
/// decimal integers (taken as already being a timestamp).
pub fn parse_date(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return non_negative(dt.timestamp());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return non_negative(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|dt| non_negative(dt.and_utc().timestamp()))
}

/// Convert a record time (seconds or ms) to a UTC datetime
pub fn to_datetime(t: u64, in_ms: bool) -> DateTime<Utc> {
    let secs = if in_ms { t / 1000 } else { t };
    DateTime::from_timestamp(secs as i64, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn non_negative(ts: i64) -> Option<u64> {
    u64::try_from(ts).ok()
}
