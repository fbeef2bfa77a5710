//! UTC timestamp helpers for audit fields and output file names.
//!
//! Audit timestamps are fixed-precision ISO-8601 with a trailing `Z`
//! (`2024-03-01T10:22:33.000123Z`), so lexical and chronological order agree.

use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

/// Format an instant as an audit timestamp (microsecond precision, UTC).
pub fn format_utc(ts: OffsetDateTime) -> String {
    let utc = ts.to_offset(time::UtcOffset::UTC);
    match utc.format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
    )) {
        Ok(s) => s,
        Err(_) => utc.to_string(),
    }
}

/// Parse an audit timestamp back into an instant. Returns `None` for anything
/// that is not in the fixed audit format.
pub fn parse_utc(s: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(
        s.trim(),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"),
    )
    .ok()
    .map(|dt| dt.assume_utc())
}

/// Audit timestamp for a mutation that happens at `now` on a record last
/// touched at `prior`. The result is strictly later than `prior` even when the
/// stored value is ahead of the local clock.
pub fn stamp_after(prior: &str, now: OffsetDateTime) -> String {
    match parse_utc(prior) {
        Some(prev) if prev >= now => format_utc(prev + Duration::microseconds(1)),
        _ => format_utc(now),
    }
}

/// Compact `YYYYMMDDHHMMSS` stamp used in output file names.
pub fn file_stamp(now: OffsetDateTime) -> String {
    let utc = now.to_offset(time::UtcOffset::UTC);
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        utc.year(),
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second()
    )
}
