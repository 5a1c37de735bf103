//! Time-of-day and timestamp parsing for upstream text fields.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockParseError {
    #[error("expected a 4-digit HHMM time, got {0:?}")]
    InvalidHhmm(String),
    #[error("unrecognised timestamp {0:?}")]
    InvalidTimestamp(String),
}

/// Naive timestamp layouts accepted when no UTC offset is present.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a compact `HHMM` time such as `"2240"` into 22:40.
pub fn parse_hhmm(input: &str) -> Result<NaiveTime, ClockParseError> {
    let text = input.trim();
    let invalid = || ClockParseError::InvalidHhmm(input.to_string());

    if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hour: u32 = text[..2].parse().map_err(|_| invalid())?;
    let minute: u32 = text[2..].parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Parse the recorded-at timestamp of an observation.
///
/// Values carrying an offset (`2024-04-20T11:20:19.3+03:00`) are converted to
/// UTC; naive values are taken as already being in UTC.
pub fn parse_recorded_at(input: &str) -> Result<NaiveDateTime, ClockParseError> {
    let text = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc).naive_utc());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .ok_or_else(|| ClockParseError::InvalidTimestamp(input.to_string()))
}

/// Split a timestamp into its calendar date and time-of-day.
pub fn split_timestamp(ts: NaiveDateTime) -> (NaiveDate, NaiveTime) {
    (ts.date(), ts.time())
}

/// Storage text for a date column.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Storage text for a time column. Sub-second digits are kept only when present.
pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S%.f").to_string()
}

/// Parse a stored time column back into a `NaiveTime`.
pub fn parse_stored_time(text: &str) -> Result<NaiveTime, ClockParseError> {
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .map_err(|_| ClockParseError::InvalidTimestamp(text.to_string()))
}

/// Parse a stored date column back into a `NaiveDate`.
pub fn parse_stored_date(text: &str) -> Result<NaiveDate, ClockParseError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| ClockParseError::InvalidTimestamp(text.to_string()))
}
