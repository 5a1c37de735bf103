//! Shared parsing and formatting helpers.
//!
//! - `duration`: ISO-8601 delay strings to signed seconds
//! - `clock`: HHMM times, upstream timestamps, and stored date/time text

mod clock;
mod duration;

pub use clock::{
    format_date, format_time, parse_hhmm, parse_recorded_at, parse_stored_date,
    parse_stored_time, split_timestamp, ClockParseError,
};
pub use duration::{parse_delay, DurationParseError};
