//! Parser for the signed ISO-8601 durations used by the delay field.
//!
//! Upstream reports delays such as `-P0Y0M0DT0H3M20.000S`. The parser accepts
//! the full `[-]P{Y}Y{M}M{D}DT{H}H{M}M{S}.{f}S` shape, with every component
//! optional, and returns whole seconds truncated toward zero.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.(\d+))?S)?)?$",
    )
    .unwrap()
});

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("malformed duration: {0:?}")]
    Malformed(String),
    /// Years and months have no fixed length in seconds.
    #[error("duration {0:?} uses years or months, which are not supported")]
    UnsupportedCalendarUnit(String),
    #[error("duration {0:?} does not fit in 64-bit seconds")]
    Overflow(String),
}

/// Parse a delay duration into signed whole seconds.
///
/// Fractional seconds are discarded, so `P0Y0M0DT0H10M21.900S` is `621` and
/// `-P0Y0M0DT0H0M0.500S` is `0`.
pub fn parse_delay(input: &str) -> Result<i64, DurationParseError> {
    let text = input.trim();
    let caps = DURATION_PATTERN
        .captures(text)
        .ok_or_else(|| DurationParseError::Malformed(input.to_string()))?;

    // "P", "-P" and a dangling "T" all match the pattern but carry no value.
    let has_component = (2..=7).any(|i| caps.get(i).is_some());
    if !has_component || text.ends_with('T') {
        return Err(DurationParseError::Malformed(input.to_string()));
    }

    let number = |i: usize| -> Result<i64, DurationParseError> {
        match caps.get(i) {
            Some(m) => m
                .as_str()
                .parse::<i64>()
                .map_err(|_| DurationParseError::Overflow(input.to_string())),
            None => Ok(0),
        }
    };

    if number(2)? != 0 || number(3)? != 0 {
        return Err(DurationParseError::UnsupportedCalendarUnit(
            input.to_string(),
        ));
    }

    let (days, hours, minutes, seconds) = (number(4)?, number(5)?, number(6)?, number(7)?);
    let magnitude = days
        .checked_mul(SECONDS_PER_DAY)
        .and_then(|s| s.checked_add(hours.checked_mul(SECONDS_PER_HOUR)?))
        .and_then(|s| s.checked_add(minutes.checked_mul(SECONDS_PER_MINUTE)?))
        .and_then(|s| s.checked_add(seconds))
        .ok_or_else(|| DurationParseError::Overflow(input.to_string()))?;

    if caps.get(1).is_some() {
        Ok(-magnitude)
    } else {
        Ok(magnitude)
    }
}
