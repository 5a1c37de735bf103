//! Load identifiers: the batch watermark shared by all rows of one ingest.
//!
//! Upstream writes identifiers as numeric strings (`"1713601219.3070812"`).
//! They must be ordered by value, so `"10"` sorts after `"9"`, while the
//! original text is preserved for storage and display.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid load id {0:?}: expected a non-negative decimal number")]
pub struct LoadIdError(pub String);

/// A non-negative decimal load identifier.
#[derive(Debug, Clone)]
pub struct LoadId {
    raw: String,
}

impl LoadId {
    /// The identifier every real load id compares greater than or equal to.
    pub fn min() -> Self {
        Self {
            raw: "0".to_string(),
        }
    }

    /// Build the load id for a batch ingested at `at`.
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        let tenths_of_micros = at.timestamp_subsec_nanos() / 100;
        Self {
            raw: format!("{}.{:07}", at.timestamp(), tenths_of_micros),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_min(&self) -> bool {
        *self == Self::min()
    }

    /// Integer digits without leading zeros and fraction digits without
    /// trailing zeros. Two ids are equal exactly when their parts are equal.
    fn parts(&self) -> (&str, &str) {
        let (int, frac) = self.raw.split_once('.').unwrap_or((&self.raw, ""));
        (int.trim_start_matches('0'), frac.trim_end_matches('0'))
    }
}

impl Default for LoadId {
    fn default() -> Self {
        Self::min()
    }
}

impl FromStr for LoadId {
    type Err = LoadIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (int, frac) = text.split_once('.').unwrap_or((text, ""));
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());

        let valid = !int.is_empty()
            && digits(int)
            && digits(frac)
            && !(text.contains('.') && frac.is_empty());
        if !valid {
            return Err(LoadIdError(s.to_string()));
        }
        Ok(Self {
            raw: text.to_string(),
        })
    }
}

impl Ord for LoadId {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a_int, a_frac) = self.parts();
        let (b_int, b_frac) = other.parts();
        a_int
            .len()
            .cmp(&b_int.len())
            .then_with(|| a_int.cmp(b_int))
            .then_with(|| a_frac.cmp(b_frac))
    }
}

impl PartialOrd for LoadId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LoadId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LoadId {}

impl Hash for LoadId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts().hash(state);
    }
}

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for LoadId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}
