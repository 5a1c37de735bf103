//! Checkpoint history entries.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::LoadId;

/// One successful bronze-to-silver merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkpoint {
    /// Highest bronze load id merged by this run.
    pub load_id: LoadId,
    /// Rows handed to the merge (after sanitizing and deduplication).
    pub loaded_rows: i64,
    /// Unset for history written before the column existed.
    pub loaded_at: Option<DateTime<Utc>>,
}
