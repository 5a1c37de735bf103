//! Silver-to-gold export.

use tracing::info;

use crate::config::ExportConfig;
use crate::repository::{GoldStore, Result, SilverStore};

/// Outcome of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    /// Silver rows read.
    pub exported: usize,
    /// Gold rows after the merge.
    pub gold_rows: i64,
}

/// Merge the whole silver table into gold. Matching keys take the silver
/// values; new keys are inserted.
pub fn export(config: &ExportConfig) -> Result<ExportSummary> {
    let silver = SilverStore::open_read_only(
        &config.source_db,
        &config.source_schema,
        &config.source_table,
        config.busy_timeout,
    )?;
    let rows = silver.read_all()?;
    info!(
        "Read {} rows from {}.{}",
        rows.len(),
        config.source_schema,
        config.source_table
    );

    let mut gold = GoldStore::open(
        &config.target_db,
        &config.target_schema,
        &config.target_table,
        config.busy_timeout,
        config.retry,
    )?;
    gold.merge(&rows)?;

    Ok(ExportSummary {
        exported: rows.len(),
        gold_rows: gold.row_count()?,
    })
}
