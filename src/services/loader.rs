//! Incremental bronze-to-silver load.
//!
//! One run reads the silver checkpoint, fetches every bronze row from newer
//! loads, transforms them, and commits rows and the new checkpoint together.
//! Rerunning without new bronze data changes nothing.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use super::dedup::deduplicate;
use super::normalize::normalize;
use super::sanitize::drop_nulls;
use crate::config::SilverConfig;
use crate::models::{LoadId, PRIMARY_KEY};
use crate::repository::{BronzeReader, CommitOutcome, SilverStore, StoreError};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to open bronze table: {0}")]
    Source(#[source] StoreError),
    #[error("Failed to open silver table: {0}")]
    Target(#[source] StoreError),
    #[error("Failed to read new bronze rows: {0}")]
    Fetch(#[source] StoreError),
    #[error("Failed to read checkpoint: {0}")]
    Checkpoint(#[source] StoreError),
    #[error("Failed to commit merge: {0}")]
    Commit(#[source] StoreError),
}

impl LoaderError {
    /// The storage failure behind this error.
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::Source(e)
            | Self::Target(e)
            | Self::Fetch(e)
            | Self::Checkpoint(e)
            | Self::Commit(e) => e,
        }
    }
}

/// Counts and checkpoints of a run that merged data.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    /// Bronze rows in the delta.
    pub fetched: usize,
    pub normalized: usize,
    /// Rows removed for missing values.
    pub dropped: usize,
    /// Rows that took part in a key collision, winners included.
    pub duplicates: usize,
    /// Rows handed to the merge.
    pub merged: usize,
    /// Rows that were new to silver.
    pub inserted: usize,
    pub previous_checkpoint: LoadId,
    pub checkpoint: LoadId,
    pub reset: bool,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Bronze has nothing newer than the checkpoint, or an overlapping run
    /// already recorded it; silver is untouched.
    NoNewData { checkpoint: LoadId },
    Merged(LoadSummary),
}

/// Runs the bronze-to-silver load for one configuration.
pub struct IncrementalLoader<'a> {
    config: &'a SilverConfig,
}

impl<'a> IncrementalLoader<'a> {
    pub fn new(config: &'a SilverConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<LoadOutcome, LoaderError> {
        let config = self.config;

        let mut store = SilverStore::open(
            &config.target_db,
            &config.target_schema,
            &config.target_table,
            config.busy_timeout,
            config.retry,
        )
        .map_err(LoaderError::Target)?;
        store.ensure_tables().map_err(LoaderError::Target)?;

        let previous = store
            .get_last_checkpoint(config.reset_tables)
            .map_err(LoaderError::Checkpoint)?;
        if config.reset_tables {
            warn!(
                "Resetting {}.{}: existing rows and checkpoint history will be discarded",
                config.target_schema, config.target_table
            );
        }
        info!("Last checkpoint: {}", previous);

        let bronze = BronzeReader::open(
            &config.source_db,
            &config.source_schema,
            &config.source_table,
            config.busy_timeout,
        )
        .map_err(LoaderError::Source)?;
        let delta = bronze.get_new_rows(&previous).map_err(LoaderError::Fetch)?;

        // Taken before any row can be dropped, so discarded rows still
        // advance the checkpoint.
        let Some(checkpoint) = delta.iter().map(|r| &r.load_id).max().cloned() else {
            info!("No new data in bronze after {}", previous);
            return Ok(LoadOutcome::NoNewData {
                checkpoint: previous,
            });
        };

        let processed_at = Utc::now();
        let normalized = normalize(&delta, processed_at);
        let normalized_count = normalized.len();
        let sanitized = drop_nulls(normalized);
        let dropped = sanitized.dropped.len();
        let deduped = deduplicate(sanitized.kept, &PRIMARY_KEY);

        info!(
            "Transformed {} bronze rows: {} dropped, {} merged",
            delta.len(),
            dropped,
            deduped.unique.len()
        );

        let inserted = match store
            .commit(&deduped.unique, &checkpoint, config.reset_tables)
            .map_err(LoaderError::Commit)?
        {
            CommitOutcome::Committed { inserted } => inserted,
            // An overlapping run merged these loads first
            CommitOutcome::Superseded { current } => {
                return Ok(LoadOutcome::NoNewData {
                    checkpoint: current,
                })
            }
        };

        Ok(LoadOutcome::Merged(LoadSummary {
            fetched: delta.len(),
            normalized: normalized_count,
            dropped,
            duplicates: deduped.duplicates.len(),
            merged: deduped.unique.len(),
            inserted,
            previous_checkpoint: previous,
            checkpoint,
            reset: config.reset_tables,
        }))
    }
}
