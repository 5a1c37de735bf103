//! Pipeline stages.
//!
//! The silver transform is split into pure steps (`normalize`, `sanitize`,
//! `dedup`) driven by the `loader`. `ingest` and `export` move data into
//! bronze and out to gold.

pub mod dedup;
pub mod export;
pub mod ingest;
pub mod loader;
pub mod normalize;
pub mod sanitize;

pub use dedup::{deduplicate, DedupOutcome};
pub use export::{export, ExportSummary};
pub use ingest::{flatten, ingest, IngestError, IngestSummary};
pub use loader::{IncrementalLoader, LoadOutcome, LoadSummary, LoaderError};
pub use normalize::{normalize, normalize_record};
pub use sanitize::{drop_nulls, SanitizeOutcome};
