//! Runtime configuration.
//!
//! Each command resolves its flags, or the environment variables of the same
//! name, into a plain config struct once in `main`. Library code receives the
//! struct by parameter and never reads the environment itself.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::repository::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::repository::{RetryPolicy, METADATA_TABLE};

/// Journeys API vehicle-activity endpoint.
pub const DEFAULT_INGEST_URL: &str = "http://data.itsfactory.fi/journeys/api/1/vehicle-activity";

/// Default bronze and gold table name.
pub const DEFAULT_TABLE: &str = "journeys_data";

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 1000;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("{name} must be a plain SQL identifier, got {value:?}")]
    InvalidIdentifier { name: &'static str, value: String },
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Configuration of the bronze-to-silver transform.
#[derive(Debug, Clone, PartialEq)]
pub struct SilverConfig {
    pub source_db: PathBuf,
    pub source_schema: String,
    pub source_table: String,
    pub target_db: PathBuf,
    pub target_schema: String,
    pub target_table: String,
    pub reset_tables: bool,
    pub retry: RetryPolicy,
    pub busy_timeout: Duration,
}

/// Configuration of a bronze ingest run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub url: String,
    pub target_db: PathBuf,
    pub target_schema: String,
    pub target_table: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub busy_timeout: Duration,
}

/// Configuration of a silver-to-gold export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    pub source_db: PathBuf,
    pub source_schema: String,
    pub source_table: String,
    pub target_db: PathBuf,
    pub target_schema: String,
    pub target_table: String,
    pub retry: RetryPolicy,
    pub busy_timeout: Duration,
}

/// Location of an existing silver table, for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusConfig {
    pub target_db: PathBuf,
    pub target_schema: String,
    pub target_table: String,
    pub busy_timeout: Duration,
    pub json: bool,
}

/// Lock handling shared by every command that writes.
#[derive(Debug, Clone, clap::Args)]
pub struct StorageArgs {
    /// Attempts for a write blocked by another writer
    #[arg(long, env = "COMMIT_RETRIES", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub commit_retries: u32,

    /// Seconds to wait between blocked attempts
    #[arg(long, env = "COMMIT_RETRY_DELAY_SECS", default_value_t = DEFAULT_RETRY_DELAY.as_secs())]
    pub commit_retry_delay_secs: u64,

    /// SQLite busy timeout in milliseconds
    #[arg(long, env = "BUSY_TIMEOUT_MS", default_value_t = DEFAULT_BUSY_TIMEOUT_MS)]
    pub busy_timeout_ms: u64,
}

impl Default for StorageArgs {
    fn default() -> Self {
        Self {
            commit_retries: DEFAULT_MAX_ATTEMPTS,
            commit_retry_delay_secs: DEFAULT_RETRY_DELAY.as_secs(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StorageArgs {
    fn retry(&self) -> Result<RetryPolicy, ConfigError> {
        if self.commit_retries == 0 {
            return Err(ConfigError::InvalidValue {
                name: "COMMIT_RETRIES",
                reason: "at least one attempt is required".to_string(),
            });
        }
        Ok(RetryPolicy {
            max_attempts: self.commit_retries,
            delay: Duration::from_secs(self.commit_retry_delay_secs),
        })
    }

    fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, clap::Args)]
pub struct TransformArgs {
    /// Bronze database file
    #[arg(long, env = "SOURCE_DB")]
    pub source_db: Option<String>,

    /// Schema the bronze file is attached as
    #[arg(long, env = "SOURCE_SCHEMA")]
    pub source_schema: Option<String>,

    /// Bronze table
    #[arg(long, env = "SOURCE_TABLE")]
    pub source_table: Option<String>,

    /// Silver database file (created if missing)
    #[arg(long, env = "TARGET_DB")]
    pub target_db: Option<String>,

    /// Schema the silver file is attached as
    #[arg(long, env = "TARGET_SCHEMA")]
    pub target_schema: Option<String>,

    /// Silver table
    #[arg(long, env = "TARGET_TABLE")]
    pub target_table: Option<String>,

    /// Drop silver and its checkpoint history before merging ("true" enables)
    #[arg(long, env = "RESET_TABLES", num_args = 0..=1, default_missing_value = "true")]
    pub reset_tables: Option<String>,

    #[command(flatten)]
    pub storage: StorageArgs,
}

impl TransformArgs {
    pub fn resolve(self) -> Result<SilverConfig, ConfigError> {
        let mut missing = Vec::new();
        let source_db = require(&mut missing, "SOURCE_DB", self.source_db);
        let source_schema = require(&mut missing, "SOURCE_SCHEMA", self.source_schema);
        let source_table = require(&mut missing, "SOURCE_TABLE", self.source_table);
        let target_db = require(&mut missing, "TARGET_DB", self.target_db);
        let target_schema = require(&mut missing, "TARGET_SCHEMA", self.target_schema);
        let target_table = require(&mut missing, "TARGET_TABLE", self.target_table);

        let (
            Some(source_db),
            Some(source_schema),
            Some(source_table),
            Some(target_db),
            Some(target_schema),
            Some(target_table),
        ) = (
            source_db,
            source_schema,
            source_table,
            target_db,
            target_schema,
            target_table,
        )
        else {
            return Err(ConfigError::Missing(missing));
        };

        identifier("SOURCE_SCHEMA", &source_schema)?;
        identifier("SOURCE_TABLE", &source_table)?;
        identifier("TARGET_SCHEMA", &target_schema)?;
        identifier("TARGET_TABLE", &target_table)?;
        not_metadata("TARGET_TABLE", &target_table)?;

        let source_db = PathBuf::from(source_db);
        let target_db = PathBuf::from(target_db);
        if source_db == target_db
            && (source_table == target_table || source_table == METADATA_TABLE)
        {
            return Err(ConfigError::InvalidValue {
                name: "SOURCE_TABLE",
                reason: format!(
                    "{} would be overwritten by the silver tables in the same database",
                    source_table
                ),
            });
        }

        Ok(SilverConfig {
            source_db,
            source_schema,
            source_table,
            target_db,
            target_schema,
            target_table,
            reset_tables: self
                .reset_tables
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            retry: self.storage.retry()?,
            busy_timeout: self.storage.busy_timeout(),
        })
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct IngestArgs {
    /// Vehicle-activity endpoint
    #[arg(long, env = "INGEST_URL", default_value = DEFAULT_INGEST_URL)]
    pub url: String,

    /// Bronze database file (created if missing)
    #[arg(long, env = "TARGET_DB")]
    pub target_db: Option<String>,

    /// Schema the bronze file is attached as
    #[arg(long, env = "TARGET_SCHEMA", default_value = "bronze")]
    pub target_schema: String,

    /// Bronze table
    #[arg(long, env = "TARGET_TABLE", default_value = DEFAULT_TABLE)]
    pub target_table: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    #[command(flatten)]
    pub storage: StorageArgs,
}

impl IngestArgs {
    pub fn resolve(self) -> Result<IngestConfig, ConfigError> {
        let mut missing = Vec::new();
        let Some(target_db) = require(&mut missing, "TARGET_DB", self.target_db) else {
            return Err(ConfigError::Missing(missing));
        };

        identifier("TARGET_SCHEMA", &self.target_schema)?;
        identifier("TARGET_TABLE", &self.target_table)?;
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                name: "INGEST_URL",
                reason: format!("{:?} is not an http(s) URL", self.url),
            });
        }

        Ok(IngestConfig {
            url: self.url,
            target_db: PathBuf::from(target_db),
            target_schema: self.target_schema,
            target_table: self.target_table,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry: self.storage.retry()?,
            busy_timeout: self.storage.busy_timeout(),
        })
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct ExportArgs {
    /// Silver database file
    #[arg(long, env = "SOURCE_DB")]
    pub source_db: Option<String>,

    /// Schema the silver file is attached as
    #[arg(long, env = "SOURCE_SCHEMA")]
    pub source_schema: Option<String>,

    /// Silver table
    #[arg(long, env = "SOURCE_TABLE")]
    pub source_table: Option<String>,

    /// Gold database file (created if missing)
    #[arg(long, env = "TARGET_DB")]
    pub target_db: Option<String>,

    /// Gold table
    #[arg(long, env = "TARGET_TABLE", default_value = DEFAULT_TABLE)]
    pub target_table: String,

    #[command(flatten)]
    pub storage: StorageArgs,
}

impl ExportArgs {
    pub fn resolve(self) -> Result<ExportConfig, ConfigError> {
        let mut missing = Vec::new();
        let source_db = require(&mut missing, "SOURCE_DB", self.source_db);
        let source_schema = require(&mut missing, "SOURCE_SCHEMA", self.source_schema);
        let source_table = require(&mut missing, "SOURCE_TABLE", self.source_table);
        let target_db = require(&mut missing, "TARGET_DB", self.target_db);

        let (Some(source_db), Some(source_schema), Some(source_table), Some(target_db)) =
            (source_db, source_schema, source_table, target_db)
        else {
            return Err(ConfigError::Missing(missing));
        };

        identifier("SOURCE_SCHEMA", &source_schema)?;
        identifier("SOURCE_TABLE", &source_table)?;
        identifier("TARGET_TABLE", &self.target_table)?;

        let source_db = PathBuf::from(source_db);
        let target_db = PathBuf::from(target_db);
        if source_db == target_db {
            return Err(ConfigError::InvalidValue {
                name: "TARGET_DB",
                reason: "gold must live in a different database file than silver".to_string(),
            });
        }

        Ok(ExportConfig {
            source_db,
            source_schema,
            source_table,
            target_db,
            target_schema: "gold".to_string(),
            target_table: self.target_table,
            retry: self.storage.retry()?,
            busy_timeout: self.storage.busy_timeout(),
        })
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct StatusArgs {
    /// Silver database file
    #[arg(long, env = "TARGET_DB")]
    pub target_db: Option<String>,

    /// Schema the silver file is attached as
    #[arg(long, env = "TARGET_SCHEMA")]
    pub target_schema: Option<String>,

    /// Silver table
    #[arg(long, env = "TARGET_TABLE")]
    pub target_table: Option<String>,

    /// SQLite busy timeout in milliseconds
    #[arg(long, env = "BUSY_TIMEOUT_MS", default_value_t = DEFAULT_BUSY_TIMEOUT_MS)]
    pub busy_timeout_ms: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn resolve(self) -> Result<StatusConfig, ConfigError> {
        let mut missing = Vec::new();
        let target_db = require(&mut missing, "TARGET_DB", self.target_db);
        let target_schema = require(&mut missing, "TARGET_SCHEMA", self.target_schema);
        let target_table = require(&mut missing, "TARGET_TABLE", self.target_table);

        let (Some(target_db), Some(target_schema), Some(target_table)) =
            (target_db, target_schema, target_table)
        else {
            return Err(ConfigError::Missing(missing));
        };

        identifier("TARGET_SCHEMA", &target_schema)?;
        identifier("TARGET_TABLE", &target_table)?;

        Ok(StatusConfig {
            target_db: PathBuf::from(target_db),
            target_schema,
            target_table,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            json: self.json,
        })
    }
}

/// Record `name` as missing when `value` is unset or blank.
fn require(
    missing: &mut Vec<&'static str>,
    name: &'static str,
    value: Option<String>,
) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            missing.push(name);
            None
        }
    }
}

fn identifier(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            name,
            value: value.to_string(),
        })
    }
}

fn not_metadata(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.eq_ignore_ascii_case(METADATA_TABLE) {
        return Err(ConfigError::InvalidValue {
            name,
            reason: format!("{:?} is reserved for checkpoint history", value),
        });
    }
    Ok(())
}
