//! Bronze ingest from the vehicle-activity API.
//!
//! The endpoint returns every active vehicle in a single unpaginated
//! response. Each object in its `body` array becomes one bronze row: nested
//! objects are flattened into `parent__child` columns with snake_case names,
//! and every scalar is stored as text.

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::models::LoadId;
use crate::repository::{with_retry, BronzeWriter, FlatRecord, StoreError};

pub const USER_AGENT: &str = concat!(
    "transitlake/",
    env!("CARGO_PKG_VERSION"),
    " (transit telemetry pipeline)"
);

/// Envelope of the vehicle-activity response. Only `body` is loaded.
#[derive(Debug, Deserialize)]
struct ActivityResponse {
    body: Vec<Value>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response payload: {0}")]
    Payload(String),
    #[error("Failed to write bronze rows: {0}")]
    Store(#[from] StoreError),
    #[error("Ingest task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result of one ingest batch.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub load_id: LoadId,
    pub rows: usize,
    /// Items in the response that were not objects.
    pub skipped: usize,
}

/// Fetch the current vehicle activity and append it to bronze as one load.
pub async fn ingest(config: &IngestConfig) -> Result<IngestSummary, IngestError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout)
        .gzip(true)
        .build()?;

    info!("Fetching {}", config.url);
    let items = fetch_body(&client, &config.url).await?;
    let total = items.len();
    let records: Vec<FlatRecord> = items
        .iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(flatten(map)),
            _ => None,
        })
        .collect();
    let skipped = total - records.len();
    if skipped > 0 {
        warn!("Skipping {} non-object items in response body", skipped);
    }

    let load_id = LoadId::from_timestamp(Utc::now());
    if records.is_empty() {
        warn!("Response body was empty, nothing to write");
        return Ok(IngestSummary {
            load_id,
            rows: 0,
            skipped,
        });
    }

    let config = config.clone();
    let batch_id = load_id.clone();
    let rows = tokio::task::spawn_blocking(move || -> Result<usize, StoreError> {
        let mut writer = BronzeWriter::open(
            &config.target_db,
            &config.target_schema,
            &config.target_table,
            config.busy_timeout,
        )?;
        with_retry(&config.retry, "Appending bronze rows", || {
            writer.append(&records, &batch_id)
        })
    })
    .await??;

    Ok(IngestSummary {
        load_id,
        rows,
        skipped,
    })
}

/// GET `url` and return the `body` array of the JSON response.
pub async fn fetch_body(client: &Client, url: &str) -> Result<Vec<Value>, IngestError> {
    let response = client.get(url).send().await?.error_for_status()?;
    let payload: Value = response.json().await?;
    extract_body(payload)
}

fn extract_body(payload: Value) -> Result<Vec<Value>, IngestError> {
    serde_json::from_value::<ActivityResponse>(payload)
        .map(|response| response.body)
        .map_err(|e| IngestError::Payload(e.to_string()))
}

/// Flatten one response object into bronze columns.
///
/// Arrays are left out; they hold per-vehicle child lists (such as onward
/// calls) that this pipeline does not load.
pub fn flatten(object: &Map<String, Value>) -> FlatRecord {
    let mut out = FlatRecord::new();
    flatten_into(None, object, &mut out);
    out
}

fn flatten_into(prefix: Option<&str>, object: &Map<String, Value>, out: &mut FlatRecord) {
    for (key, value) in object {
        let name = match prefix {
            Some(prefix) => format!("{}__{}", prefix, snake_case(key)),
            None => snake_case(key),
        };
        match value {
            Value::Object(inner) => flatten_into(Some(&name), inner, out),
            Value::Array(_) => {}
            Value::Null => {
                out.insert(name, None);
            }
            Value::String(s) => {
                out.insert(name, Some(s.clone()));
            }
            other => {
                out.insert(name, Some(other.to_string()));
            }
        }
    }
}

/// `recordedAtTime` -> `recorded_at_time`, `HTTPStatus` -> `http_status`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let boundary = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower);
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}
