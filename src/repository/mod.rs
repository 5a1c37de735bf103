//! Repository layer for SQLite persistence.
//!
//! Each layer lives in its own database file. A file is attached to an
//! in-memory connection under its schema name so tables are addressed as
//! `"schema"."table"`, the same way for bronze, silver and gold.

pub mod bronze;
pub mod checkpoint;
pub mod gold;
pub mod retry;

pub use bronze::{BronzeReader, BronzeWriter, FlatRecord};
pub use checkpoint::{CommitOutcome, SilverStore, METADATA_TABLE};
pub use gold::GoldStore;
pub use retry::{with_retry, RetryPolicy};

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, Row};
use thiserror::Error;

use crate::models::{LoadIdError, SilverRow};
use crate::utils::{format_date, format_time, parse_stored_date, parse_stored_time};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database still locked after {attempts} attempts: {last}")]
    LockRetriesExhausted { attempts: u32, last: rusqlite::Error },
    #[error("Invalid load id in {table}: {source}")]
    InvalidLoadId {
        table: String,
        #[source]
        source: LoadIdError,
    },
    #[error("Invalid stored value in column {column}: {value:?}")]
    InvalidStoredValue { column: &'static str, value: String },
    #[error("Table {0} does not exist")]
    MissingTable(String),
    #[error("Table {table} has no column {column}")]
    MissingColumn { table: String, column: &'static str },
}

impl StoreError {
    /// Whether the error means another writer holds the database lock.
    pub fn is_lock_contention(&self) -> bool {
        match self {
            StoreError::Sqlite(e) => is_busy(e),
            _ => false,
        }
    }
}

/// SQLITE_BUSY or SQLITE_LOCKED.
pub(crate) fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// How a database file is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Fails if the file does not exist; never takes write locks.
    ReadOnly,
    /// Creates the file when missing.
    ReadWrite,
}

/// Open a connection with `db_path` attached as `schema`.
pub fn open_attached(
    db_path: &Path,
    schema: &str,
    mode: AccessMode,
    busy_timeout: Duration,
) -> Result<Connection> {
    let conn = Connection::open_in_memory_with_flags(
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(busy_timeout)?;

    let uri = sqlite_uri(db_path, mode);
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {}", quote_ident(schema)),
        params![uri],
    )?;

    if mode == AccessMode::ReadWrite {
        conn.pragma_update_and_check(Some(schema), "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(Some(schema), "synchronous", "NORMAL")?;
    }

    Ok(conn)
}

/// Build a `file:` URI for `path`, escaping characters with URI meaning.
fn sqlite_uri(path: &Path, mode: AccessMode) -> String {
    let mut escaped = String::new();
    for c in path.to_string_lossy().chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '?' => escaped.push_str("%3f"),
            '#' => escaped.push_str("%23"),
            _ => escaped.push(c),
        }
    }
    let mode = match mode {
        AccessMode::ReadOnly => "ro",
        AccessMode::ReadWrite => "rwc",
    };
    format!("file:{}?mode={}", escaped, mode)
}

/// Quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`.
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Check whether `schema.table` exists.
pub fn table_exists(conn: &Connection, schema: &str, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            quote_ident(schema)
        ),
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Column names of `schema.table`, in table order.
pub fn table_columns(conn: &Connection, schema: &str, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
    let columns = stmt
        .query_map(params![table, schema], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(columns)
}

/// Read any stored value as text. Bronze is untyped, so numbers written by
/// other tools are accepted and rendered as text.
pub fn text_value(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    })
}

/// DDL for a table with the silver schema and primary key.
pub(crate) fn silver_table_ddl(qualified_table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {qualified_table} (
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            line TEXT NOT NULL,
            operator TEXT NOT NULL,
            vehicle TEXT NOT NULL,
            journey_pattern TEXT NOT NULL,
            origin_short_name TEXT NOT NULL,
            destination_short_name TEXT NOT NULL,
            direction TEXT NOT NULL,
            longitude REAL NOT NULL,
            latitude REAL NOT NULL,
            speed REAL NOT NULL,
            origin_aimed_departure_time TEXT NOT NULL,
            delay INTEGER NOT NULL,
            update_time TEXT NOT NULL,
            PRIMARY KEY ({pk})
        )
        "#,
        pk = primary_key_list(),
    )
}

/// Comma-separated primary-key column list.
pub(crate) fn primary_key_list() -> String {
    crate::models::PRIMARY_KEY
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comma-separated silver column list.
pub(crate) fn silver_column_list() -> String {
    crate::models::SILVER_COLUMNS.join(", ")
}

/// `INSERT INTO {table} (...) VALUES (?1, ..., ?15)` over the silver columns.
pub(crate) fn silver_insert_sql(qualified_table: &str) -> String {
    let placeholders = (1..=crate::models::SILVER_COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table,
        silver_column_list(),
        placeholders
    )
}

/// Bind a silver row to statement parameters `?1..?15` and execute it.
pub(crate) fn execute_silver_row(
    stmt: &mut rusqlite::CachedStatement<'_>,
    row: &SilverRow,
) -> rusqlite::Result<usize> {
    stmt.execute(params![
        format_date(row.date),
        format_time(row.time),
        row.line,
        row.operator,
        row.vehicle,
        row.journey_pattern,
        row.origin_short_name,
        row.destination_short_name,
        row.direction,
        row.longitude,
        row.latitude,
        f64::from(row.speed),
        format_time(row.origin_aimed_departure_time),
        row.delay,
        row.update_time.to_rfc3339(),
    ])
}

/// Map a `SELECT {silver_column_list}` row back into a [`SilverRow`].
pub(crate) fn read_silver_row(row: &Row<'_>) -> Result<SilverRow> {
    let date: String = row.get(0)?;
    let time: String = row.get(1)?;
    let aimed: String = row.get(12)?;
    let update_time: String = row.get(14)?;
    let speed: f64 = row.get(11)?;

    Ok(SilverRow {
        date: parse_stored_date(&date).map_err(|_| StoreError::InvalidStoredValue {
            column: "date",
            value: date.clone(),
        })?,
        time: parse_stored_time(&time).map_err(|_| StoreError::InvalidStoredValue {
            column: "time",
            value: time.clone(),
        })?,
        line: row.get(2)?,
        operator: row.get(3)?,
        vehicle: row.get(4)?,
        journey_pattern: row.get(5)?,
        origin_short_name: row.get(6)?,
        destination_short_name: row.get(7)?,
        direction: row.get(8)?,
        longitude: row.get(9)?,
        latitude: row.get(10)?,
        speed: speed as f32,
        origin_aimed_departure_time: parse_stored_time(&aimed).map_err(|_| {
            StoreError::InvalidStoredValue {
                column: "origin_aimed_departure_time",
                value: aimed.clone(),
            }
        })?,
        delay: row.get(13)?,
        update_time: parse_timestamp(&update_time).ok_or_else(|| {
            StoreError::InvalidStoredValue {
                column: "update_time",
                value: update_time.clone(),
            }
        })?,
        origin: None,
    })
}

/// Parse an RFC 3339 timestamp written by this crate.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
