//! Bronze table access: delta reads for the silver transform and append-only
//! writes for ingest.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, TransactionBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    open_attached, qualified, quote_ident, table_columns, table_exists, text_value, AccessMode,
    Result, StoreError,
};
use crate::models::{bronze_columns as columns, BronzeRecord, LoadId};

/// One flattened upstream object: column name to optional text value.
pub type FlatRecord = BTreeMap<String, Option<String>>;

/// Read-only view of a bronze table.
pub struct BronzeReader {
    conn: Connection,
    name: String,
    qualified: String,
    columns: HashSet<String>,
}

impl BronzeReader {
    /// Attach `db_path` read-only and check that the table carries load and
    /// record ids.
    pub fn open(db_path: &Path, schema: &str, table: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = open_attached(db_path, schema, AccessMode::ReadOnly, busy_timeout)?;
        let name = format!("{}.{}", schema, table);

        if !table_exists(&conn, schema, table)? {
            return Err(StoreError::MissingTable(name));
        }

        let columns: HashSet<String> = table_columns(&conn, schema, table)?.into_iter().collect();
        for required in [columns::LOAD_ID, columns::RECORD_ID] {
            if !columns.contains(required) {
                return Err(StoreError::MissingColumn {
                    table: name,
                    column: required,
                });
            }
        }

        Ok(Self {
            conn,
            name,
            qualified: qualified(schema, table),
            columns,
        })
    }

    /// Distinct load ids present in the table, in ascending numeric order.
    pub fn load_ids(&self) -> Result<Vec<LoadId>> {
        Ok(self
            .stored_load_ids()?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Highest load id in the table, if any rows exist.
    pub fn max_load_id(&self) -> Result<Option<LoadId>> {
        Ok(self.load_ids()?.pop())
    }

    /// All rows whose load id is strictly greater than `since`.
    ///
    /// Rows come back grouped by ascending load id, ordered by record id
    /// within a load.
    pub fn get_new_rows(&self, since: &LoadId) -> Result<Vec<BronzeRecord>> {
        let pending: Vec<(LoadId, Value)> = self
            .stored_load_ids()?
            .into_iter()
            .filter(|(id, _)| id > since)
            .collect();

        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {}",
            self.select_list(),
            self.qualified,
            quote_ident(columns::LOAD_ID),
            quote_ident(columns::RECORD_ID)
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let mut records = Vec::new();
        for (load_id, stored) in &pending {
            let before = records.len();
            let mut rows = stmt.query(params![stored])?;
            while let Some(row) = rows.next()? {
                records.push(record_from_row(row, load_id)?);
            }
            debug!(
                "Load {} has {} rows in {}",
                load_id,
                records.len() - before,
                self.name
            );
        }

        info!(
            "Fetched {} rows from {} across {} loads after {}",
            records.len(),
            self.name,
            pending.len(),
            since
        );
        Ok(records)
    }

    /// Load ids paired with the value as stored, so lookups bind the exact
    /// stored representation.
    fn stored_load_ids(&self) -> Result<Vec<(LoadId, Value)>> {
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL",
            col = quote_ident(columns::LOAD_ID),
            table = self.qualified
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let stored: Value = row.get(0)?;
            let text = text_value(row, 0)?.unwrap_or_default();
            let id = text
                .parse::<LoadId>()
                .map_err(|source| StoreError::InvalidLoadId {
                    table: self.name.clone(),
                    source,
                })?;
            ids.push((id, stored));
        }

        ids.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ids)
    }

    /// Selected columns; payload columns the table lacks are read as NULL.
    fn select_list(&self) -> String {
        columns::SELECTED
            .iter()
            .map(|column| {
                if self.columns.contains(*column) {
                    quote_ident(column)
                } else {
                    format!("NULL AS {}", quote_ident(column))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn record_from_row(row: &Row<'_>, load_id: &LoadId) -> Result<BronzeRecord> {
    Ok(BronzeRecord {
        recorded_at_time: text_value(row, 0)?,
        line_ref: text_value(row, 1)?,
        operator_ref: text_value(row, 2)?,
        vehicle_ref: text_value(row, 3)?,
        journey_pattern_ref: text_value(row, 4)?,
        origin_short_name: text_value(row, 5)?,
        destination_short_name: text_value(row, 6)?,
        direction_ref: text_value(row, 7)?,
        longitude: text_value(row, 8)?,
        latitude: text_value(row, 9)?,
        speed: text_value(row, 10)?,
        origin_aimed_departure_time: text_value(row, 11)?,
        delay: text_value(row, 12)?,
        load_id: load_id.clone(),
        record_id: text_value(row, 14)?.unwrap_or_default(),
    })
}

/// Append-only writer for a bronze table.
pub struct BronzeWriter {
    conn: Connection,
    schema: String,
    table: String,
}

impl BronzeWriter {
    pub fn open(db_path: &Path, schema: &str, table: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = open_attached(db_path, schema, AccessMode::ReadWrite, busy_timeout)?;
        Ok(Self {
            conn,
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// Append one batch under `load_id` in a single transaction.
    ///
    /// The table is created on first use. Columns seen for the first time are
    /// added; existing columns are never dropped or retyped. Returns the number
    /// of rows written.
    pub fn append(&mut self, records: &[FlatRecord], load_id: &LoadId) -> Result<usize> {
        let target = qualified(&self.schema, &self.table);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {target} (
                {load_id} TEXT NOT NULL,
                {record_id} TEXT NOT NULL UNIQUE
            );
            CREATE INDEX IF NOT EXISTS {index} ON {table} ({load_id});
            "#,
            load_id = quote_ident(columns::LOAD_ID),
            record_id = quote_ident(columns::RECORD_ID),
            index = qualified(&self.schema, &format!("idx_{}_load_id", self.table)),
            table = quote_ident(&self.table),
        ))?;

        let payload: BTreeSet<&str> = records
            .iter()
            .flat_map(|r| r.keys().map(String::as_str))
            .filter(|name| !name.starts_with("_dlt_"))
            .collect();

        let existing: HashSet<String> = table_columns(&tx, &self.schema, &self.table)?
            .into_iter()
            .collect();
        for name in payload.iter().filter(|name| !existing.contains(**name)) {
            debug!("Adding column {} to {}", name, target);
            tx.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} TEXT", target, quote_ident(name)),
                [],
            )?;
        }

        let column_list = [columns::LOAD_ID, columns::RECORD_ID]
            .into_iter()
            .chain(payload.iter().copied())
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=payload.len() + 2)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                target, column_list, placeholders
            ))?;
            for record in records {
                let mut values: Vec<Option<String>> = Vec::with_capacity(payload.len() + 2);
                values.push(Some(load_id.to_string()));
                values.push(Some(Uuid::new_v4().simple().to_string()));
                values.extend(payload.iter().map(|name| record.get(*name).cloned().flatten()));
                stmt.execute(params_from_iter(values))?;
            }
        }

        tx.commit()?;
        info!("Appended {} rows to {} as load {}", records.len(), target, load_id);
        Ok(records.len())
    }
}
