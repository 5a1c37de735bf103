//! Gold table: silver rows merged with update-on-match.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use super::{
    execute_silver_row, open_attached, primary_key_list, qualified, silver_insert_sql,
    silver_table_ddl, with_retry, AccessMode, Result, RetryPolicy,
};
use crate::models::{SilverRow, PRIMARY_KEY, SILVER_COLUMNS};

pub struct GoldStore {
    conn: Connection,
    schema: String,
    table: String,
    retry: RetryPolicy,
}

impl GoldStore {
    /// Open the gold database, creating the table when missing.
    pub fn open(
        db_path: &Path,
        schema: &str,
        table: &str,
        busy_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let conn = open_attached(db_path, schema, AccessMode::ReadWrite, busy_timeout)?;
        conn.execute_batch(&silver_table_ddl(&qualified(schema, table)))?;
        Ok(Self {
            conn,
            schema: schema.to_string(),
            table: table.to_string(),
            retry,
        })
    }

    /// Insert new keys and overwrite every non-key column of existing ones.
    pub fn merge(&mut self, rows: &[SilverRow]) -> Result<usize> {
        let target = qualified(&self.schema, &self.table);
        let policy = self.retry;
        let written = with_retry(&policy, "Merging into gold", || {
            merge_once(&mut self.conn, &target, rows)
        })?;
        info!("Merged {} rows into {}", written, target);
        Ok(written)
    }

    pub fn row_count(&self) -> Result<i64> {
        let count = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {}",
                qualified(&self.schema, &self.table)
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn merge_once(conn: &mut Connection, target: &str, rows: &[SilverRow]) -> Result<usize> {
    let assignments = SILVER_COLUMNS
        .iter()
        .filter(|column| !PRIMARY_KEY.iter().any(|pk| pk.as_str() == **column))
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut written = 0;
    {
        let mut stmt = tx.prepare_cached(&format!(
            "{} ON CONFLICT({}) DO UPDATE SET {}",
            silver_insert_sql(target),
            primary_key_list(),
            assignments
        ))?;
        for row in rows {
            written += execute_silver_row(&mut stmt, row)?;
        }
    }
    tx.commit()?;
    Ok(written)
}
