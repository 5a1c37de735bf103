//! Silver table and its checkpoint history.
//!
//! The `loads` table sits next to the silver table in the same schema. Each
//! successful merge appends one record; the current checkpoint is the highest
//! load id ever recorded. Rows and checkpoint are written in one transaction,
//! and a checkpoint at or below the recorded one is never appended again.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::{debug, info, warn};

use super::{
    execute_silver_row, open_attached, parse_timestamp, primary_key_list, qualified,
    read_silver_row, silver_column_list, silver_insert_sql, silver_table_ddl, table_columns,
    table_exists, text_value, with_retry, AccessMode, Result, RetryPolicy, StoreError,
};
use crate::models::{Checkpoint, LoadId, SilverRow};

/// Name of the checkpoint history table.
pub const METADATA_TABLE: &str = "loads";

/// Result of [`SilverStore::commit`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed { inserted: usize },
    /// History already holds this checkpoint or a later one, written by an
    /// overlapping run. Nothing was changed.
    Superseded { current: LoadId },
}

pub struct SilverStore {
    conn: Connection,
    schema: String,
    table: String,
    retry: RetryPolicy,
}

impl SilverStore {
    /// Open the silver database for writing.
    pub fn open(
        db_path: &Path,
        schema: &str,
        table: &str,
        busy_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let conn = open_attached(db_path, schema, AccessMode::ReadWrite, busy_timeout)?;
        Ok(Self {
            conn,
            schema: schema.to_string(),
            table: table.to_string(),
            retry,
        })
    }

    /// Open an existing silver database for inspection only.
    pub fn open_read_only(
        db_path: &Path,
        schema: &str,
        table: &str,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let conn = open_attached(db_path, schema, AccessMode::ReadOnly, busy_timeout)?;
        Ok(Self {
            conn,
            schema: schema.to_string(),
            table: table.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Create the silver and checkpoint tables if they do not exist.
    pub fn ensure_tables(&self) -> Result<()> {
        with_retry(&self.retry, "Creating silver tables", || {
            create_tables(&self.conn, &self.schema, &self.table)
        })
    }

    /// The latest checkpoint, or [`LoadId::min`] when there is no history or
    /// `reset` is requested.
    pub fn get_last_checkpoint(&self, reset: bool) -> Result<LoadId> {
        if reset {
            return Ok(LoadId::min());
        }
        Ok(self
            .history()?
            .into_iter()
            .map(|c| c.load_id)
            .max()
            .unwrap_or_default())
    }

    /// All checkpoint records, ascending by load id.
    pub fn history(&self) -> Result<Vec<Checkpoint>> {
        read_history(&self.conn, &self.schema)
    }

    /// Atomically record `checkpoint` and insert `rows` that are not already
    /// present.
    ///
    /// With `reset`, both tables are dropped and recreated first, inside the
    /// same transaction. Without `reset`, the recorded checkpoint is read
    /// again under the write lock; if it has already reached `checkpoint` the
    /// transaction is rolled back and [`CommitOutcome::Superseded`] returned.
    /// Lock contention is retried under the store's retry policy.
    pub fn commit(
        &mut self,
        rows: &[SilverRow],
        checkpoint: &LoadId,
        reset: bool,
    ) -> Result<CommitOutcome> {
        let policy = self.retry;
        let outcome = with_retry(&policy, "Committing silver merge", || {
            commit_once(
                &mut self.conn,
                &self.schema,
                &self.table,
                rows,
                checkpoint,
                reset,
            )
        })?;

        match &outcome {
            CommitOutcome::Committed { inserted } => info!(
                "Committed checkpoint {} to {}.{}: {} of {} rows inserted",
                checkpoint,
                self.schema,
                self.table,
                inserted,
                rows.len()
            ),
            CommitOutcome::Superseded { current } => warn!(
                "Checkpoint {} already covered by {} in {}.{}, nothing committed",
                checkpoint, current, self.schema, METADATA_TABLE
            ),
        }
        Ok(outcome)
    }

    /// Number of rows in the silver table, zero when it does not exist yet.
    pub fn row_count(&self) -> Result<i64> {
        if !table_exists(&self.conn, &self.schema, &self.table)? {
            return Ok(0);
        }
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.silver_table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Every silver row, ordered by primary key.
    pub fn read_all(&self) -> Result<Vec<SilverRow>> {
        if !table_exists(&self.conn, &self.schema, &self.table)? {
            return Err(StoreError::MissingTable(format!(
                "{}.{}",
                self.schema, self.table
            )));
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY {}",
            silver_column_list(),
            self.silver_table(),
            primary_key_list()
        ))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_silver_row(row)?);
        }
        Ok(out)
    }

    fn silver_table(&self) -> String {
        qualified(&self.schema, &self.table)
    }
}

fn create_tables(conn: &Connection, schema: &str, table: &str) -> Result<()> {
    let loads = qualified(schema, METADATA_TABLE);
    conn.execute_batch(&format!(
        r#"
        {silver};
        CREATE TABLE IF NOT EXISTS {loads} (
            load_id TEXT NOT NULL,
            loaded_rows INTEGER NOT NULL,
            loaded_at TEXT
        );
        "#,
        silver = silver_table_ddl(&qualified(schema, table)),
    ))?;

    // Older history tables lack one or both of these
    let columns = table_columns(conn, schema, METADATA_TABLE)?;
    if !columns.iter().any(|c| c == "loaded_rows") {
        debug!("Adding loaded_rows to {}", loads);
        conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN loaded_rows INTEGER NOT NULL DEFAULT 0",
                loads
            ),
            [],
        )?;
    }
    if !columns.iter().any(|c| c == "loaded_at") {
        debug!("Adding loaded_at to {}", loads);
        conn.execute(&format!("ALTER TABLE {} ADD COLUMN loaded_at TEXT", loads), [])?;
    }
    Ok(())
}

/// Read the history table of `schema`, tolerating missing optional columns
/// and load ids stored as numbers.
fn read_history(conn: &Connection, schema: &str) -> Result<Vec<Checkpoint>> {
    if !table_exists(conn, schema, METADATA_TABLE)? {
        return Ok(Vec::new());
    }

    let columns = table_columns(conn, schema, METADATA_TABLE)?;
    let optional = |name: &'static str| {
        if columns.iter().any(|c| c == name) {
            name
        } else {
            "NULL"
        }
    };
    let sql = format!(
        "SELECT load_id, {}, {} FROM {}",
        optional("loaded_rows"),
        optional("loaded_at"),
        qualified(schema, METADATA_TABLE)
    );

    let table = format!("{}.{}", schema, METADATA_TABLE);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut history = Vec::new();
    while let Some(row) = rows.next()? {
        let raw = text_value(row, 0)?.unwrap_or_default();
        let load_id = raw
            .parse::<LoadId>()
            .map_err(|source| StoreError::InvalidLoadId {
                table: table.clone(),
                source,
            })?;
        let loaded_rows: Option<i64> = row.get(1)?;
        let loaded_at: Option<String> = row.get(2)?;
        history.push(Checkpoint {
            load_id,
            loaded_rows: loaded_rows.unwrap_or(0),
            loaded_at: loaded_at.as_deref().and_then(parse_timestamp),
        });
    }

    history.sort_by(|a, b| a.load_id.cmp(&b.load_id));
    Ok(history)
}

fn commit_once(
    conn: &mut Connection,
    schema: &str,
    table: &str,
    rows: &[SilverRow],
    checkpoint: &LoadId,
    reset: bool,
) -> Result<CommitOutcome> {
    let silver = qualified(schema, table);
    let loads = qualified(schema, METADATA_TABLE);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if reset {
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}; DROP TABLE IF EXISTS {};",
            silver, loads
        ))?;
        create_tables(&tx, schema, table)?;
    } else if let Some(current) = read_history(&tx, schema)?
        .into_iter()
        .map(|c| c.load_id)
        .max()
        .filter(|current| current >= checkpoint)
    {
        // Dropping the transaction rolls it back
        return Ok(CommitOutcome::Superseded { current });
    }

    tx.execute(
        &format!(
            "INSERT INTO {} (load_id, loaded_rows, loaded_at) VALUES (?1, ?2, ?3)",
            loads
        ),
        params![checkpoint.as_str(), rows.len() as i64, Utc::now().to_rfc3339()],
    )?;

    let mut inserted = 0;
    {
        let mut stmt = tx.prepare_cached(&format!(
            "{} ON CONFLICT({}) DO NOTHING",
            silver_insert_sql(&silver),
            primary_key_list()
        ))?;
        for row in rows {
            inserted += execute_silver_row(&mut stmt, row)?;
        }
    }

    tx.commit()?;
    Ok(CommitOutcome::Committed { inserted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> SilverStore {
        let store = SilverStore::open(
            &dir.path().join("silver.db"),
            "silver",
            "journeys",
            Duration::ZERO,
            RetryPolicy {
                max_attempts: 1,
                delay: Duration::ZERO,
            },
        )
        .unwrap();
        store.ensure_tables().unwrap();
        store
    }

    fn row(line: &str, delay: i64) -> SilverRow {
        SilverRow {
            date: NaiveDate::from_ymd_opt(2014, 10, 5).unwrap(),
            time: NaiveTime::from_hms_milli_opt(23, 19, 0, 8).unwrap(),
            line: line.to_string(),
            operator: "TKL".to_string(),
            vehicle: "TKL_028".to_string(),
            journey_pattern: "3V".to_string(),
            origin_short_name: "3615".to_string(),
            destination_short_name: "1028".to_string(),
            direction: "1".to_string(),
            longitude: 23.6904222,
            latitude: 61.5267588,
            speed: 10.0,
            origin_aimed_departure_time: NaiveTime::from_hms_opt(22, 40, 0).unwrap(),
            delay,
            update_time: Utc::now(),
            origin: None,
        }
    }

    fn id(raw: &str) -> LoadId {
        raw.parse().unwrap()
    }

    #[test]
    fn test_empty_history_is_min() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.get_last_checkpoint(false).unwrap().is_min());
        assert!(store.history().unwrap().is_empty());
        assert_eq!(store.row_count().unwrap(), 0);
    }

    fn committed(inserted: usize) -> CommitOutcome {
        CommitOutcome::Committed { inserted }
    }

    #[test]
    fn test_checkpoint_is_numeric_max() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.commit(&[], &id("9"), false).unwrap();
        store.commit(&[], &id("10"), false).unwrap();

        assert_eq!(store.get_last_checkpoint(false).unwrap(), id("10"));
        assert!(store.get_last_checkpoint(true).unwrap().is_min());

        let history = store.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].load_id, id("9"));
        assert!(history.iter().all(|c| c.loaded_at.is_some()));
    }

    #[test]
    fn test_commit_inserts_only_absent_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        assert_eq!(
            store.commit(&[row("3", 0)], &id("1"), false).unwrap(),
            committed(1)
        );
        // Same key, different payload: kept as first written.
        assert_eq!(
            store
                .commit(&[row("3", 99), row("4", 0)], &id("2"), false)
                .unwrap(),
            committed(1)
        );

        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, "3");
        assert_eq!(rows[0].delay, 0);
        assert_eq!(rows[0].time, NaiveTime::from_hms_milli_opt(23, 19, 0, 8).unwrap());

        let history = store.history().unwrap();
        assert_eq!(history[1].loaded_rows, 2);
    }

    #[test]
    fn test_commit_behind_recorded_checkpoint_is_superseded() {
        let dir = TempDir::new().unwrap();
        let mut first = store(&dir);
        let mut second = store(&dir);

        // Both runs read the empty history before either commits.
        assert!(first.get_last_checkpoint(false).unwrap().is_min());
        assert!(second.get_last_checkpoint(false).unwrap().is_min());

        assert_eq!(
            first.commit(&[row("3", 0)], &id("5"), false).unwrap(),
            committed(1)
        );
        assert_eq!(
            second
                .commit(&[row("3", 7), row("4", 0)], &id("5"), false)
                .unwrap(),
            CommitOutcome::Superseded { current: id("5") }
        );
        assert_eq!(
            second.commit(&[row("4", 0)], &id("4"), false).unwrap(),
            CommitOutcome::Superseded { current: id("5") }
        );

        let history = second.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].loaded_rows, 1);
        let rows = second.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].delay, 0);

        // A reset rebuild is never superseded.
        assert_eq!(
            second.commit(&[row("4", 0)], &id("2"), true).unwrap(),
            committed(1)
        );
    }

    #[test]
    fn test_reset_discards_rows_and_history() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store
            .commit(&[row("3", 0), row("4", 0)], &id("5"), false)
            .unwrap();

        store.commit(&[row("7", 0)], &id("2"), true).unwrap();

        assert_eq!(store.row_count().unwrap(), 1);
        let history = store.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].load_id, id("2"));
    }

    #[test]
    fn test_ensure_tables_adds_loaded_at() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("silver.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                r#"
                CREATE TABLE loads (load_id TEXT NOT NULL, loaded_rows INTEGER NOT NULL);
                INSERT INTO loads VALUES ('42', 3);
                "#,
            )
            .unwrap();

        let store = SilverStore::open(
            &path,
            "silver",
            "journeys",
            Duration::ZERO,
            RetryPolicy::default(),
        )
        .unwrap();
        store.ensure_tables().unwrap();
        store.ensure_tables().unwrap();

        let history = store.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].load_id, id("42"));
        assert_eq!(history[0].loaded_at, None);
    }

    #[test]
    fn test_numeric_history_without_loaded_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("silver.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                r#"
                CREATE TABLE loads (load_id DOUBLE);
                INSERT INTO loads VALUES (1700000000.5);
                INSERT INTO loads VALUES (9);
                "#,
            )
            .unwrap();

        // Read-only inspection sees the history as it is.
        let inspect =
            SilverStore::open_read_only(&path, "silver", "journeys", Duration::ZERO).unwrap();
        let history = inspect.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].load_id, id("9"));
        assert_eq!(history[0].loaded_rows, 0);
        drop(inspect);

        let mut store = SilverStore::open(
            &path,
            "silver",
            "journeys",
            Duration::ZERO,
            RetryPolicy::default(),
        )
        .unwrap();
        store.ensure_tables().unwrap();
        assert_eq!(
            store.get_last_checkpoint(false).unwrap(),
            id("1700000000.5")
        );

        assert_eq!(
            store.commit(&[row("3", 0)], &id("1700000001"), false).unwrap(),
            committed(1)
        );
        let history = store.history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].load_id, id("1700000001"));
        assert_eq!(history[2].loaded_rows, 1);
    }
}
