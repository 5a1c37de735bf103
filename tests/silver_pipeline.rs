//! End-to-end tests for the bronze -> silver -> gold pipeline.
//!
//! Bronze is seeded directly with rusqlite the way an upstream loader would
//! leave it: every column text, with `_dlt_load_id`/`_dlt_id` bookkeeping.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params_from_iter, Connection};
use tempfile::TempDir;

use transitlake::config::{ExportConfig, SilverConfig};
use transitlake::models::{bronze_columns, LoadId};
use transitlake::repository::{CommitOutcome, RetryPolicy, SilverStore, StoreError};
use transitlake::services::{export, IncrementalLoader, LoadOutcome, LoadSummary};

const LOAD_A: &str = "1713601219.3070812";
const LOAD_B: &str = "1713601319.3070812";
const LOAD_C: &str = "1713602219.3070812";

/// One bronze row, in `bronze_columns::SELECTED` order.
type BronzeRow = [Option<&'static str>; 15];

const FIXTURE: [BronzeRow; 6] = [
    [
        Some("2014-10-05T23:19:00.008"),
        Some("3"),
        Some("TKL"),
        Some("TKL_028"),
        Some("3V"),
        Some("3615"),
        Some("1028"),
        Some("1"),
        Some("23.6904222"),
        Some("61.5267588"),
        Some("10.0"),
        Some("2240"),
        Some("-P0Y0M0DT0H3M20.000S"),
        Some(LOAD_A),
        Some("l3PGkQanjz8xGQ"),
    ],
    [
        None,
        Some("3A"),
        Some("TKL"),
        Some("TKL_123"),
        Some("3Z"),
        Some("3616"),
        Some("1128"),
        Some("1"),
        Some("23.7904222"),
        Some("60.5267588"),
        Some("21.0"),
        Some("2140"),
        Some("P0Y0M0DT0H10M21.000S"),
        Some(LOAD_A),
        Some("asdgkQanjz8xGQ"),
    ],
    [
        Some("2014-12-07T23:19:02.008"),
        Some("15B"),
        Some("ASD"),
        Some("TKL_XXX"),
        Some("15X"),
        None,
        Some("1038"),
        Some("1"),
        Some("23.8904222"),
        Some("59.5267588"),
        Some("32.0"),
        Some("1200"),
        Some("-P0Y0M0DT0H4M12.000S"),
        Some(LOAD_B),
        Some("l3PGdr65jz8xGQ"),
    ],
    [
        Some("2014-01-08T23:19:03.008"),
        Some("1"),
        Some("DSA"),
        Some("TKL_YYY"),
        Some("1V"),
        Some("3715"),
        Some("1029"),
        Some("2"),
        Some("23.9904222"),
        Some("58.5267588"),
        Some("43.0"),
        Some("2005"),
        Some("P0Y0M0DT0H10M20.000S"),
        Some(LOAD_B),
        Some("l3PGkQanac4XGQ"),
    ],
    [
        Some("2014-02-09T23:19:04.008"),
        Some("70"),
        Some("Y"),
        Some("TKL_028"),
        Some("70W"),
        Some("0615"),
        Some("0028"),
        Some("2"),
        Some("24.0904222"),
        Some("57.5267588"),
        Some("55.5"),
        Some("1234"),
        Some("P0Y0M0DT0H0M00.000S"),
        Some(LOAD_C),
        Some("dtPGkQanjz8xZZ"),
    ],
    [
        Some("2014-02-09T23:19:04.008"),
        Some("70"),
        Some("Y"),
        Some("TKL_028"),
        Some("70W"),
        Some("0615"),
        Some("0028"),
        Some("2"),
        Some("24.0904222"),
        Some("57.5267588"),
        Some("55.5"),
        Some("1234"),
        Some("P0Y0M0DT0H0M00.000S"),
        Some(LOAD_C),
        Some("dtPGkQanjz8xZZ"),
    ],
];

struct Lake {
    _dir: TempDir,
    bronze: PathBuf,
    silver: PathBuf,
    gold: PathBuf,
}

impl Lake {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let bronze = dir.path().join("bronze.db");
        let silver = dir.path().join("silver.db");
        let gold = dir.path().join("gold.db");

        let columns = bronze_columns::SELECTED
            .iter()
            .map(|c| format!("{} TEXT", c))
            .collect::<Vec<_>>()
            .join(", ");
        Connection::open(&bronze)
            .unwrap()
            .execute_batch(&format!(
                "CREATE TABLE journeys_data (valid_until_time TEXT, {})",
                columns
            ))
            .unwrap();

        Self {
            _dir: dir,
            bronze,
            silver,
            gold,
        }
    }

    fn seed(&self, rows: &[BronzeRow]) {
        let conn = Connection::open(&self.bronze).unwrap();
        let placeholders = (1..=15).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "INSERT INTO journeys_data ({}) VALUES ({})",
            bronze_columns::SELECTED.join(", "),
            placeholders
        );
        for row in rows {
            conn.execute(&sql, params_from_iter(row.iter())).unwrap();
        }
    }

    fn config(&self, reset_tables: bool) -> SilverConfig {
        SilverConfig {
            source_db: self.bronze.clone(),
            source_schema: "bronze".to_string(),
            source_table: "journeys_data".to_string(),
            target_db: self.silver.clone(),
            target_schema: "silver".to_string(),
            target_table: "journeys".to_string(),
            reset_tables,
            retry: RetryPolicy {
                max_attempts: 2,
                delay: Duration::ZERO,
            },
            busy_timeout: Duration::ZERO,
        }
    }

    fn transform(&self, reset_tables: bool) -> LoadOutcome {
        IncrementalLoader::new(&self.config(reset_tables))
            .run()
            .unwrap()
    }

    fn silver(&self) -> SilverStore {
        SilverStore::open_read_only(&self.silver, "silver", "journeys", Duration::ZERO).unwrap()
    }
}

fn merged(outcome: LoadOutcome) -> LoadSummary {
    match outcome {
        LoadOutcome::Merged(summary) => summary,
        other => panic!("expected a merge, got {:?}", other),
    }
}

fn id(raw: &str) -> LoadId {
    raw.parse().unwrap()
}

fn row_with(load_id: &'static str, record_id: &'static str, line: &'static str) -> BronzeRow {
    let mut row = FIXTURE[0];
    row[1] = Some(line);
    row[13] = Some(load_id);
    row[14] = Some(record_id);
    row
}

#[test]
fn fixture_flows_through_every_stage() {
    let lake = Lake::new();
    lake.seed(&FIXTURE);

    let summary = merged(lake.transform(false));
    assert_eq!(summary.fetched, 6);
    assert_eq!(summary.normalized, 6);
    assert_eq!(summary.dropped, 2);
    assert_eq!(summary.duplicates, 2);
    assert_eq!(summary.merged, 3);
    assert_eq!(summary.inserted, 3);
    assert!(summary.previous_checkpoint.is_min());
    assert_eq!(summary.checkpoint, id(LOAD_C));

    let rows = lake.silver().read_all().unwrap();
    let lines: Vec<&str> = rows.iter().map(|r| r.line.as_str()).collect();
    assert_eq!(lines, vec!["1", "70", "3"]);

    let first = rows.iter().find(|r| r.line == "3").unwrap();
    assert_eq!(first.delay, -200);
    assert_eq!(first.time.to_string(), "23:19:00.008");
    assert_eq!(first.origin_aimed_departure_time.to_string(), "22:40:00");
    assert_eq!(first.longitude, 23.6904222);
    assert_eq!(first.speed, 10.0);

    let history = lake.silver().history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].load_id, id(LOAD_C));
    assert_eq!(history[0].loaded_rows, 3);
}

#[test]
fn rerun_without_new_data_changes_nothing() {
    let lake = Lake::new();
    lake.seed(&FIXTURE);
    merged(lake.transform(false));

    let before = lake.silver().read_all().unwrap();
    assert_eq!(
        lake.transform(false),
        LoadOutcome::NoNewData {
            checkpoint: id(LOAD_C)
        }
    );

    assert_eq!(lake.silver().read_all().unwrap(), before);
    assert_eq!(lake.silver().history().unwrap().len(), 1);
}

#[test]
fn overlapping_run_does_not_record_checkpoint_twice() {
    let lake = Lake::new();
    lake.seed(&FIXTURE);

    let config = lake.config(false);
    let mut stale = SilverStore::open(
        &config.target_db,
        &config.target_schema,
        &config.target_table,
        config.busy_timeout,
        config.retry,
    )
    .unwrap();
    stale.ensure_tables().unwrap();
    assert!(stale.get_last_checkpoint(false).unwrap().is_min());

    // Another run completes between the stale read and its commit.
    merged(lake.transform(false));
    let before = lake.silver().read_all().unwrap();

    assert_eq!(
        stale.commit(&before, &id(LOAD_C), false).unwrap(),
        CommitOutcome::Superseded {
            current: id(LOAD_C)
        }
    );

    let history = lake.silver().history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].loaded_rows, 3);
    assert_eq!(lake.silver().read_all().unwrap(), before);
}

#[test]
fn new_loads_only_insert_absent_keys() {
    let lake = Lake::new();
    lake.seed(&FIXTURE);
    merged(lake.transform(false));

    // Same key as fixture row 0 with a different vehicle, plus one new line.
    let mut collision = row_with("1713700000.1", "newrow0000001", "3");
    collision[3] = Some("TKL_999");
    lake.seed(&[collision, row_with("1713700000.1", "newrow0000002", "90")]);

    let summary = merged(lake.transform(false));
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.merged, 2);
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.previous_checkpoint, id(LOAD_C));

    let rows = lake.silver().read_all().unwrap();
    assert_eq!(rows.len(), 4);
    let kept = rows.iter().find(|r| r.line == "3").unwrap();
    assert_eq!(kept.vehicle, "TKL_028");
    assert_eq!(lake.silver().history().unwrap().len(), 2);
}

#[test]
fn load_ids_compare_numerically() {
    let lake = Lake::new();
    lake.seed(&[row_with("9", "a", "1")]);
    assert_eq!(merged(lake.transform(false)).checkpoint, id("9"));

    // "10" < "9" as text; it must still count as newer.
    lake.seed(&[row_with("10", "b", "2")]);
    let summary = merged(lake.transform(false));
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.checkpoint, id("10"));
    assert_eq!(lake.silver().row_count().unwrap(), 2);
}

#[test]
fn reset_rebuilds_from_all_of_bronze() {
    let lake = Lake::new();
    lake.seed(&FIXTURE);
    merged(lake.transform(false));
    lake.seed(&[row_with("1713700000.1", "extra", "90")]);
    merged(lake.transform(false));
    assert_eq!(lake.silver().history().unwrap().len(), 2);

    let summary = merged(lake.transform(true));
    assert!(summary.reset);
    assert!(summary.previous_checkpoint.is_min());
    assert_eq!(summary.fetched, 7);
    assert_eq!(summary.inserted, 4);

    let history = lake.silver().history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].load_id, id("1713700000.1"));
    assert_eq!(lake.silver().row_count().unwrap(), 4);
}

#[test]
fn every_row_dropped_still_advances_checkpoint() {
    let lake = Lake::new();
    lake.seed(&[FIXTURE[1], FIXTURE[2]]);

    let summary = merged(lake.transform(false));
    assert_eq!(summary.dropped, 2);
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.checkpoint, id(LOAD_B));
    assert_eq!(
        lake.transform(false),
        LoadOutcome::NoNewData {
            checkpoint: id(LOAD_B)
        }
    );
}

#[test]
fn locked_silver_fails_after_retries_without_partial_writes() {
    let lake = Lake::new();
    lake.seed(&FIXTURE[..2]);
    merged(lake.transform(false));
    lake.seed(&FIXTURE[2..]);

    let blocker = Connection::open(&lake.silver).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let err = IncrementalLoader::new(&lake.config(false))
        .run()
        .unwrap_err();
    assert!(
        matches!(
            err.store_error(),
            StoreError::LockRetriesExhausted { attempts: 2, .. }
        ),
        "unexpected error: {err}"
    );

    blocker.execute_batch("ROLLBACK").unwrap();
    drop(blocker);

    assert_eq!(lake.silver().history().unwrap().len(), 1);
    assert_eq!(lake.silver().row_count().unwrap(), 1);

    let summary = merged(lake.transform(false));
    assert_eq!(summary.previous_checkpoint, id(LOAD_A));
    assert_eq!(summary.checkpoint, id(LOAD_C));
}

#[test]
fn missing_bronze_table_is_an_error() {
    let lake = Lake::new();
    let mut config = lake.config(false);
    config.source_table = "nope".to_string();

    let err = IncrementalLoader::new(&config).run().unwrap_err();
    assert!(matches!(err.store_error(), StoreError::MissingTable(_)));
}

fn export_config(lake: &Lake) -> ExportConfig {
    ExportConfig {
        source_db: lake.silver.clone(),
        source_schema: "silver".to_string(),
        source_table: "journeys".to_string(),
        target_db: lake.gold.clone(),
        target_schema: "gold".to_string(),
        target_table: "journeys_data".to_string(),
        retry: RetryPolicy::default(),
        busy_timeout: Duration::ZERO,
    }
}

fn gold_vehicle(path: &Path, line: &str) -> String {
    Connection::open(path)
        .unwrap()
        .query_row(
            "SELECT vehicle FROM journeys_data WHERE line = ?1",
            [line],
            |r| r.get(0),
        )
        .unwrap()
}

#[test]
fn gold_export_updates_matching_keys() {
    let lake = Lake::new();
    lake.seed(&FIXTURE);
    merged(lake.transform(false));

    let summary = export(&export_config(&lake)).unwrap();
    assert_eq!(summary.exported, 3);
    assert_eq!(summary.gold_rows, 3);
    assert_eq!(gold_vehicle(&lake.gold, "3"), "TKL_028");

    // Silver is rebuilt with a different vehicle for line 3.
    let mut changed = FIXTURE;
    changed[0][3] = Some("TKL_777");
    Connection::open(&lake.bronze)
        .unwrap()
        .execute_batch("DELETE FROM journeys_data")
        .unwrap();
    lake.seed(&changed);
    merged(lake.transform(true));

    let summary = export(&export_config(&lake)).unwrap();
    assert_eq!(summary.gold_rows, 3);
    assert_eq!(gold_vehicle(&lake.gold, "3"), "TKL_777");
}
