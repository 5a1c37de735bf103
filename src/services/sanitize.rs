//! Removal of rows with missing values.

use tracing::warn;

use crate::models::{NormalizedRow, SilverRow};

/// Rows kept and dropped by [`drop_nulls`].
#[derive(Debug, Default)]
pub struct SanitizeOutcome {
    pub kept: Vec<SilverRow>,
    /// Dropped rows, sorted by all columns.
    pub dropped: Vec<NormalizedRow>,
}

/// Keep only rows with a value in every silver column.
///
/// Each dropped row is logged together with the columns that were null.
pub fn drop_nulls(rows: Vec<NormalizedRow>) -> SanitizeOutcome {
    let mut outcome = SanitizeOutcome::default();

    for row in rows {
        match row.into_complete() {
            Ok(complete) => outcome.kept.push(complete),
            Err(incomplete) => outcome.dropped.push(incomplete),
        }
    }

    outcome.dropped.sort_by(|a, b| a.display_cmp(b));

    if !outcome.dropped.is_empty() {
        warn!(
            "Dropping {} rows with null values",
            outcome.dropped.len()
        );
        for row in &outcome.dropped {
            warn!(null_columns = ?row.null_columns(), "  {}", row);
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RowOrigin;
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn row(record_id: &str) -> NormalizedRow {
        NormalizedRow {
            date: NaiveDate::from_ymd_opt(2014, 10, 5),
            time: NaiveTime::from_hms_opt(23, 19, 0),
            line: Some("3".to_string()),
            operator: Some("TKL".to_string()),
            vehicle: Some("TKL_028".to_string()),
            journey_pattern: Some("3V".to_string()),
            origin_short_name: Some("3615".to_string()),
            destination_short_name: Some("1028".to_string()),
            direction: Some("1".to_string()),
            longitude: Some(23.69),
            latitude: Some(61.52),
            speed: Some(10.0),
            origin_aimed_departure_time: NaiveTime::from_hms_opt(22, 40, 0),
            delay: Some(0),
            update_time: Some(Utc::now()),
            origin: RowOrigin {
                load_id: "1".parse().unwrap(),
                record_id: record_id.to_string(),
            },
        }
    }

    #[test]
    fn test_drop_nulls_partitions_input() {
        let mut no_line = row("b");
        no_line.line = None;
        let mut no_date = row("c");
        no_date.date = None;
        no_date.time = None;

        let outcome = drop_nulls(vec![row("a"), no_line, no_date, row("d")]);

        assert_eq!(outcome.kept.len(), 2);
        assert_eq!(outcome.dropped.len(), 2);
        // Null date sorts first.
        assert_eq!(outcome.dropped[0].origin.record_id, "c");
        assert_eq!(outcome.dropped[1].origin.record_id, "b");
    }

    #[test]
    fn test_drop_nulls_counts_add_up() {
        let inputs: Vec<NormalizedRow> = (0..10)
            .map(|i| {
                let mut r = row(&i.to_string());
                if i % 3 == 0 {
                    r.delay = None;
                }
                r
            })
            .collect();

        let outcome = drop_nulls(inputs);
        assert_eq!(outcome.kept.len() + outcome.dropped.len(), 10);
        assert_eq!(outcome.dropped.len(), 4);
        assert!(outcome.dropped.iter().all(|r| !r.null_columns().is_empty()));
    }

    #[test]
    fn test_drop_nulls_empty() {
        let outcome = drop_nulls(Vec::new());
        assert!(outcome.kept.is_empty());
        assert!(outcome.dropped.is_empty());
    }
}
