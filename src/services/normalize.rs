//! Field normalization from bronze records to silver-shaped rows.
//!
//! Every input record yields exactly one output row. Values that are missing
//! or fail to parse become `None` and are left for the sanitizer to drop.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{BronzeRecord, NormalizedRow, RowOrigin};
use crate::utils::{parse_delay, parse_hhmm, parse_recorded_at, split_timestamp};

/// Normalize a batch of bronze records, stamping each row with `processed_at`.
pub fn normalize(records: &[BronzeRecord], processed_at: DateTime<Utc>) -> Vec<NormalizedRow> {
    records
        .iter()
        .map(|record| normalize_record(record, processed_at))
        .collect()
}

/// Normalize a single bronze record.
pub fn normalize_record(record: &BronzeRecord, processed_at: DateTime<Utc>) -> NormalizedRow {
    let id = record.record_id.as_str();

    let recorded = record
        .recorded_at_time
        .as_deref()
        .and_then(|raw| log_failure(id, "recorded_at_time", raw, parse_recorded_at(raw)))
        .map(split_timestamp);

    NormalizedRow {
        date: recorded.map(|(date, _)| date),
        time: recorded.map(|(_, time)| time),
        line: record.line_ref.clone(),
        operator: record.operator_ref.clone(),
        vehicle: record.vehicle_ref.clone(),
        journey_pattern: record.journey_pattern_ref.clone(),
        origin_short_name: record.origin_short_name.clone(),
        destination_short_name: record.destination_short_name.clone(),
        direction: record.direction_ref.clone(),
        longitude: parse_float(id, "longitude", record.longitude.as_deref()),
        latitude: parse_float(id, "latitude", record.latitude.as_deref()),
        speed: record
            .speed
            .as_deref()
            .and_then(|raw| log_failure(id, "speed", raw, raw.trim().parse::<f32>()))
            .filter(|v| v.is_finite()),
        origin_aimed_departure_time: record
            .origin_aimed_departure_time
            .as_deref()
            .and_then(|raw| {
                log_failure(id, "origin_aimed_departure_time", raw, parse_hhmm(raw))
            }),
        delay: record
            .delay
            .as_deref()
            .and_then(|raw| log_failure(id, "delay", raw, parse_delay(raw))),
        update_time: Some(processed_at),
        origin: RowOrigin {
            load_id: record.load_id.clone(),
            record_id: record.record_id.clone(),
        },
    }
}

fn parse_float(id: &str, column: &str, raw: Option<&str>) -> Option<f64> {
    raw.and_then(|raw| log_failure(id, column, raw, raw.trim().parse::<f64>()))
        .filter(|v| v.is_finite())
}

fn log_failure<T, E: std::fmt::Display>(
    record_id: &str,
    column: &str,
    raw: &str,
    result: Result<T, E>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(record_id, column, raw, error = %e, "Unparseable value, setting null");
            None
        }
    }
}
