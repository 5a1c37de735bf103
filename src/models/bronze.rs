//! Raw vehicle-activity records as landed in the bronze table.

use super::LoadId;

/// Bronze column names read by the silver transform.
pub mod columns {
    pub const RECORDED_AT_TIME: &str = "recorded_at_time";
    pub const LINE_REF: &str = "monitored_vehicle_journey__line_ref";
    pub const OPERATOR_REF: &str = "monitored_vehicle_journey__operator_ref";
    pub const VEHICLE_REF: &str = "monitored_vehicle_journey__vehicle_ref";
    pub const JOURNEY_PATTERN_REF: &str = "monitored_vehicle_journey__journey_pattern_ref";
    pub const ORIGIN_SHORT_NAME: &str = "monitored_vehicle_journey__origin_short_name";
    pub const DESTINATION_SHORT_NAME: &str = "monitored_vehicle_journey__destination_short_name";
    pub const DIRECTION_REF: &str = "monitored_vehicle_journey__direction_ref";
    pub const LONGITUDE: &str = "monitored_vehicle_journey__vehicle_location__longitude";
    pub const LATITUDE: &str = "monitored_vehicle_journey__vehicle_location__latitude";
    pub const SPEED: &str = "monitored_vehicle_journey__speed";
    pub const ORIGIN_AIMED_DEPARTURE_TIME: &str =
        "monitored_vehicle_journey__origin_aimed_departure_time";
    pub const DELAY: &str = "monitored_vehicle_journey__delay";
    pub const LOAD_ID: &str = "_dlt_load_id";
    pub const RECORD_ID: &str = "_dlt_id";

    /// Columns selected from bronze, in [`super::BronzeRecord`] field order.
    pub const SELECTED: &[&str] = &[
        RECORDED_AT_TIME,
        LINE_REF,
        OPERATOR_REF,
        VEHICLE_REF,
        JOURNEY_PATTERN_REF,
        ORIGIN_SHORT_NAME,
        DESTINATION_SHORT_NAME,
        DIRECTION_REF,
        LONGITUDE,
        LATITUDE,
        SPEED,
        ORIGIN_AIMED_DEPARTURE_TIME,
        DELAY,
        LOAD_ID,
        RECORD_ID,
    ];
}

/// One bronze observation. Every payload field is optional text; bronze does
/// not enforce presence or type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BronzeRecord {
    pub recorded_at_time: Option<String>,
    pub line_ref: Option<String>,
    pub operator_ref: Option<String>,
    pub vehicle_ref: Option<String>,
    pub journey_pattern_ref: Option<String>,
    pub origin_short_name: Option<String>,
    pub destination_short_name: Option<String>,
    pub direction_ref: Option<String>,
    pub longitude: Option<String>,
    pub latitude: Option<String>,
    pub speed: Option<String>,
    pub origin_aimed_departure_time: Option<String>,
    pub delay: Option<String>,
    pub load_id: LoadId,
    pub record_id: String,
}
