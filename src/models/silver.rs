//! Normalized silver rows and the primary key that makes them unique.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use super::LoadId;

/// Silver column names in table order.
pub const SILVER_COLUMNS: [&str; 15] = [
    "date",
    "time",
    "line",
    "operator",
    "vehicle",
    "journey_pattern",
    "origin_short_name",
    "destination_short_name",
    "direction",
    "longitude",
    "latitude",
    "speed",
    "origin_aimed_departure_time",
    "delay",
    "update_time",
];

/// Columns of the silver primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PkColumn {
    Date,
    Time,
    Line,
    Direction,
    OriginAimedDepartureTime,
}

impl PkColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Time => "time",
            Self::Line => "line",
            Self::Direction => "direction",
            Self::OriginAimedDepartureTime => "origin_aimed_departure_time",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            "line" => Some(Self::Line),
            "direction" => Some(Self::Direction),
            "origin_aimed_departure_time" => Some(Self::OriginAimedDepartureTime),
            _ => None,
        }
    }
}

/// The silver primary key, in declaration order.
pub const PRIMARY_KEY: [PkColumn; 5] = [
    PkColumn::Date,
    PkColumn::Time,
    PkColumn::Line,
    PkColumn::Direction,
    PkColumn::OriginAimedDepartureTime,
];

/// Where a row came from in bronze. Not part of the silver schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOrigin {
    pub load_id: LoadId,
    pub record_id: String,
}

/// A row after field normalization. `None` marks a value that was missing
/// or failed to parse.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub line: Option<String>,
    pub operator: Option<String>,
    pub vehicle: Option<String>,
    pub journey_pattern: Option<String>,
    pub origin_short_name: Option<String>,
    pub destination_short_name: Option<String>,
    pub direction: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub speed: Option<f32>,
    pub origin_aimed_departure_time: Option<NaiveTime>,
    pub delay: Option<i64>,
    pub update_time: Option<DateTime<Utc>>,
    pub origin: RowOrigin,
}

impl NormalizedRow {
    /// Names of the silver columns that hold no value.
    pub fn null_columns(&self) -> Vec<&'static str> {
        let present = [
            self.date.is_some(),
            self.time.is_some(),
            self.line.is_some(),
            self.operator.is_some(),
            self.vehicle.is_some(),
            self.journey_pattern.is_some(),
            self.origin_short_name.is_some(),
            self.destination_short_name.is_some(),
            self.direction.is_some(),
            self.longitude.is_some(),
            self.latitude.is_some(),
            self.speed.is_some(),
            self.origin_aimed_departure_time.is_some(),
            self.delay.is_some(),
            self.update_time.is_some(),
        ];
        SILVER_COLUMNS
            .iter()
            .zip(present)
            .filter(|(_, p)| !p)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Convert into a complete row, or give the row back if any column is null.
    pub fn into_complete(self) -> Result<SilverRow, Self> {
        match self {
            NormalizedRow {
                date: Some(date),
                time: Some(time),
                line: Some(line),
                operator: Some(operator),
                vehicle: Some(vehicle),
                journey_pattern: Some(journey_pattern),
                origin_short_name: Some(origin_short_name),
                destination_short_name: Some(destination_short_name),
                direction: Some(direction),
                longitude: Some(longitude),
                latitude: Some(latitude),
                speed: Some(speed),
                origin_aimed_departure_time: Some(origin_aimed_departure_time),
                delay: Some(delay),
                update_time: Some(update_time),
                origin,
            } => Ok(SilverRow {
                date,
                time,
                line,
                operator,
                vehicle,
                journey_pattern,
                origin_short_name,
                destination_short_name,
                direction,
                longitude,
                latitude,
                speed,
                origin_aimed_departure_time,
                delay,
                update_time,
                origin: Some(origin),
            }),
            incomplete => Err(incomplete),
        }
    }

    /// Total order over all columns, nulls first, for stable audit output.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.time.cmp(&other.time))
            .then_with(|| self.line.cmp(&other.line))
            .then_with(|| self.operator.cmp(&other.operator))
            .then_with(|| self.vehicle.cmp(&other.vehicle))
            .then_with(|| self.journey_pattern.cmp(&other.journey_pattern))
            .then_with(|| self.origin_short_name.cmp(&other.origin_short_name))
            .then_with(|| self.destination_short_name.cmp(&other.destination_short_name))
            .then_with(|| self.direction.cmp(&other.direction))
            .then_with(|| cmp_opt(self.longitude, other.longitude, f64::total_cmp))
            .then_with(|| cmp_opt(self.latitude, other.latitude, f64::total_cmp))
            .then_with(|| cmp_opt(self.speed, other.speed, f32::total_cmp))
            .then_with(|| {
                self.origin_aimed_departure_time
                    .cmp(&other.origin_aimed_departure_time)
            })
            .then_with(|| self.delay.cmp(&other.delay))
            .then_with(|| self.update_time.cmp(&other.update_time))
            .then_with(|| self.origin.load_id.cmp(&other.origin.load_id))
            .then_with(|| self.origin.record_id.cmp(&other.origin.record_id))
    }
}

fn cmp_opt<T: Copy>(a: Option<T>, b: Option<T>, cmp: fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => cmp(&a, &b),
    }
}

fn show<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}

impl fmt::Display for NormalizedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} line={} op={} vehicle={} pattern={} {}->{} dir={} lon={} lat={} speed={} aimed={} delay={} (load {}, id {})",
            show(&self.date),
            show(&self.time),
            show(&self.line),
            show(&self.operator),
            show(&self.vehicle),
            show(&self.journey_pattern),
            show(&self.origin_short_name),
            show(&self.destination_short_name),
            show(&self.direction),
            show(&self.longitude),
            show(&self.latitude),
            show(&self.speed),
            show(&self.origin_aimed_departure_time),
            show(&self.delay),
            self.origin.load_id,
            self.origin.record_id,
        )
    }
}

/// A complete silver row. Rows read back from storage carry no origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SilverRow {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub line: String,
    pub operator: String,
    pub vehicle: String,
    pub journey_pattern: String,
    pub origin_short_name: String,
    pub destination_short_name: String,
    pub direction: String,
    pub longitude: f64,
    pub latitude: f64,
    pub speed: f32,
    pub origin_aimed_departure_time: NaiveTime,
    pub delay: i64,
    pub update_time: DateTime<Utc>,
    pub origin: Option<RowOrigin>,
}

/// One value of a primary-key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Date(NaiveDate),
    Time(NaiveTime),
    Text(String),
}

impl SilverRow {
    /// The values of `columns`, in the given order.
    pub fn key(&self, columns: &[PkColumn]) -> Vec<KeyPart> {
        columns
            .iter()
            .map(|column| match column {
                PkColumn::Date => KeyPart::Date(self.date),
                PkColumn::Time => KeyPart::Time(self.time),
                PkColumn::Line => KeyPart::Text(self.line.clone()),
                PkColumn::Direction => KeyPart::Text(self.direction.clone()),
                PkColumn::OriginAimedDepartureTime => {
                    KeyPart::Time(self.origin_aimed_departure_time)
                }
            })
            .collect()
    }

    /// Total order over all columns for stable audit output.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.time.cmp(&other.time))
            .then_with(|| self.line.cmp(&other.line))
            .then_with(|| self.operator.cmp(&other.operator))
            .then_with(|| self.vehicle.cmp(&other.vehicle))
            .then_with(|| self.journey_pattern.cmp(&other.journey_pattern))
            .then_with(|| self.origin_short_name.cmp(&other.origin_short_name))
            .then_with(|| self.destination_short_name.cmp(&other.destination_short_name))
            .then_with(|| self.direction.cmp(&other.direction))
            .then_with(|| self.longitude.total_cmp(&other.longitude))
            .then_with(|| self.latitude.total_cmp(&other.latitude))
            .then_with(|| self.speed.total_cmp(&other.speed))
            .then_with(|| {
                self.origin_aimed_departure_time
                    .cmp(&other.origin_aimed_departure_time)
            })
            .then_with(|| self.delay.cmp(&other.delay))
            .then_with(|| self.update_time.cmp(&other.update_time))
            .then_with(|| {
                let a = self.origin.as_ref().map(|o| (&o.load_id, &o.record_id));
                let b = other.origin.as_ref().map(|o| (&o.load_id, &o.record_id));
                a.cmp(&b)
            })
    }
}

impl fmt::Display for SilverRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} line={} op={} vehicle={} pattern={} {}->{} dir={} lon={} lat={} speed={} aimed={} delay={}",
            self.date,
            self.time,
            self.line,
            self.operator,
            self.vehicle,
            self.journey_pattern,
            self.origin_short_name,
            self.destination_short_name,
            self.direction,
            self.longitude,
            self.latitude,
            self.speed,
            self.origin_aimed_departure_time,
            self.delay,
        )?;
        if let Some(origin) = &self.origin {
            write!(f, " (load {}, id {})", origin.load_id, origin.record_id)?;
        }
        Ok(())
    }
}
