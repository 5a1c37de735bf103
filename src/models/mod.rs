//! Data models for the bronze, silver, and checkpoint tables.

mod bronze;
mod checkpoint;
mod load_id;
mod silver;

pub use bronze::{columns as bronze_columns, BronzeRecord};
pub use checkpoint::Checkpoint;
pub use load_id::{LoadId, LoadIdError};
pub use silver::{
    KeyPart, NormalizedRow, PkColumn, RowOrigin, SilverRow, PRIMARY_KEY, SILVER_COLUMNS,
};
