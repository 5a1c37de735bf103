//! transitlake - incremental bronze/silver/gold pipeline for transit
//! vehicle-activity telemetry, stored in SQLite.

#![allow(clippy::should_implement_trait)]

pub mod config;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;
