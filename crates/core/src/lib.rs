//! PWS Weather Core Library
//!
//! Shared pieces of the daemon and dashboard services:
//! - Configuration loading (XDG-compliant) and the station registry
//! - The weather.com PWS client
//! - Observation models and the hourly/daily rollup engine
//! - SQLite storage

mod config;
pub mod db;
pub mod fs;
pub mod models;
pub mod pws;
pub mod rollup;
mod stations;

pub use config::{find_config_file, get_xdg_data_dir, load_config, ConfigSource};
pub use db::{Database, DataSource, InsertOutcome, SeriesPoint, StationFreshness, Summary};
pub use fs::{create_dir_all, ensure_dir_exists};
pub use models::{RawObservation, RollupRow, Sample, StationRecord};
pub use pws::{PwsClient, Units};
pub use rollup::{aggregate, Aggregation, Bucket, MetricSpec, RollupTable};
pub use stations::{StationDirectory, StationSpec};

/// Application name used for XDG paths
pub const APP_NAME: &str = "pws-weather";

/// SQLite file created inside the configured database directory
pub const DATABASE_FILE: &str = "weather.sqlite";

/// Default dashboard port
pub const DEFAULT_DASHBOARD_PORT: u16 = 9810;

/// Default daemon fetch interval (5 minutes, the provider's sampling rate)
pub const DEFAULT_FETCH_INTERVAL: u64 = 300;
