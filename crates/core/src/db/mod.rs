//! SQLite persistence for raw observations and their rollups

mod sqlite;

pub use sqlite::{Database, DatabaseWriter};

use serde::Serialize;
use time::PrimitiveDateTime;

use crate::models::{format_local, DATE_FORMAT, RAW_COLUMNS};
use crate::rollup::RollupTable;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Database query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("Failed to run database migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to format time: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("Failed to parse stored time: {0}")]
    TimeParse(#[from] time::error::Parse),
    #[error("Stored timestamp out of range: {0}")]
    TimeRange(#[from] time::error::ComponentRange),
    #[error("Unknown column `{column}` for {table}")]
    UnknownColumn { table: &'static str, column: String },
    #[error("Database integrity check failed: {0}")]
    Integrity(String),
    #[error("Database writer channel closed")]
    WriterClosed,
}

/// Table a query reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Raw,
    Hourly,
    Daily,
}

impl DataSource {
    pub fn table_name(&self) -> &'static str {
        match self {
            DataSource::Raw => "weather_raw",
            DataSource::Hourly => RollupTable::Hourly.table_name(),
            DataSource::Daily => RollupTable::Daily.table_name(),
        }
    }

    pub fn time_column(&self) -> &'static str {
        match self {
            DataSource::Raw => "local_time",
            DataSource::Hourly => RollupTable::Hourly.bucket_column(),
            DataSource::Daily => RollupTable::Daily.bucket_column(),
        }
    }

    /// Metric columns a caller may select from this source
    pub fn columns(&self) -> Vec<&'static str> {
        match self {
            DataSource::Raw => RAW_COLUMNS.to_vec(),
            DataSource::Hourly => RollupTable::Hourly.metrics().iter().map(|m| m.column).collect(),
            DataSource::Daily => RollupTable::Daily.metrics().iter().map(|m| m.column).collect(),
        }
    }

    /// Map a requested column onto the static name it is allowed under
    pub fn whitelisted(&self, column: &str) -> Result<&'static str, Error> {
        self.columns()
            .into_iter()
            .find(|c| *c == column)
            .ok_or_else(|| Error::UnknownColumn {
                table: self.table_name(),
                column: column.to_owned(),
            })
    }

    /// Lower bound, as stored text, for rows at or after `ts`
    pub fn format_cutoff(&self, ts: PrimitiveDateTime) -> Result<String, time::error::Format> {
        match self {
            DataSource::Daily => ts.date().format(DATE_FORMAT),
            DataSource::Raw | DataSource::Hourly => format_local(ts),
        }
    }
}

impl From<RollupTable> for DataSource {
    fn from(table: RollupTable) -> Self {
        match table {
            RollupTable::Hourly => DataSource::Hourly,
            RollupTable::Daily => DataSource::Daily,
        }
    }
}

/// Result of a raw insert; `earliest` is the oldest local time actually added
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub earliest: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub temp_avg: Option<f64>,
    pub humidity_avg: Option<f64>,
    pub wind_speed_avg: Option<f64>,
    pub precip_total: Option<f64>,
    pub rows: i64,
}

/// Latest stored timestamp per table for one station
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StationFreshness {
    pub station_id: String,
    pub latest_raw: Option<String>,
    pub latest_hourly: Option<String>,
    pub latest_daily: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn whitelist_accepts_known_columns_only() {
        assert_eq!(DataSource::Raw.whitelisted("temp_avg").unwrap(), "temp_avg");
        assert_eq!(DataSource::Daily.whitelisted("temp_high").unwrap(), "temp_high");
        assert!(DataSource::Hourly.whitelisted("temp_high").is_err());
        assert!(matches!(
            DataSource::Raw.whitelisted("temp_avg; DROP TABLE weather_raw"),
            Err(Error::UnknownColumn { table: "weather_raw", .. })
        ));
    }

    #[test]
    fn cutoff_matches_stored_key_format() {
        let ts = datetime!(2025-08-18 12:34:56);
        assert_eq!(DataSource::Raw.format_cutoff(ts).unwrap(), "2025-08-18 12:34:56");
        assert_eq!(DataSource::Daily.format_cutoff(ts).unwrap(), "2025-08-18");
    }
}
