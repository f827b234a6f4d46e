use anyhow::Error;
use pws_weather_core::{Bucket, Database, RollupTable};
use slog::{info, Logger};
use time::PrimitiveDateTime;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RollupSummary {
    pub raw_rows: usize,
    pub hourly_rows: usize,
    pub daily_rows: usize,
}

/// Rebuilds hourly buckets from raw rows, then daily buckets from hourly ones
pub struct RollupJob {
    pub logger: Logger,
    pub db: Database,
}

impl RollupJob {
    pub fn new(logger: Logger, db: Database) -> Self {
        Self { logger, db }
    }

    /// Recompute every bucket touched by data at or after `since`; `None` rebuilds everything
    pub async fn run(&self, since: Option<PrimitiveDateTime>) -> Result<RollupSummary, Error> {
        // widen to whole buckets so no bucket is rewritten from a partial view
        let raw = self
            .db
            .raw_observations(since.map(|s| Bucket::Hour.truncate(s)))
            .await?;
        let hourly = RollupTable::Hourly.aggregate(&raw);
        let hourly_rows = hourly.len();
        self.db.upsert_rollups(RollupTable::Hourly, hourly).await?;

        let hours = self
            .db
            .rollups(
                RollupTable::Hourly,
                None,
                since.map(|s| Bucket::Day.truncate(s)),
            )
            .await?;
        let daily = RollupTable::Daily.aggregate(&hours);
        let daily_rows = daily.len();
        self.db.upsert_rollups(RollupTable::Daily, daily).await?;

        let summary = RollupSummary {
            raw_rows: raw.len(),
            hourly_rows,
            daily_rows,
        };
        match since {
            Some(since) => info!(
                self.logger,
                "rollup since {}: {} raw rows -> {} hourly, {} daily",
                since,
                summary.raw_rows,
                summary.hourly_rows,
                summary.daily_rows
            ),
            None => info!(
                self.logger,
                "full rollup: {} raw rows -> {} hourly, {} daily",
                summary.raw_rows,
                summary.hourly_rows,
                summary.daily_rows
            ),
        }
        Ok(summary)
    }
}
