use anyhow::Error;
use pws_weather_core::{Bucket, Database, StationSpec};
use slog::{debug, info, Logger};
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Station wall-clock time at `now`, using the offset seen in its newest raw row (UTC if none)
pub async fn station_local_now(
    db: &Database,
    station: &StationSpec,
    now: OffsetDateTime,
) -> Result<PrimitiveDateTime, Error> {
    let offset = db
        .station_utc_offset(&station.alias)
        .await?
        .unwrap_or(UtcOffset::UTC);
    let local = now.to_offset(offset);
    Ok(PrimitiveDateTime::new(local.date(), local.time()))
}

/// Oldest station-local time kept when retaining `days` days of raw rows.
///
/// Always on an hour boundary, and never inside the last day plus one hour,
/// which the 1-day observation feed can still return.
pub fn retention_cutoff(local_now: PrimitiveDateTime, days: u32) -> PrimitiveDateTime {
    let by_days = Bucket::Day.truncate(local_now - Duration::days(days as i64));
    let refetch_floor = Bucket::Hour.truncate(local_now - Duration::days(1) - Duration::hours(1));
    by_days.min(refetch_floor)
}

/// Drops raw observations past the retention window; rollups are kept
pub struct RetentionJob {
    pub logger: Logger,
    pub db: Database,
    pub days: u32,
}

impl RetentionJob {
    pub fn new(logger: Logger, db: Database, days: u32) -> Self {
        Self { logger, db, days }
    }

    pub async fn run(&self, stations: &[StationSpec], now: OffsetDateTime) -> Result<u64, Error> {
        let mut total = 0;
        for station in stations {
            let cutoff = retention_cutoff(station_local_now(&self.db, station, now).await?, self.days);
            let pruned = self.db.prune_raw(&station.alias, cutoff).await?;
            debug!(
                self.logger,
                "{}: pruned {} raw observations before {}", station.alias, pruned, cutoff
            );
            total += pruned;
        }
        if total > 0 {
            info!(
                self.logger,
                "Pruned {} raw observations older than {} days", total, self.days
            );
        }
        Ok(total)
    }
}
