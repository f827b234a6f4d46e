use anyhow::{anyhow, Error};
use pws_weather_core::{
    pws::{ObservationsResponse, MAX_HISTORY_DAYS},
    Bucket, Database, InsertOutcome, RawObservation, StationSpec,
};
use slog::{debug, error, info, Logger};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};
use time::{macros::format_description, Date, Duration, OffsetDateTime, PrimitiveDateTime};
use tokio::sync::Mutex;

use crate::{station_local_now, to_raw_rows, ObservationSource, RateLimiter};

/// Last day a backfill may request.
///
/// The 1-day feed reaches back into yesterday, so history stops the day before
/// that, and before the first day the station already has raw rows for.
pub fn backfill_end(today: Date, earliest_raw: Option<PrimitiveDateTime>) -> Date {
    let end = today - Duration::days(2);
    match earliest_raw {
        Some(earliest) => end.min(earliest.date() - Duration::days(1)),
        None => end,
    }
}

/// Split `[start, end]` into consecutive windows the history endpoint accepts
pub fn history_windows(start: Date, end: Date) -> Vec<(Date, Date)> {
    let mut windows = vec![];
    let mut current = start;
    while current <= end {
        let window_end = (current + Duration::days(MAX_HISTORY_DAYS - 1)).min(end);
        windows.push((current, window_end));
        current += Duration::days(MAX_HISTORY_DAYS);
    }
    windows
}

/// `<data_dir>/<alias>/<pws_id>_<YYYYMMDD>_<YYYYMMDD>.json`
pub fn cache_path(
    data_dir: &Path,
    station: &StationSpec,
    start: Date,
    end: Date,
) -> Result<PathBuf, Error> {
    let compact = format_description!("[year][month][day]");
    let file_name = format!(
        "{}_{}_{}.json",
        station.pws_id,
        start.format(compact)?,
        end.format(compact)?
    );
    Ok(data_dir.join(&station.alias).join(file_name))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillSummary {
    pub windows: usize,
    pub from_cache: usize,
    pub fetched: usize,
    pub failed: usize,
    /// history rows dropped because their hour already holds 5-minute samples
    pub overlapping: usize,
    pub outcome: InsertOutcome,
}

impl BackfillSummary {
    fn record(&mut self, outcome: InsertOutcome) {
        self.outcome.inserted += outcome.inserted;
        self.outcome.earliest = match (self.outcome.earliest, outcome.earliest) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

pub struct BackfillService {
    pub logger: Logger,
    pub source: Arc<dyn ObservationSource>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    pub db: Database,
    pub data_dir: PathBuf,
}

impl BackfillService {
    pub fn new(
        logger: Logger,
        source: Arc<dyn ObservationSource>,
        rate_limiter: Arc<Mutex<RateLimiter>>,
        db: Database,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            logger,
            source,
            rate_limiter,
            db,
            data_dir,
        }
    }

    /// Load up to `days` days of hourly history for a station into the raw table,
    /// stopping short of the span the 5-minute feed covers
    pub async fn backfill(&self, station: &StationSpec, days: u32) -> Result<BackfillSummary, Error> {
        let today = station_local_now(&self.db, station, OffsetDateTime::now_utc())
            .await?
            .date();
        let start = today - Duration::days(days as i64);
        let end = backfill_end(today, self.db.earliest_raw(&station.alias).await?);
        if start > end {
            info!(
                self.logger,
                "nothing to backfill for {}, history would have to end by {}", station, end
            );
        }
        self.backfill_range(station, start, end).await
    }

    pub async fn backfill_range(
        &self,
        station: &StationSpec,
        start: Date,
        end: Date,
    ) -> Result<BackfillSummary, Error> {
        let mut summary = BackfillSummary::default();
        let today = station_local_now(&self.db, station, OffsetDateTime::now_utc())
            .await?
            .date();

        for (window_start, window_end) in history_windows(start, end) {
            summary.windows += 1;
            let path = cache_path(&self.data_dir, station, window_start, window_end)?;

            let response = if path.exists() {
                debug!(self.logger, "using cached history {}", path.display());
                summary.from_cache += 1;
                read_cache(&path).await?
            } else {
                match self.fetch_window(station, window_start, window_end).await {
                    Ok(response) => {
                        summary.fetched += 1;
                        if window_end >= today {
                            debug!(
                                self.logger,
                                "window {} to {} is still open, not cached", window_start, window_end
                            );
                        } else if !response.observations.is_empty() {
                            write_cache(&path, &response).await?;
                        } else {
                            info!(
                                self.logger,
                                "no history for {} {} to {}, nothing cached",
                                station,
                                window_start,
                                window_end
                            );
                        }
                        response
                    }
                    Err(e) => {
                        error!(
                            self.logger,
                            "history fetch for {} {} to {} failed: {}",
                            station,
                            window_start,
                            window_end,
                            e
                        );
                        summary.failed += 1;
                        continue;
                    }
                }
            };

            let rows = to_raw_rows(&self.logger, &station.alias, response.observations);
            let fetched = rows.len();
            let rows = self.drop_covered_hours(station, rows).await?;
            summary.overlapping += fetched - rows.len();
            let outcome = self.db.insert_raw_observations(rows).await?;
            summary.record(outcome);
        }

        info!(
            self.logger,
            "backfill for {}: {} windows ({} cached, {} fetched, {} failed), {} new rows, {} overlapping",
            station,
            summary.windows,
            summary.from_cache,
            summary.fetched,
            summary.failed,
            summary.outcome.inserted,
            summary.overlapping
        );
        Ok(summary)
    }

    /// Hourly summaries must not land in an hour that already has raw samples,
    /// or the rollup would count both
    async fn drop_covered_hours(
        &self,
        station: &StationSpec,
        rows: Vec<RawObservation>,
    ) -> Result<Vec<RawObservation>, Error> {
        let Some(first) = rows.iter().map(|r| r.local_time).min() else {
            return Ok(rows);
        };
        let covered: HashSet<PrimitiveDateTime> = self
            .db
            .raw_observations(Some(Bucket::Hour.truncate(first)))
            .await?
            .into_iter()
            .filter(|r| r.station_id == station.alias)
            .map(|r| Bucket::Hour.truncate(r.local_time))
            .collect();

        Ok(rows
            .into_iter()
            .filter(|r| !covered.contains(&Bucket::Hour.truncate(r.local_time)))
            .collect())
    }

    async fn fetch_window(
        &self,
        station: &StationSpec,
        start: Date,
        end: Date,
    ) -> Result<ObservationsResponse, Error> {
        self.rate_limiter.lock().await.acquire().await?;
        info!(
            self.logger,
            "requesting history for {} {} to {}", station, start, end
        );
        let observations = self.source.history(&station.pws_id, start, end).await?;
        Ok(ObservationsResponse { observations })
    }
}

async fn read_cache(path: &Path) -> Result<ObservationsResponse, Error> {
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow!("invalid cached history {}: {}", path.display(), e))
}

async fn write_cache(path: &Path, response: &ObservationsResponse) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, serde_json::to_string_pretty(response)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pws_weather_core::pws::{self, PwsObservation};
    use slog::{o, Discard};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::date;

    /// Returns one noon-hour summary per requested window, or nothing when `empty`
    struct CountingSource {
        calls: AtomicUsize,
        empty: bool,
        last_end: std::sync::Mutex<Option<Date>>,
    }

    impl CountingSource {
        fn new(empty: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                empty,
                last_end: std::sync::Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ObservationSource for CountingSource {
        async fn recent(&self, _pws_id: &str) -> Result<Vec<PwsObservation>, pws::Error> {
            Ok(vec![])
        }

        async fn history(
            &self,
            pws_id: &str,
            start: Date,
            end: Date,
        ) -> Result<Vec<PwsObservation>, pws::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_end.lock().unwrap() = Some(end);
            if self.empty {
                return Ok(vec![]);
            }
            let obs = serde_json::from_value(serde_json::json!({
                "stationID": pws_id,
                "obsTimeUtc": format!("{}T19:59:59Z", start),
                "obsTimeLocal": format!("{} 12:59:59", start),
                "imperial": { "tempAvg": 70.0, "precipTotal": 0.1 }
            }))
            .unwrap();
            Ok(vec![obs])
        }
    }

    async fn service(source: Arc<CountingSource>) -> (tempfile::TempDir, BackfillService) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("db").to_str().unwrap())
            .await
            .unwrap();
        let service = BackfillService::new(
            Logger::root(Discard, o!()),
            source,
            Arc::new(Mutex::new(RateLimiter::new(10, 10.0))),
            db,
            dir.path().join("history"),
        );
        (dir, service)
    }

    fn station() -> StationSpec {
        "propdada=KORMCMIN133".parse().unwrap()
    }

    #[test]
    fn windows_cover_range_in_31_day_steps() {
        let windows = history_windows(date!(2025 - 01 - 01), date!(2025 - 03 - 05));
        assert_eq!(
            windows,
            vec![
                (date!(2025 - 01 - 01), date!(2025 - 01 - 31)),
                (date!(2025 - 02 - 01), date!(2025 - 03 - 03)),
                (date!(2025 - 03 - 04), date!(2025 - 03 - 05)),
            ]
        );
        assert_eq!(
            history_windows(date!(2025 - 01 - 01), date!(2025 - 01 - 01)).len(),
            1
        );
        assert!(history_windows(date!(2025 - 01 - 02), date!(2025 - 01 - 01)).is_empty());
    }

    #[test]
    fn cache_path_is_per_alias() {
        let path = cache_path(
            Path::new("/data"),
            &station(),
            date!(2025 - 01 - 01),
            date!(2025 - 01 - 31),
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/data/propdada/KORMCMIN133_20250101_20250131.json")
        );
    }

    #[tokio::test]
    async fn second_backfill_reads_from_cache() {
        let source = Arc::new(CountingSource::new(false));
        let (_dir, service) = service(source.clone()).await;
        let (start, end) = (date!(2025 - 01 - 01), date!(2025 - 02 - 10));

        let first = service.backfill_range(&station(), start, end).await.unwrap();
        assert_eq!(first.windows, 2);
        assert_eq!(first.fetched, 2);
        assert_eq!(first.outcome.inserted, 2);
        assert_eq!(
            first.outcome.earliest,
            Some(time::macros::datetime!(2025-01-01 12:59:59))
        );
        assert!(cache_path(&service.data_dir, &station(), start, date!(2025 - 01 - 31))
            .unwrap()
            .exists());

        let second = service.backfill_range(&station(), start, end).await.unwrap();
        assert_eq!(second.from_cache, 2);
        assert_eq!(second.outcome.inserted, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    fn five_minute_hour(day: Date) -> Vec<RawObservation> {
        (0..12)
            .map(|i| {
                let local = PrimitiveDateTime::new(day, time::macros::time!(12:00))
                    + Duration::minutes(5 * i);
                let mut obs = RawObservation::empty(
                    "propdada",
                    local,
                    local.assume_utc() + Duration::hours(7),
                );
                obs.temp_avg = Some(60.0);
                obs.precip_total = Some(0.01);
                obs
            })
            .collect()
    }

    #[test]
    fn backfill_stops_before_the_recent_feed_and_existing_rows() {
        let today = date!(2025 - 08 - 18);
        assert_eq!(backfill_end(today, None), date!(2025 - 08 - 16));
        assert_eq!(
            backfill_end(today, Some(time::macros::datetime!(2025-08-10 14:05:00))),
            date!(2025 - 08 - 09)
        );
        assert_eq!(
            backfill_end(today, Some(time::macros::datetime!(2025-08-18 00:05:00))),
            date!(2025 - 08 - 16)
        );
    }

    #[tokio::test]
    async fn history_for_hours_with_samples_leaves_rollups_unchanged() {
        let source = Arc::new(CountingSource::new(false));
        let (_dir, service) = service(source.clone()).await;
        let day = date!(2025 - 01 - 01);
        service
            .db
            .insert_raw_observations(five_minute_hour(day))
            .await
            .unwrap();

        let summary = service.backfill_range(&station(), day, day).await.unwrap();
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.overlapping, 1);
        assert_eq!(summary.outcome.inserted, 0);

        let rollup = crate::RollupJob::new(Logger::root(Discard, o!()), service.db.clone());
        rollup.run(None).await.unwrap();
        let hours = service
            .db
            .rollups(pws_weather_core::RollupTable::Hourly, Some("propdada"), None)
            .await
            .unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[0].sample_count, 12);
        assert!((hours[0].get("precip_total").unwrap() - 0.12).abs() < 1e-9);
    }

    #[tokio::test]
    async fn backfill_never_requests_days_the_feed_already_filled() {
        let source = Arc::new(CountingSource::new(false));
        let (_dir, service) = service(source.clone()).await;
        // rows sit at UTC-7, so the station's today follows that offset
        let now = OffsetDateTime::now_utc().to_offset(time::macros::offset!(-7));
        let yesterday = now.date() - Duration::days(1);
        service
            .db
            .insert_raw_observations(five_minute_hour(yesterday))
            .await
            .unwrap();

        let summary = service.backfill(&station(), 5).await.unwrap();
        assert_eq!(summary.windows, 1);
        let end = source.last_end.lock().unwrap().unwrap();
        assert!(end < yesterday);
        assert_eq!(summary.overlapping, 0);
    }

    #[tokio::test]
    async fn window_reaching_today_is_not_cached() {
        let source = Arc::new(CountingSource::new(false));
        let (_dir, service) = service(source.clone()).await;
        let today = OffsetDateTime::now_utc().date();
        let start = today - Duration::days(3);

        let first = service.backfill_range(&station(), start, today).await.unwrap();
        assert_eq!(first.fetched, 1);
        assert!(!cache_path(&service.data_dir, &station(), start, today)
            .unwrap()
            .exists());

        let second = service.backfill_range(&station(), start, today).await.unwrap();
        assert_eq!(second.from_cache, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_windows_are_not_cached() {
        let source = Arc::new(CountingSource::new(true));
        let (_dir, service) = service(source.clone()).await;
        let (start, end) = (date!(2025 - 01 - 01), date!(2025 - 01 - 10));

        let summary = service.backfill_range(&station(), start, end).await.unwrap();
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.outcome.inserted, 0);
        assert!(!cache_path(&service.data_dir, &station(), start, end)
            .unwrap()
            .exists());

        service.backfill_range(&station(), start, end).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
