use log::{error, info};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use std::{
    collections::BTreeMap,
    future::Future,
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tokio::{
    fs::create_dir_all,
    sync::{mpsc, oneshot},
};

use super::{DataSource, Error, InsertOutcome, SeriesPoint, StationFreshness, Summary};
use crate::{
    fs::database_file,
    models::{format_local, parse_local, RawObservation, RollupRow, StationRecord, RAW_COLUMNS},
    rollup::RollupTable,
};

type WriteOperation = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

/// Serializes every write through one task so SQLite never sees two writers
pub struct DatabaseWriter {
    write_tx: mpsc::UnboundedSender<WriteOperation>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Default for DatabaseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseWriter {
    pub fn new() -> Self {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<WriteOperation>();

        let handle = tokio::spawn(async move {
            while let Some(future) = write_rx.recv().await {
                future.await;
            }
        });

        Self {
            write_tx,
            _handle: handle,
        }
    }

    pub async fn execute<T, F, Fut>(&self, pool: SqlitePool, operation: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(SqlitePool) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel::<Result<T, Error>>();

        let write_op = Box::pin(async move {
            let result = operation(pool).await;
            let _ = result_tx.send(result);
        });

        self.write_tx
            .send(write_op)
            .map_err(|_| Error::WriterClosed)?;

        result_rx.await.map_err(|_| Error::WriterClosed)?
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    writer: Arc<DatabaseWriter>,
}

impl Database {
    /// Open (creating if needed) the database inside `path` and run migrations
    pub async fn new(path: &str) -> Result<Self, Error> {
        let db_path = database_file(path);

        if let Some(parent) = db_path.parent() {
            create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .pragma("journal_mode", "WAL")
            .pragma("synchronous", "NORMAL")
            .pragma("busy_timeout", "5000")
            .pragma("cache_size", "-64000")
            .pragma("foreign_keys", "ON")
            .pragma("temp_store", "MEMORY");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            writer: Arc::new(DatabaseWriter::new()),
        };

        db.run_migrations().await?;
        info!("SQLite database initialized at: {}", db_path.display());

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database connectivity and integrity.
    pub async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;

        let result: String = sqlx::query_scalar("PRAGMA quick_check;")
            .fetch_one(&self.pool)
            .await?;
        if result != "ok" {
            return Err(Error::Integrity(result));
        }

        Ok(())
    }

    /// Flush the WAL into the main database file, used before shutdown
    pub async fn checkpoint(&self) {
        match sqlx::query("PRAGMA wal_checkpoint(TRUNCATE);")
            .execute(&self.pool)
            .await
        {
            Ok(_) => info!("WAL checkpoint completed successfully"),
            Err(e) => error!("WAL checkpoint failed: {}", e),
        }
    }

    pub async fn upsert_station(&self, station: StationRecord) -> Result<(), Error> {
        let pool = self.pool.clone();
        let now = OffsetDateTime::now_utc().unix_timestamp();

        self.writer
            .execute(pool, move |pool| async move {
                // Location fields keep their last known value when a refresh lacks them
                sqlx::query(
                    "INSERT INTO stations (alias, pws_id, name, latitude, longitude, tz, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(alias) DO UPDATE SET
                        pws_id = excluded.pws_id,
                        name = COALESCE(excluded.name, stations.name),
                        latitude = COALESCE(excluded.latitude, stations.latitude),
                        longitude = COALESCE(excluded.longitude, stations.longitude),
                        tz = COALESCE(excluded.tz, stations.tz),
                        updated_at = excluded.updated_at",
                )
                .bind(&station.alias)
                .bind(&station.pws_id)
                .bind(&station.name)
                .bind(station.latitude)
                .bind(station.longitude)
                .bind(&station.tz)
                .bind(now)
                .execute(&pool)
                .await?;
                Ok(())
            })
            .await
    }

    pub async fn stations(&self) -> Result<Vec<StationRecord>, Error> {
        let rows = sqlx::query(
            "SELECT alias, pws_id, name, latitude, longitude, tz FROM stations ORDER BY alias",
        )
        .fetch_all(&self.pool)
        .await?;

        let stations = rows
            .into_iter()
            .map(|row| StationRecord {
                alias: row.get("alias"),
                pws_id: row.get("pws_id"),
                name: row.get("name"),
                latitude: row.get("latitude"),
                longitude: row.get("longitude"),
                tz: row.get("tz"),
            })
            .collect();
        Ok(stations)
    }

    /// Insert raw observations, ignoring rows whose `(station_id, local_time)` already exists
    pub async fn insert_raw_observations(
        &self,
        observations: Vec<RawObservation>,
    ) -> Result<InsertOutcome, Error> {
        if observations.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let keyed = observations
            .into_iter()
            .map(|obs| -> Result<_, Error> { Ok((format_local(obs.local_time)?, obs)) })
            .collect::<Result<Vec<_>, Error>>()?;

        let columns = RAW_COLUMNS.join(", ");
        let placeholders = vec!["?"; RAW_COLUMNS.len() + 7].join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO weather_raw (
                station_id, local_time, observed_at, tz, latitude, longitude, {columns}, qc_status
             ) VALUES ({placeholders})"
        );

        let pool = self.pool.clone();
        self.writer
            .execute(pool, move |pool| async move {
                let mut tx = pool.begin().await?;
                let mut outcome = InsertOutcome::default();

                for (local_time, obs) in keyed {
                    let mut query = sqlx::query(&sql)
                        .bind(&obs.station_id)
                        .bind(&local_time)
                        .bind(obs.observed_at.unix_timestamp())
                        .bind(&obs.tz)
                        .bind(obs.latitude)
                        .bind(obs.longitude);
                    for value in obs.metric_values() {
                        query = query.bind(value);
                    }
                    let result = query.bind(obs.qc_status).execute(&mut *tx).await?;

                    if result.rows_affected() > 0 {
                        outcome.inserted += result.rows_affected();
                        outcome.earliest = Some(match outcome.earliest {
                            Some(earliest) => earliest.min(obs.local_time),
                            None => obs.local_time,
                        });
                    }
                }

                tx.commit().await?;
                Ok(outcome)
            })
            .await
    }

    /// Raw observations for every station at or after `since`, ordered by station then time
    pub async fn raw_observations(
        &self,
        since: Option<PrimitiveDateTime>,
    ) -> Result<Vec<RawObservation>, Error> {
        // the empty string sorts before every stored timestamp
        let cutoff = since.map(format_local).transpose()?.unwrap_or_default();
        let rows = sqlx::query(
            "SELECT * FROM weather_raw WHERE local_time >= ? ORDER BY station_id, local_time",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_raw).collect()
    }

    pub async fn latest_raw(&self, station_id: &str) -> Result<Option<RawObservation>, Error> {
        let row = sqlx::query(
            "SELECT * FROM weather_raw WHERE station_id = ? ORDER BY local_time DESC LIMIT 1",
        )
        .bind(station_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_raw).transpose()
    }

    /// Local time of the station's oldest raw row
    pub async fn earliest_raw(&self, station_id: &str) -> Result<Option<PrimitiveDateTime>, Error> {
        let earliest: Option<String> =
            sqlx::query_scalar("SELECT MIN(local_time) FROM weather_raw WHERE station_id = ?")
                .bind(station_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(earliest.as_deref().map(parse_local).transpose()?)
    }

    /// Offset between the station's wall clock and UTC, taken from its newest raw row
    pub async fn station_utc_offset(&self, station_id: &str) -> Result<Option<UtcOffset>, Error> {
        let Some(latest) = self.latest_raw(station_id).await? else {
            return Ok(None);
        };
        let seconds = (latest.local_time.assume_utc() - latest.observed_at).whole_seconds();
        Ok(Some(UtcOffset::from_whole_seconds(seconds as i32)?))
    }

    /// Upsert aggregated rows into `table` in a single transaction
    pub async fn upsert_rollups(&self, table: RollupTable, rows: Vec<RollupRow>) -> Result<u64, Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let keyed = rows
            .into_iter()
            .map(|row| -> Result<_, Error> { Ok((table.format_bucket(row.bucket)?, row)) })
            .collect::<Result<Vec<_>, Error>>()?;

        let metrics: Vec<&'static str> = table.metrics().iter().map(|m| m.column).collect();
        let bucket_column = table.bucket_column();
        let placeholders = vec!["?"; metrics.len() + 3].join(", ");
        let updates = metrics
            .iter()
            .map(|c| format!("{c} = excluded.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} (station_id, {bucket_column}, sample_count, {columns})
             VALUES ({placeholders})
             ON CONFLICT(station_id, {bucket_column}) DO UPDATE SET
                sample_count = excluded.sample_count, {updates}",
            table = table.table_name(),
            columns = metrics.join(", "),
        );

        let pool = self.pool.clone();
        self.writer
            .execute(pool, move |pool| async move {
                let mut tx = pool.begin().await?;
                let mut written = 0;

                for (bucket, row) in keyed {
                    let mut query = sqlx::query(&sql)
                        .bind(&row.station_id)
                        .bind(&bucket)
                        .bind(row.sample_count);
                    for column in &metrics {
                        query = query.bind(row.get(column));
                    }
                    written += query.execute(&mut *tx).await?.rows_affected();
                }

                tx.commit().await?;
                Ok(written)
            })
            .await
    }

    /// Stored rollup rows, optionally for one station, at or after `since`
    pub async fn rollups(
        &self,
        table: RollupTable,
        station_id: Option<&str>,
        since: Option<PrimitiveDateTime>,
    ) -> Result<Vec<RollupRow>, Error> {
        let bucket_column = table.bucket_column();
        let cutoff = match since {
            Some(ts) => table.format_bucket(ts)?,
            None => String::new(),
        };
        let sql = format!(
            "SELECT * FROM {table} WHERE {bucket_column} >= ? AND (? IS NULL OR station_id = ?)
             ORDER BY station_id, {bucket_column}",
            table = table.table_name(),
        );
        let rows = sqlx::query(&sql)
            .bind(cutoff)
            .bind(station_id)
            .bind(station_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<RollupRow, Error> {
                let bucket: String = row.try_get(bucket_column)?;
                let values = table
                    .metrics()
                    .iter()
                    .map(|m| -> Result<_, Error> {
                        Ok((m.column, row.try_get::<Option<f64>, _>(m.column)?))
                    })
                    .collect::<Result<BTreeMap<_, _>, Error>>()?;
                Ok(RollupRow {
                    station_id: row.try_get("station_id")?,
                    bucket: table.parse_bucket(&bucket)?,
                    sample_count: row.try_get("sample_count")?,
                    values,
                })
            })
            .collect()
    }

    /// Time series of one whitelisted column, ordered by time
    pub async fn series(
        &self,
        source: DataSource,
        column: &str,
        station_id: &str,
        since: PrimitiveDateTime,
    ) -> Result<Vec<SeriesPoint>, Error> {
        let column = source.whitelisted(column)?;
        let time_column = source.time_column();
        let sql = format!(
            "SELECT {time_column} AS label, {column} AS value FROM {table}
             WHERE station_id = ? AND {time_column} >= ?
             ORDER BY {time_column}",
            table = source.table_name(),
        );

        let rows = sqlx::query(&sql)
            .bind(station_id)
            .bind(source.format_cutoff(since)?)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<SeriesPoint, Error> {
                Ok(SeriesPoint {
                    label: row.try_get("label")?,
                    value: row.try_get("value")?,
                })
            })
            .collect()
    }

    /// Period summary; `None` when the station has no rows in range
    pub async fn summary(
        &self,
        source: DataSource,
        station_id: &str,
        since: PrimitiveDateTime,
    ) -> Result<Option<Summary>, Error> {
        let sql = format!(
            "SELECT AVG(temp_avg) AS temp_avg, AVG(humidity_avg) AS humidity_avg,
                    AVG(wind_speed_avg) AS wind_speed_avg, SUM(precip_total) AS precip_total,
                    COUNT(*) AS rows
             FROM {table} WHERE station_id = ? AND {time_column} >= ?",
            table = source.table_name(),
            time_column = source.time_column(),
        );

        let row = sqlx::query(&sql)
            .bind(station_id)
            .bind(source.format_cutoff(since)?)
            .fetch_one(&self.pool)
            .await?;

        let rows: i64 = row.try_get("rows")?;
        if rows == 0 {
            return Ok(None);
        }
        Ok(Some(Summary {
            temp_avg: row.try_get("temp_avg")?,
            humidity_avg: row.try_get("humidity_avg")?,
            wind_speed_avg: row.try_get("wind_speed_avg")?,
            precip_total: row.try_get("precip_total")?,
            rows,
        }))
    }

    /// Newest stored key per table for every station that has data anywhere
    pub async fn freshness(&self) -> Result<Vec<StationFreshness>, Error> {
        let mut by_station: BTreeMap<String, StationFreshness> = BTreeMap::new();

        for source in [DataSource::Raw, DataSource::Hourly, DataSource::Daily] {
            let sql = format!(
                "SELECT station_id, MAX({time_column}) AS latest FROM {table} GROUP BY station_id",
                time_column = source.time_column(),
                table = source.table_name(),
            );
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

            for row in rows {
                let station_id: String = row.try_get("station_id")?;
                let latest: Option<String> = row.try_get("latest")?;
                let entry = by_station
                    .entry(station_id.clone())
                    .or_insert_with(|| StationFreshness {
                        station_id,
                        ..Default::default()
                    });
                match source {
                    DataSource::Raw => entry.latest_raw = latest,
                    DataSource::Hourly => entry.latest_hourly = latest,
                    DataSource::Daily => entry.latest_daily = latest,
                }
            }
        }

        Ok(by_station.into_values().collect())
    }

    /// Delete raw rows older than `before`; rollups are left in place
    pub async fn prune_raw(&self, station_id: &str, before: PrimitiveDateTime) -> Result<u64, Error> {
        let cutoff = format_local(before)?;
        let station_id = station_id.to_owned();
        let pool = self.pool.clone();

        self.writer
            .execute(pool, move |pool| async move {
                let result =
                    sqlx::query("DELETE FROM weather_raw WHERE station_id = ? AND local_time < ?")
                        .bind(station_id)
                        .bind(cutoff)
                        .execute(&pool)
                    .await?;
                Ok(result.rows_affected())
            })
            .await
    }
}

fn row_to_raw(row: &SqliteRow) -> Result<RawObservation, Error> {
    let station_id: String = row.try_get("station_id")?;
    let local_time: String = row.try_get("local_time")?;
    let observed_at: i64 = row.try_get("observed_at")?;

    let mut obs = RawObservation::empty(
        &station_id,
        parse_local(&local_time)?,
        OffsetDateTime::from_unix_timestamp(observed_at)?,
    );
    obs.tz = row.try_get("tz")?;
    obs.latitude = row.try_get("latitude")?;
    obs.longitude = row.try_get("longitude")?;
    obs.qc_status = row.try_get("qc_status")?;
    for column in RAW_COLUMNS {
        obs.set_value(column, row.try_get(*column)?);
    }
    Ok(obs)
}
