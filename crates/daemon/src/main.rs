use anyhow::anyhow;
use daemon::{
    get_config_info, setup_logger, station_record, BackfillService, Cli, ObservationService,
    ObservationSource, RateLimiter, RetentionJob, RollupJob,
};
use pws_weather_core::{ensure_dir_exists, Database, PwsClient, StationSpec};
use slog::{debug, error, info, Logger};
use std::{path::PathBuf, sync::Arc, time::Duration};
use time::{OffsetDateTime, PrimitiveDateTime};
use tokio::sync::Mutex;
use tokio::time::interval;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = get_config_info();
    let logger = setup_logger(&cli);

    let stations = cli.stations();
    info!(logger, "PWS Daemon starting...");
    info!(logger, "  Database dir: {}", cli.db_dir());
    info!(logger, "  History cache dir: {}", cli.data_dir());
    info!(logger, "  Fetch interval: {} seconds", cli.sleep_interval());
    for station in &stations {
        info!(logger, "  Station: {}", station);
    }
    if stations.is_empty() {
        return Err(anyhow!(
            "no stations configured, pass --station alias=PWSID or add [[stations]] to daemon.toml"
        ));
    }

    let db = Database::new(&cli.db_dir()).await?;
    let source: Arc<dyn ObservationSource> = Arc::new(PwsClient::new(
        &cli.base_url(),
        &cli.api_key()?,
        cli.units()?,
        &cli.user_agent(),
    )?);
    let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
        cli.token_capacity(),
        cli.refill_rate(),
    )));

    for station in &stations {
        db.upsert_station(station_record(station, &[])).await?;
    }

    let rollup_job = RollupJob::new(logger.clone(), db.clone());

    if let Some(days) = cli.backfill_days {
        if !ensure_dir_exists(&cli.data_dir()) {
            return Err(anyhow!("history cache dir {} is not usable", cli.data_dir()));
        }
        let backfill = BackfillService::new(
            logger.clone(),
            source.clone(),
            rate_limiter.clone(),
            db.clone(),
            PathBuf::from(cli.data_dir()),
        );
        let mut earliest = None;
        for station in &stations {
            match backfill.backfill(station, days).await {
                Ok(summary) => earliest = earliest_of(earliest, summary.outcome.earliest),
                Err(err) => error!(logger, "Backfill failed for {}: {}", station, err),
            }
        }
        if earliest.is_some() && !cli.rebuild {
            rollup_job.run(earliest).await?;
        }
    }

    if cli.rebuild {
        info!(logger, "Rebuilding all rollups from raw observations");
        rollup_job.run(None).await?;
    }

    let observation_service = ObservationService::new(logger.clone(), source, rate_limiter);

    if cli.once {
        process_data(&cli, &logger, &db, &stations, &observation_service, &rollup_job).await?;
        db.checkpoint().await;
        return Ok(());
    }

    let sleep_between_checks = cli.sleep_interval();
    info!(
        logger,
        "Wait time between data pulls: {} seconds", sleep_between_checks
    );

    let mut check_interval = interval(Duration::from_secs(sleep_between_checks));
    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                match process_data(&cli, &logger, &db, &stations, &observation_service, &rollup_job).await {
                    Ok(_) => info!(logger, "Finished processing data, waiting {} seconds for next run", sleep_between_checks),
                    Err(err) => error!(&logger, "Error processing data: {}", err)
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(logger, "Received shutdown signal, stopping");
                break;
            }
        }
    }

    db.checkpoint().await;
    Ok(())
}

/// One ingest pass: fetch every station, store new rows, roll up what changed, prune
async fn process_data(
    cli: &Cli,
    logger: &Logger,
    db: &Database,
    stations: &[StationSpec],
    observation_service: &ObservationService,
    rollup_job: &RollupJob,
) -> Result<(), anyhow::Error> {
    let mut earliest = None;

    for station in stations {
        let rows = match observation_service.fetch_recent(station).await {
            Ok(rows) => rows,
            Err(err) => {
                error!(logger, "Failed to fetch observations for {}: {}", station, err);
                continue;
            }
        };

        if let Err(err) = db.upsert_station(station_record(station, &rows)).await {
            error!(logger, "Failed to update station {}: {}", station, err);
        }

        match db.insert_raw_observations(rows).await {
            Ok(outcome) => {
                debug!(
                    logger,
                    "{}: {} new raw observations", station.alias, outcome.inserted
                );
                earliest = earliest_of(earliest, outcome.earliest);
            }
            Err(err) => error!(logger, "Failed to store observations for {}: {}", station, err),
        }
    }

    match earliest {
        Some(since) => {
            rollup_job.run(Some(since)).await?;
        }
        None => info!(logger, "No new observations, skipping rollup"),
    }

    if let Some(days) = cli.raw_retention_days {
        RetentionJob::new(logger.clone(), db.clone(), days)
            .run(stations, OffsetDateTime::now_utc())
            .await?;
    }

    Ok(())
}

fn earliest_of(
    current: Option<PrimitiveDateTime>,
    candidate: Option<PrimitiveDateTime>,
) -> Option<PrimitiveDateTime> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
