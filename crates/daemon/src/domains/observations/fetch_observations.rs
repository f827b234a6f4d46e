use anyhow::Error;
use async_trait::async_trait;
use pws_weather_core::{
    pws::{self, PwsObservation},
    PwsClient, RawObservation, StationRecord, StationSpec,
};
use slog::{debug, info, warn, Logger};
use std::sync::Arc;
use time::Date;
use tokio::sync::Mutex;

use crate::RateLimiter;

/// Where summarized station observations come from
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn recent(&self, pws_id: &str) -> Result<Vec<PwsObservation>, pws::Error>;
    async fn history(
        &self,
        pws_id: &str,
        start: Date,
        end: Date,
    ) -> Result<Vec<PwsObservation>, pws::Error>;
}

#[async_trait]
impl ObservationSource for PwsClient {
    async fn recent(&self, pws_id: &str) -> Result<Vec<PwsObservation>, pws::Error> {
        self.recent_observations(pws_id).await
    }

    async fn history(
        &self,
        pws_id: &str,
        start: Date,
        end: Date,
    ) -> Result<Vec<PwsObservation>, pws::Error> {
        self.history_hourly(pws_id, start, end).await
    }
}

/// Convert provider observations into raw rows for `alias`, skipping any that fail to parse
pub fn to_raw_rows(
    logger: &Logger,
    alias: &str,
    observations: Vec<PwsObservation>,
) -> Vec<RawObservation> {
    let total = observations.len();
    let rows: Vec<RawObservation> = observations
        .into_iter()
        .filter_map(|obs| match obs.into_raw(alias) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!(logger, "skipping observation for {}: {}", alias, e);
                None
            }
        })
        .collect();

    if rows.len() < total {
        warn!(
            logger,
            "kept {} of {} observations for {}",
            rows.len(),
            total,
            alias
        );
    }
    rows
}

/// Station row refreshed with the location the provider reports
pub fn station_record(station: &StationSpec, rows: &[RawObservation]) -> StationRecord {
    let located = rows.iter().rev().find(|r| r.latitude.is_some());
    StationRecord {
        alias: station.alias.clone(),
        pws_id: station.pws_id.clone(),
        name: station.name.clone(),
        latitude: located.and_then(|r| r.latitude),
        longitude: located.and_then(|r| r.longitude),
        tz: rows.iter().rev().find_map(|r| r.tz.clone()),
    }
}

pub struct ObservationService {
    pub logger: Logger,
    pub source: Arc<dyn ObservationSource>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ObservationService {
    pub fn new(
        logger: Logger,
        source: Arc<dyn ObservationSource>,
        rate_limiter: Arc<Mutex<RateLimiter>>,
    ) -> Self {
        ObservationService {
            logger,
            source,
            rate_limiter,
        }
    }

    /// The last 24 hours of 5-minute observations for one station
    pub async fn fetch_recent(&self, station: &StationSpec) -> Result<Vec<RawObservation>, Error> {
        self.rate_limiter.lock().await.acquire().await?;

        info!(self.logger, "fetching recent observations for {}", station);
        let observations = self.source.recent(&station.pws_id).await?;
        debug!(
            self.logger,
            "received {} observations for {}",
            observations.len(),
            station.alias
        );

        Ok(to_raw_rows(&self.logger, &station.alias, observations))
    }
}
