use async_trait::async_trait;
use pws_weather_core::{
    db,
    pws::{self, CurrentObservation},
    DataSource, Database, PwsClient, RawObservation, SeriesPoint, StationFreshness,
    StationRecord, Summary,
};
use time::{PrimitiveDateTime, UtcOffset};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to query weather database: {0}")]
    Query(#[from] db::Error),
}

/// Read access to stored observations and rollups
#[async_trait]
pub trait WeatherData: Sync + Send {
    async fn summary(
        &self,
        station_id: &str,
        source: DataSource,
        since: PrimitiveDateTime,
    ) -> Result<Option<Summary>, Error>;
    async fn series(
        &self,
        station_id: &str,
        source: DataSource,
        column: &str,
        since: PrimitiveDateTime,
    ) -> Result<Vec<SeriesPoint>, Error>;
    async fn latest(&self, station_id: &str) -> Result<Option<RawObservation>, Error>;
    /// Station clock offset from UTC, if the station has any raw rows
    async fn utc_offset(&self, station_id: &str) -> Result<Option<UtcOffset>, Error>;
    async fn freshness(&self) -> Result<Vec<StationFreshness>, Error>;
    async fn stations(&self) -> Result<Vec<StationRecord>, Error>;
    async fn health_check(&self) -> Result<(), Error>;
}

pub struct WeatherAccess {
    db: Database,
}

impl WeatherAccess {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WeatherData for WeatherAccess {
    async fn summary(
        &self,
        station_id: &str,
        source: DataSource,
        since: PrimitiveDateTime,
    ) -> Result<Option<Summary>, Error> {
        Ok(self.db.summary(source, station_id, since).await?)
    }

    async fn series(
        &self,
        station_id: &str,
        source: DataSource,
        column: &str,
        since: PrimitiveDateTime,
    ) -> Result<Vec<SeriesPoint>, Error> {
        Ok(self.db.series(source, column, station_id, since).await?)
    }

    async fn latest(&self, station_id: &str) -> Result<Option<RawObservation>, Error> {
        Ok(self.db.latest_raw(station_id).await?)
    }

    async fn utc_offset(&self, station_id: &str) -> Result<Option<UtcOffset>, Error> {
        Ok(self.db.station_utc_offset(station_id).await?)
    }

    async fn freshness(&self) -> Result<Vec<StationFreshness>, Error> {
        Ok(self.db.freshness().await?)
    }

    async fn stations(&self) -> Result<Vec<StationRecord>, Error> {
        Ok(self.db.stations().await?)
    }

    async fn health_check(&self) -> Result<(), Error> {
        Ok(self.db.health_check().await?)
    }
}

/// Live conditions straight from the provider
#[async_trait]
pub trait LiveWeather: Sync + Send {
    async fn current(&self, pws_id: &str) -> Result<Option<CurrentObservation>, pws::Error>;
}

#[async_trait]
impl LiveWeather for PwsClient {
    async fn current(&self, pws_id: &str) -> Result<Option<CurrentObservation>, pws::Error> {
        PwsClient::current(self, pws_id).await
    }
}

/// Used when no API key is configured; every live request falls back to stored data
pub struct NoLiveWeather;

#[async_trait]
impl LiveWeather for NoLiveWeather {
    async fn current(&self, _pws_id: &str) -> Result<Option<CurrentObservation>, pws::Error> {
        Err(pws::Error::MissingApiKey)
    }
}
