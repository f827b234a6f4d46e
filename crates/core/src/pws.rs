//! Client for the weather.com Personal Weather Station API

use log::debug;
use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};

use crate::models::{parse_local, RawObservation};

pub const DEFAULT_BASE_URL: &str = "https://api.weather.com";

/// Provider limit on the span of one history request
pub const MAX_HISTORY_DAYS: i64 = 31;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to send request: {0}")]
    Request(#[from] reqwest_middleware::Error),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Unauthorized (401), check the API key")]
    Unauthorized,
    #[error("Forbidden (403), the API key might lack permissions")]
    Forbidden,
    #[error("Unexpected response {0}: {1}")]
    Status(u16, String),
    #[error("No API key configured")]
    MissingApiKey,
    #[error("Invalid observation time `{0}`: {1}")]
    Time(String, time::error::Parse),
    #[error("Failed to format date: {0}")]
    Format(#[from] time::error::Format),
}

/// Unit system requested from the provider; it decides which measurement block comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    #[default]
    Imperial,
    Metric,
    UkHybrid,
}

impl Units {
    pub fn code(&self) -> &'static str {
        match self {
            Units::Imperial => "e",
            Units::Metric => "m",
            Units::UkHybrid => "h",
        }
    }
}

impl FromStr for Units {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "e" | "imperial" => Ok(Units::Imperial),
            "m" | "metric" => Ok(Units::Metric),
            "h" | "uk_hybrid" => Ok(Units::UkHybrid),
            other => Err(format!("unknown units `{}`, expected e, m or h", other)),
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationsResponse {
    #[serde(default)]
    pub observations: Vec<PwsObservation>,
}

/// A summarized observation, as returned by `observations/all/1day` and `history/hourly`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PwsObservation {
    #[serde(rename = "stationID")]
    pub station_id: String,
    pub tz: Option<String>,
    pub obs_time_utc: String,
    pub obs_time_local: String,
    pub epoch: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub solar_radiation_high: Option<f64>,
    pub uv_high: Option<f64>,
    pub winddir_avg: Option<f64>,
    pub humidity_high: Option<f64>,
    pub humidity_low: Option<f64>,
    pub humidity_avg: Option<f64>,
    pub qc_status: Option<i64>,
    #[serde(rename = "imperial", alias = "metric", alias = "uk_hybrid", default)]
    pub measurements: Measurements,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    pub temp_high: Option<f64>,
    pub temp_low: Option<f64>,
    pub temp_avg: Option<f64>,
    pub windspeed_high: Option<f64>,
    pub windspeed_low: Option<f64>,
    pub windspeed_avg: Option<f64>,
    pub windgust_high: Option<f64>,
    pub windgust_low: Option<f64>,
    pub windgust_avg: Option<f64>,
    pub dewpt_high: Option<f64>,
    pub dewpt_low: Option<f64>,
    pub dewpt_avg: Option<f64>,
    pub windchill_high: Option<f64>,
    pub windchill_low: Option<f64>,
    pub windchill_avg: Option<f64>,
    pub heatindex_high: Option<f64>,
    pub heatindex_low: Option<f64>,
    pub heatindex_avg: Option<f64>,
    pub pressure_max: Option<f64>,
    pub pressure_min: Option<f64>,
    pub pressure_trend: Option<f64>,
    pub precip_rate: Option<f64>,
    pub precip_total: Option<f64>,
}

impl PwsObservation {
    /// Convert into a raw row stored under `alias`
    pub fn into_raw(self, alias: &str) -> Result<RawObservation, Error> {
        let local_time = parse_local(&self.obs_time_local)
            .map_err(|e| Error::Time(self.obs_time_local.clone(), e))?;
        let observed_at = OffsetDateTime::parse(&self.obs_time_utc, &Rfc3339)
            .map_err(|e| Error::Time(self.obs_time_utc.clone(), e))?;

        let m = self.measurements;
        let mut raw = RawObservation::empty(alias, local_time, observed_at);
        raw.tz = self.tz;
        raw.latitude = self.lat;
        raw.longitude = self.lon;
        raw.temp_avg = m.temp_avg;
        raw.temp_min = m.temp_low;
        raw.temp_max = m.temp_high;
        raw.humidity_avg = self.humidity_avg;
        raw.humidity_min = self.humidity_low;
        raw.humidity_max = self.humidity_high;
        raw.wind_speed_avg = m.windspeed_avg;
        raw.wind_speed_min = m.windspeed_low;
        raw.wind_speed_max = m.windspeed_high;
        raw.wind_gust_max = m.windgust_high;
        raw.wind_dir_avg = self.winddir_avg;
        raw.dew_point_avg = m.dewpt_avg;
        raw.windchill_avg = m.windchill_avg;
        raw.heatindex_avg = m.heatindex_avg;
        raw.pressure_max = m.pressure_max;
        raw.pressure_min = m.pressure_min;
        raw.pressure_trend = m.pressure_trend;
        raw.precip_rate = m.precip_rate;
        raw.precip_total = m.precip_total;
        raw.solar_rad_max = self.solar_radiation_high;
        raw.uv_max = self.uv_high;
        raw.qc_status = self.qc_status;
        Ok(raw)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentResponse {
    #[serde(default)]
    pub observations: Vec<CurrentObservation>,
}

/// Latest reading from `observations/current`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentObservation {
    #[serde(rename = "stationID")]
    pub station_id: String,
    pub obs_time_utc: Option<String>,
    pub obs_time_local: Option<String>,
    pub neighborhood: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub solar_radiation: Option<f64>,
    pub uv: Option<f64>,
    pub winddir: Option<f64>,
    pub humidity: Option<f64>,
    #[serde(rename = "imperial", alias = "metric", alias = "uk_hybrid", default)]
    pub measurements: CurrentMeasurements,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentMeasurements {
    pub temp: Option<f64>,
    pub heat_index: Option<f64>,
    pub dewpt: Option<f64>,
    pub wind_chill: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_gust: Option<f64>,
    pub pressure: Option<f64>,
    pub precip_rate: Option<f64>,
    pub precip_total: Option<f64>,
    pub elev: Option<f64>,
}

pub struct PwsClient {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
    units: Units,
}

impl PwsClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        units: Units,
        user_agent: &str,
    ) -> Result<Self, Error> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey);
        }
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(
            Client::builder()
                .user_agent(user_agent)
                .timeout(Duration::from_secs(20))
                .build()?,
        )
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            units,
        })
    }

    /// Every 5-minute summary from the last 24 hours
    pub async fn recent_observations(&self, pws_id: &str) -> Result<Vec<PwsObservation>, Error> {
        let response: ObservationsResponse = self
            .get_json("/v2/pws/observations/all/1day", pws_id, vec![])
            .await?;
        Ok(response.observations)
    }

    /// Hourly history between two dates, inclusive. Spans longer than
    /// [`MAX_HISTORY_DAYS`] are rejected by the provider.
    pub async fn history_hourly(
        &self,
        pws_id: &str,
        start: Date,
        end: Date,
    ) -> Result<Vec<PwsObservation>, Error> {
        let compact = format_description!("[year][month][day]");
        let extra = vec![
            ("startDate", start.format(compact)?),
            ("endDate", end.format(compact)?),
        ];
        let response: ObservationsResponse = self
            .get_json("/v2/pws/history/hourly", pws_id, extra)
            .await?;
        Ok(response.observations)
    }

    pub async fn current(&self, pws_id: &str) -> Result<Option<CurrentObservation>, Error> {
        let response: CurrentResponse = self
            .get_json("/v2/pws/observations/current", pws_id, vec![])
            .await?;
        Ok(response.observations.into_iter().next())
    }

    async fn get_json<T: DeserializeOwned + Default>(
        &self,
        path: &str,
        pws_id: &str,
        extra: Vec<(&str, String)>,
    ) -> Result<T, Error> {
        let url = format!("{}{}", self.base_url, path);
        debug!("requesting: {} stationId={}", url, pws_id);

        let mut query = vec![
            ("stationId", pws_id.to_owned()),
            ("format", "json".to_owned()),
            ("units", self.units.code().to_owned()),
            ("apiKey", self.api_key.clone()),
        ];
        query.extend(extra);

        let response = self.client.get(&url).query(&query).send().await?;
        let status = response.status();
        match status {
            StatusCode::NO_CONTENT => return Ok(T::default()),
            StatusCode::UNAUTHORIZED => return Err(Error::Unauthorized),
            StatusCode::FORBIDDEN => return Err(Error::Forbidden),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Status(s.as_u16(), body));
            }
            _ => {}
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&body)?)
    }
}
