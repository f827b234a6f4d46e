use axum::{extract::State, http::StatusCode, Json};
use log::error;
use pws_weather_core::{StationFreshness, StationRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{AppState, ApiError, ErrorBody};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Station {
    /// Name used as station_id everywhere in this API
    pub alias: String,
    pub pws_id: String,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub tz: Option<String>,
}

impl From<StationRecord> for Station {
    fn from(record: StationRecord) -> Self {
        Station {
            alias: record.alias,
            pws_id: record.pws_id,
            name: record.name,
            latitude: record.latitude,
            longitude: record.longitude,
            tz: record.tz,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Freshness {
    pub station_id: String,
    /// Local time of the newest raw observation
    pub latest_raw: Option<String>,
    pub latest_hourly: Option<String>,
    pub latest_daily: Option<String>,
}

impl From<StationFreshness> for Freshness {
    fn from(value: StationFreshness) -> Self {
        Freshness {
            station_id: value.station_id,
            latest_raw: value.latest_raw,
            latest_hourly: value.latest_hourly,
            latest_daily: value.latest_daily,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Health {
    pub status: String,
}

/// Configured stations, completed with what the database knows about them
pub async fn station_list(state: &AppState) -> Result<Vec<Station>, ApiError> {
    let mut known = state.weather_db.stations().await?;

    let mut stations: Vec<Station> = state
        .stations
        .all()
        .iter()
        .map(|spec| {
            let stored = known
                .iter()
                .position(|r| r.alias == spec.alias)
                .map(|i| known.remove(i));
            Station {
                alias: spec.alias.clone(),
                pws_id: spec.pws_id.clone(),
                name: spec
                    .name
                    .clone()
                    .or_else(|| stored.as_ref().and_then(|s| s.name.clone())),
                latitude: stored.as_ref().and_then(|s| s.latitude),
                longitude: stored.as_ref().and_then(|s| s.longitude),
                tz: stored.and_then(|s| s.tz),
            }
        })
        .collect();

    stations.extend(known.into_iter().map(Station::from));
    Ok(stations)
}

#[utoipa::path(
    get,
    path = "/api/stations",
    responses(
        (status = OK, description = "Known weather stations", body = Vec<Station>),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to query weather data", body = ErrorBody)
    ))]
pub async fn get_stations(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Station>>, ApiError> {
    Ok(Json(station_list(&state).await?))
}

#[utoipa::path(
    get,
    path = "/api/freshness",
    responses(
        (status = OK, description = "Newest stored timestamp per table and station", body = Vec<Freshness>),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to query weather data", body = ErrorBody)
    ))]
pub async fn freshness(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Freshness>>, ApiError> {
    let freshness = state.weather_db.freshness().await?;
    Ok(Json(freshness.into_iter().map(Freshness::from).collect()))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = OK, description = "Database reachable and intact", body = Health),
        (status = SERVICE_UNAVAILABLE, description = "Database check failed", body = ErrorBody)
    ))]
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Health>, ApiError> {
    state.weather_db.health_check().await.map_err(|e| {
        error!("health check failed: {}", e);
        ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "Database unavailable".to_owned(),
        }
    })?;
    Ok(Json(Health {
        status: "ok".to_owned(),
    }))
}
