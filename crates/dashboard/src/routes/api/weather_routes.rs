use axum::{
    extract::{Query, State},
    Json,
};
use log::warn;
use pws_weather_core::{models::format_local, pws::CurrentObservation, DataSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use utoipa::{IntoParams, ToSchema};

use crate::{AppState, ApiError, ErrorBody, Period};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SummaryQuery {
    /// Station alias or PWS id
    pub station_id: Option<String>,
    /// One of 1d, 7d, 30d, week, month, ytd (default 30d)
    pub period: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GraphQuery {
    /// Station alias or PWS id
    pub station_id: Option<String>,
    /// One of 1d, 7d, 30d, week, month, ytd
    pub period: Option<String>,
    /// Metric column of the table backing the period
    pub column: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StationQuery {
    /// Station alias or PWS id
    pub station_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SummaryData {
    pub temp_avg: Option<f64>,
    pub humidity_avg: Option<f64>,
    pub wind_speed_avg: Option<f64>,
    pub precip_total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GraphData {
    pub labels: Vec<String>,
    pub data: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CurrentConditions {
    pub timestamp: Option<String>,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub precip: Option<f64>,
    /// true when the values come from the database instead of the live provider
    pub fallback: bool,
}

impl From<CurrentObservation> for CurrentConditions {
    fn from(obs: CurrentObservation) -> Self {
        CurrentConditions {
            timestamp: obs.obs_time_local,
            temp: obs.measurements.temp,
            humidity: obs.humidity,
            wind_speed: obs.measurements.wind_speed,
            precip: obs.measurements.precip_total,
            fallback: false,
        }
    }
}

fn round_to(value: Option<f64>, places: i32) -> Option<f64> {
    let factor = 10f64.powi(places);
    value.map(|v| (v * factor).round() / factor)
}

/// Current wall-clock time at the station, used as the end of every period
async fn station_now(state: &AppState, station_id: &str) -> Result<PrimitiveDateTime, ApiError> {
    let offset = state
        .weather_db
        .utc_offset(station_id)
        .await?
        .unwrap_or(UtcOffset::UTC);
    let now = OffsetDateTime::now_utc().to_offset(offset);
    Ok(PrimitiveDateTime::new(now.date(), now.time()))
}

#[utoipa::path(
    get,
    path = "/api/summary_data",
    params(SummaryQuery),
    responses(
        (status = OK, description = "Averages and precipitation total for the period", body = SummaryData),
        (status = BAD_REQUEST, description = "Missing station_id or invalid period", body = ErrorBody),
        (status = NOT_FOUND, description = "No data for the station in the period", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to query weather data", body = ErrorBody)
    ))]
pub async fn summary_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<SummaryData>, ApiError> {
    let station_id = query
        .station_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing station_id"))?;
    let period: Period = query
        .period
        .as_deref()
        .unwrap_or("30d")
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid period"))?;

    let alias = state.stations.alias_for(&station_id);
    let now = station_now(&state, alias).await?;
    let summary = state
        .weather_db
        .summary(alias, period.source(), period.cutoff(now))
        .await?
        .ok_or_else(|| ApiError::not_found("No data found"))?;

    Ok(Json(SummaryData {
        temp_avg: round_to(summary.temp_avg, 1),
        humidity_avg: round_to(summary.humidity_avg, 1),
        wind_speed_avg: round_to(summary.wind_speed_avg, 1),
        precip_total: round_to(summary.precip_total, 2),
    }))
}

#[utoipa::path(
    get,
    path = "/api/graph_data",
    params(GraphQuery),
    responses(
        (status = OK, description = "Time-ordered series of one column", body = GraphData),
        (status = BAD_REQUEST, description = "Missing parameters, invalid period or column", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to query weather data", body = ErrorBody)
    ))]
pub async fn graph_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GraphQuery>,
) -> Result<Json<GraphData>, ApiError> {
    let (Some(station_id), Some(period), Some(column)) = (
        query.station_id.filter(|s| !s.is_empty()),
        query.period.filter(|s| !s.is_empty()),
        query.column.filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Missing parameters"));
    };

    let period: Period = period
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid period"))?;
    let source: DataSource = period.source();
    let column = source
        .whitelisted(&column)
        .map_err(|_| ApiError::bad_request(format!("Invalid column for {}: {}", period, column)))?;

    let alias = state.stations.alias_for(&station_id);
    let now = station_now(&state, alias).await?;
    let points = state
        .weather_db
        .series(alias, source, column, period.cutoff(now))
        .await?;

    let (labels, data) = points.into_iter().map(|p| (p.label, p.value)).unzip();
    Ok(Json(GraphData { labels, data }))
}

async fn stored_conditions(
    state: &AppState,
    station_id: &str,
) -> Result<CurrentConditions, ApiError> {
    let latest = state
        .weather_db
        .latest(station_id)
        .await?
        .ok_or_else(|| ApiError::not_found("No data found"))?;

    Ok(CurrentConditions {
        timestamp: format_local(latest.local_time).ok(),
        temp: latest.temp_avg,
        humidity: latest.humidity_avg,
        wind_speed: latest.wind_speed_avg,
        precip: latest.precip_total,
        fallback: true,
    })
}

#[utoipa::path(
    get,
    path = "/api/current_data",
    params(StationQuery),
    responses(
        (status = OK, description = "Most recent stored observation", body = CurrentConditions),
        (status = BAD_REQUEST, description = "Missing station_id", body = ErrorBody),
        (status = NOT_FOUND, description = "No stored observations", body = ErrorBody)
    ))]
pub async fn current_data(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StationQuery>,
) -> Result<Json<CurrentConditions>, ApiError> {
    let station_id = query
        .station_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing station_id"))?;

    let alias = state.stations.alias_for(&station_id);
    Ok(Json(stored_conditions(&state, alias).await?))
}

#[utoipa::path(
    get,
    path = "/api/current_data_live",
    params(StationQuery),
    responses(
        (status = OK, description = "Live provider observation, or the stored one with fallback set", body = CurrentConditions),
        (status = BAD_REQUEST, description = "Missing station_id", body = ErrorBody),
        (status = NOT_FOUND, description = "Live lookup failed and nothing is stored", body = ErrorBody)
    ))]
pub async fn current_data_live(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StationQuery>,
) -> Result<Json<CurrentConditions>, ApiError> {
    let station_id = query
        .station_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing station_id"))?;

    let pws_id = state.stations.pws_id_for(&station_id);
    match state.live.current(pws_id).await {
        Ok(Some(obs)) => return Ok(Json(obs.into())),
        Ok(None) => warn!("live API returned no observation for {}, using stored data", pws_id),
        Err(e) => warn!("live API failed for {}, using stored data: {}", pws_id, e),
    }

    let alias = state.stations.alias_for(&station_id);
    Ok(Json(stored_conditions(&state, alias).await?))
}
