use crate::helpers::{no_live, spawn_app, MockLiveAccess, MockWeatherAccess};
use axum::http::StatusCode;
use pws_weather_core::{
    pws::{self, CurrentObservation},
    RawObservation,
};
use serde_json::json;
use std::sync::Arc;
use time::macros::datetime;

fn stored_observation() -> RawObservation {
    let mut obs = RawObservation::empty(
        "propdada",
        datetime!(2025-08-18 12:05:00),
        datetime!(2025-08-18 19:05:00 UTC),
    );
    obs.temp_avg = Some(64.2);
    obs.humidity_avg = Some(71.0);
    obs.wind_speed_avg = Some(2.5);
    obs.precip_total = Some(0.02);
    obs
}

fn live_observation() -> CurrentObservation {
    serde_json::from_value(json!({
        "stationID": "KORMCMIN133",
        "obsTimeLocal": "2025-08-18 12:10:00",
        "humidity": 69.0,
        "imperial": {
            "temp": 65.0,
            "windSpeed": 4.0,
            "precipTotal": 0.03
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn current_returns_latest_stored_row() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_latest()
        .withf(|station_id| station_id == "propdada")
        .times(1)
        .returning(|_| Ok(Some(stored_observation())));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, body) = test_app
        .get_json("/api/current_data?station_id=KORMCMIN133")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "timestamp": "2025-08-18 12:05:00",
            "temp": 64.2,
            "humidity": 71.0,
            "wind_speed": 2.5,
            "precip": 0.02,
            "fallback": true
        })
    );
}

#[tokio::test]
async fn current_without_rows_is_not_found() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data.expect_latest().returning(|_| Ok(None));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, body) = test_app
        .get_json("/api/current_data?station_id=propdada")
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "No data found" }));
}

#[tokio::test]
async fn current_requires_station_id() {
    let test_app = spawn_app(Arc::new(MockWeatherAccess::new()), no_live()).await;
    let (status, body) = test_app.get_json("/api/current_data").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Missing station_id" }));
}

#[tokio::test]
async fn live_conditions_come_from_the_provider() {
    let mut live = MockLiveAccess::new();
    live.expect_current()
        .withf(|pws_id| pws_id == "KORMCMIN133")
        .times(1)
        .returning(|_| Ok(Some(live_observation())));

    let test_app = spawn_app(Arc::new(MockWeatherAccess::new()), Arc::new(live)).await;
    let (status, body) = test_app
        .get_json("/api/current_data_live?station_id=propdada")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "timestamp": "2025-08-18 12:10:00",
            "temp": 65.0,
            "humidity": 69.0,
            "wind_speed": 4.0,
            "precip": 0.03,
            "fallback": false
        })
    );
}

#[tokio::test]
async fn live_failure_falls_back_to_stored_row() {
    let mut live = MockLiveAccess::new();
    live.expect_current()
        .times(1)
        .returning(|_| Err(pws::Error::MissingApiKey));

    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_latest()
        .withf(|station_id| station_id == "propdada")
        .times(1)
        .returning(|_| Ok(Some(stored_observation())));

    let test_app = spawn_app(Arc::new(weather_data), Arc::new(live)).await;
    let (status, body) = test_app
        .get_json("/api/current_data_live?station_id=KORMCMIN133")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], json!(true));
    assert_eq!(body["temp"], json!(64.2));
}

#[tokio::test]
async fn empty_live_response_falls_back_to_stored_row() {
    let mut live = MockLiveAccess::new();
    live.expect_current().times(1).returning(|_| Ok(None));

    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_latest()
        .times(1)
        .returning(|_| Ok(Some(stored_observation())));

    let test_app = spawn_app(Arc::new(weather_data), Arc::new(live)).await;
    let (status, body) = test_app
        .get_json("/api/current_data_live?station_id=propdada")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], json!(true));
}
