use crate::helpers::{no_live, spawn_app, weather_with_offset, MockWeatherAccess};
use axum::http::StatusCode;
use pws_weather_core::{DataSource, Summary};
use serde_json::json;
use std::sync::Arc;

fn mock_summary() -> Summary {
    Summary {
        temp_avg: Some(61.26),
        humidity_avg: Some(72.04),
        wind_speed_avg: Some(3.349),
        precip_total: Some(0.125_1),
        rows: 48,
    }
}

#[tokio::test]
async fn summary_is_rounded_and_defaults_to_thirty_days() {
    let mut weather_data = weather_with_offset();
    weather_data
        .expect_summary()
        .withf(|station_id, source, _| station_id == "propdada" && *source == DataSource::Daily)
        .times(1)
        .returning(|_, _, _| Ok(Some(mock_summary())));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, body) = test_app
        .get_json("/api/summary_data?station_id=propdada")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "temp_avg": 61.3,
            "humidity_avg": 72.0,
            "wind_speed_avg": 3.3,
            "precip_total": 0.13
        })
    );
}

#[tokio::test]
async fn summary_resolves_pws_id_to_alias() {
    let mut weather_data = weather_with_offset();
    weather_data
        .expect_summary()
        .withf(|station_id, source, _| station_id == "dustprop" && *source == DataSource::Hourly)
        .times(1)
        .returning(|_, _, _| Ok(Some(mock_summary())));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, _) = test_app
        .get_json("/api/summary_data?station_id=KORMCMIN127&period=7d")
        .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn one_day_summary_reads_raw_rows() {
    let mut weather_data = weather_with_offset();
    weather_data
        .expect_summary()
        .withf(|_, source, _| *source == DataSource::Raw)
        .times(1)
        .returning(|_, _, _| Ok(Some(mock_summary())));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, _) = test_app
        .get_json("/api/summary_data?station_id=propdada&period=1d")
        .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn summary_without_rows_is_not_found() {
    let mut weather_data = weather_with_offset();
    weather_data
        .expect_summary()
        .times(1)
        .returning(|_, _, _| Ok(None));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, body) = test_app
        .get_json("/api/summary_data?station_id=propdada&period=ytd")
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "No data found" }));
}

#[tokio::test]
async fn summary_requires_station_id() {
    let test_app = spawn_app(Arc::new(MockWeatherAccess::new()), no_live()).await;
    let (status, body) = test_app.get_json("/api/summary_data?period=7d").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Missing station_id" }));
}

#[tokio::test]
async fn summary_rejects_unknown_period() {
    let test_app = spawn_app(Arc::new(MockWeatherAccess::new()), no_live()).await;
    let (status, body) = test_app
        .get_json("/api/summary_data?station_id=propdada&period=2y")
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid period" }));
}
