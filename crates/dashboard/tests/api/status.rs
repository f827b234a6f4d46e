use crate::helpers::{no_live, spawn_app, MockWeatherAccess};
use axum::http::StatusCode;
use dashboard::db::Error;
use pws_weather_core::{db, StationFreshness, StationRecord};
use serde_json::json;
use std::sync::Arc;

fn stored_stations() -> Vec<StationRecord> {
    vec![
        StationRecord {
            alias: "propdada".to_owned(),
            pws_id: "KORMCMIN133".to_owned(),
            name: Some("McMinnville".to_owned()),
            latitude: Some(45.21),
            longitude: Some(-123.2),
            tz: Some("America/Los_Angeles".to_owned()),
        },
        StationRecord {
            alias: "retired".to_owned(),
            pws_id: "KORRETIRED1".to_owned(),
            name: None,
            latitude: None,
            longitude: None,
            tz: None,
        },
    ]
}

fn stored_freshness() -> Vec<StationFreshness> {
    vec![StationFreshness {
        station_id: "propdada".to_owned(),
        latest_raw: Some("2025-08-18 12:05:00".to_owned()),
        latest_hourly: Some("2025-08-18 12:00:00".to_owned()),
        latest_daily: Some("2025-08-18".to_owned()),
    }]
}

#[tokio::test]
async fn stations_merge_configuration_with_stored_records() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_stations()
        .times(1)
        .returning(|| Ok(stored_stations()));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, body) = test_app.get_json("/api/stations").await;

    assert_eq!(status, StatusCode::OK);
    let stations = body.as_array().unwrap();
    assert_eq!(stations.len(), 3);
    assert_eq!(stations[0]["alias"], json!("propdada"));
    assert_eq!(stations[0]["tz"], json!("America/Los_Angeles"));
    assert_eq!(stations[1]["alias"], json!("dustprop"));
    assert_eq!(stations[1]["latitude"], json!(null));
    assert_eq!(stations[2]["pws_id"], json!("KORRETIRED1"));
}

#[tokio::test]
async fn freshness_lists_latest_timestamps() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_freshness()
        .times(1)
        .returning(|| Ok(stored_freshness()));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, body) = test_app.get_json("/api/freshness").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{
            "station_id": "propdada",
            "latest_raw": "2025-08-18 12:05:00",
            "latest_hourly": "2025-08-18 12:00:00",
            "latest_daily": "2025-08-18"
        }])
    );
}

#[tokio::test]
async fn database_failure_is_internal_error() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_freshness()
        .returning(|| Err(Error::Query(db::Error::WriterClosed)));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, body) = test_app.get_json("/api/freshness").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to query weather data" }));
}

#[tokio::test]
async fn health_reports_database_state() {
    let mut healthy = MockWeatherAccess::new();
    healthy.expect_health_check().returning(|| Ok(()));
    let test_app = spawn_app(Arc::new(healthy), no_live()).await;
    let (status, body) = test_app.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let mut broken = MockWeatherAccess::new();
    broken
        .expect_health_check()
        .returning(|| Err(Error::Query(db::Error::Integrity("page 3".to_owned()))));
    let test_app = spawn_app(Arc::new(broken), no_live()).await;
    let (status, _) = test_app.get_json("/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn status_page_renders_stations_and_freshness() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_stations()
        .returning(|| Ok(stored_stations()));
    weather_data
        .expect_freshness()
        .returning(|| Ok(stored_freshness()));
    weather_data.expect_health_check().returning(|| Ok(()));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, html) = test_app.get("/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("KORMCMIN133"));
    assert!(html.contains("KORMCMIN127"));
    assert!(html.contains("2025-08-18 12:05:00"));
    assert!(html.contains("Database OK"));
}

#[tokio::test]
async fn status_page_survives_database_errors() {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_stations()
        .returning(|| Err(Error::Query(db::Error::WriterClosed)));
    weather_data
        .expect_freshness()
        .returning(|| Err(Error::Query(db::Error::WriterClosed)));
    weather_data
        .expect_health_check()
        .returning(|| Err(Error::Query(db::Error::WriterClosed)));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, html) = test_app.get("/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Database unavailable"));
    assert!(html.contains("No stations configured."));
}
