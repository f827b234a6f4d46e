use crate::helpers::{no_live, spawn_app, weather_with_offset, MockWeatherAccess};
use axum::http::StatusCode;
use pws_weather_core::{DataSource, SeriesPoint};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn graph_returns_labels_and_values_in_order() {
    let mut weather_data = weather_with_offset();
    weather_data
        .expect_series()
        .withf(|station_id, source, column, _| {
            station_id == "propdada" && *source == DataSource::Daily && column == "temp_high"
        })
        .times(1)
        .returning(|_, _, _, _| {
            Ok(vec![
                SeriesPoint {
                    label: "2025-08-01".to_owned(),
                    value: Some(78.1),
                },
                SeriesPoint {
                    label: "2025-08-02".to_owned(),
                    value: None,
                },
            ])
        });

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (status, body) = test_app
        .get_json("/api/graph_data?station_id=KORMCMIN133&period=30d&column=temp_high")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "labels": ["2025-08-01", "2025-08-02"],
            "data": [78.1, null]
        })
    );
}

#[tokio::test]
async fn graph_accepts_week_and_month_periods() {
    let mut weather_data = weather_with_offset();
    weather_data
        .expect_series()
        .times(2)
        .returning(|_, _, _, _| Ok(vec![]));

    let test_app = spawn_app(Arc::new(weather_data), no_live()).await;
    let (week, _) = test_app
        .get_json("/api/graph_data?station_id=propdada&period=week&column=temp_avg")
        .await;
    let (month, _) = test_app
        .get_json("/api/graph_data?station_id=propdada&period=month&column=temp_low")
        .await;

    assert_eq!(week, StatusCode::OK);
    assert_eq!(month, StatusCode::OK);
}

#[tokio::test]
async fn graph_requires_every_parameter() {
    let test_app = spawn_app(Arc::new(MockWeatherAccess::new()), no_live()).await;

    for uri in [
        "/api/graph_data?period=7d&column=temp_avg",
        "/api/graph_data?station_id=propdada&column=temp_avg",
        "/api/graph_data?station_id=propdada&period=7d",
        "/api/graph_data?station_id=propdada&period=7d&column=",
    ] {
        let (status, body) = test_app.get_json(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body, json!({ "error": "Missing parameters" }), "{}", uri);
    }
}

#[tokio::test]
async fn graph_rejects_column_outside_the_period_table() {
    let test_app = spawn_app(Arc::new(MockWeatherAccess::new()), no_live()).await;

    // temp_high only exists on the daily table
    let (status, body) = test_app
        .get_json("/api/graph_data?station_id=propdada&period=1d&column=temp_high")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid column for 1d: temp_high" }));

    let (status, _) = test_app
        .get_json("/api/graph_data?station_id=propdada&period=7d&column=temp_avg;DROP%20TABLE%20weather_raw")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn graph_rejects_unknown_period() {
    let test_app = spawn_app(Arc::new(MockWeatherAccess::new()), no_live()).await;
    let (status, body) = test_app
        .get_json("/api/graph_data?station_id=propdada&period=90d&column=temp_avg")
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid period" }));
}
