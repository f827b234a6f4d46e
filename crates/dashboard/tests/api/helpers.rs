use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use dashboard::{app, db::Error, AppState, LiveWeather, WeatherData};
use hyper::Method;
use mockall::mock;
use pws_weather_core::{
    pws::{self, CurrentObservation},
    DataSource, RawObservation, SeriesPoint, StationDirectory, StationFreshness, StationRecord,
    StationSpec, Summary,
};
use std::sync::Arc;
use time::{PrimitiveDateTime, UtcOffset};
use tower::ServiceExt;

mock! {
    pub WeatherAccess {}
    #[async_trait]
    impl WeatherData for WeatherAccess {
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
        async fn utc_offset(&self, station_id: &str) -> Result<Option<UtcOffset>, Error>;
        async fn freshness(&self) -> Result<Vec<StationFreshness>, Error>;
        async fn stations(&self) -> Result<Vec<StationRecord>, Error>;
        async fn health_check(&self) -> Result<(), Error>;
    }
}

mock! {
    pub LiveAccess {}
    #[async_trait]
    impl LiveWeather for LiveAccess {
        async fn current(&self, pws_id: &str) -> Result<Option<CurrentObservation>, pws::Error>;
    }
}

pub struct TestApp {
    pub app: Router,
}

pub async fn spawn_app(weather_db: Arc<dyn WeatherData>, live: Arc<dyn LiveWeather>) -> TestApp {
    let app_state = AppState {
        remote_url: "http://127.0.0.1:9810".to_owned(),
        static_dir: "./static".to_owned(),
        stations: StationDirectory::new(vec![
            StationSpec::new("propdada", "KORMCMIN133"),
            StationSpec::new("dustprop", "KORMCMIN127"),
        ]),
        weather_db,
        live,
    };

    TestApp { app: app(app_state) }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request.");

        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = self.get(uri).await;
        (status, serde_json::from_str(&body).unwrap())
    }
}

/// Mock that expects only the station clock lookup
pub fn weather_with_offset() -> MockWeatherAccess {
    let mut weather_data = MockWeatherAccess::new();
    weather_data
        .expect_utc_offset()
        .returning(|_| Ok(Some(UtcOffset::from_hms(-7, 0, 0).unwrap())));
    weather_data
}

pub fn no_live() -> Arc<MockLiveAccess> {
    Arc::new(MockLiveAccess::new())
}
