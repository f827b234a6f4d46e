use crate::{
    current_data, current_data_live, freshness, get_stations, graph_data, health, routes,
    status_handler, summary_data, LiveWeather, NoLiveWeather, WeatherAccess, WeatherData,
};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::Request,
    middleware::{self, Next},
    response::IntoResponse,
    routing::get,
    Router,
};
use hyper::{
    header::{ACCEPT, CONTENT_TYPE},
    Method,
};
use log::{info, warn};
use pws_weather_core::{Database, PwsClient, StationDirectory, StationSpec, Units};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

#[derive(Clone)]
pub struct AppState {
    pub remote_url: String,
    pub static_dir: String,
    pub stations: StationDirectory,
    pub weather_db: Arc<dyn WeatherData>,
    pub live: Arc<dyn LiveWeather>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::api::weather_routes::summary_data,
        routes::api::weather_routes::graph_data,
        routes::api::weather_routes::current_data,
        routes::api::weather_routes::current_data_live,
        routes::api::status_routes::get_stations,
        routes::api::status_routes::freshness,
        routes::api::status_routes::health,
    ),
    components(
        schemas(
            routes::api::SummaryData,
            routes::api::GraphData,
            routes::api::CurrentConditions,
            routes::api::Station,
            routes::api::Freshness,
            routes::api::Health,
            routes::api::ErrorBody,
        )
    ),
    tags(
        (name = "pws weather api", description = "summaries, graph series and current conditions for personal weather stations")
    )
)]
struct ApiDoc;

pub struct AppConfig {
    pub remote_url: String,
    pub static_dir: String,
    pub db_dir: String,
    pub stations: Vec<StationSpec>,
    pub api_key: Option<String>,
    pub base_url: String,
    pub units: Units,
    pub user_agent: String,
}

pub async fn build_app_state(config: AppConfig) -> Result<AppState, anyhow::Error> {
    let db = Database::new(&config.db_dir)
        .await
        .map_err(|e| anyhow!("error setting up SQLite database: {}", e))?;
    let weather_db = Arc::new(WeatherAccess::new(db));

    let live: Arc<dyn LiveWeather> = match config.api_key.filter(|key| !key.is_empty()) {
        Some(api_key) => Arc::new(
            PwsClient::new(&config.base_url, &api_key, config.units, &config.user_agent)
                .map_err(|e| anyhow!("error setting up PWS client: {}", e))?,
        ),
        None => {
            warn!("no API key configured, live conditions will use stored data");
            Arc::new(NoLiveWeather)
        }
    };

    Ok(AppState {
        remote_url: config.remote_url,
        static_dir: config.static_dir,
        stations: StationDirectory::new(config.stations),
        weather_db,
        live,
    })
}

pub fn app(app_state: AppState) -> Router {
    let api_docs = ApiDoc::openapi();
    let serve_static = ServeDir::new(&app_state.static_dir);
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_origin(Any);

    Router::new()
        // UI routes
        .route("/", get(status_handler))
        // API routes
        .route("/api/summary_data", get(summary_data))
        .route("/api/graph_data", get(graph_data))
        .route("/api/current_data", get(current_data))
        .route("/api/current_data_live", get(current_data_live))
        .route("/api/stations", get(get_stations))
        .route("/api/freshness", get(freshness))
        .route("/health", get(health))
        .with_state(Arc::new(app_state))
        .layer(middleware::from_fn(log_request))
        .merge(Scalar::with_url("/docs", api_docs))
        .nest_service("/static", serve_static)
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}
