use std::sync::Arc;

use axum::{extract::State, response::Html};
use log::error;

use crate::{
    routes::api::{station_list, Freshness},
    templates::{status_page, StatusData},
    AppState,
};

/// Handler for the status page (GET /)
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    let data = build_status_data(&state).await;
    Html(status_page(&state.remote_url, &data).into_string())
}

async fn build_status_data(state: &AppState) -> StatusData {
    let stations = station_list(state).await.unwrap_or_else(|e| {
        error!("error loading stations: {}", e.message);
        Vec::new()
    });

    let freshness = state
        .weather_db
        .freshness()
        .await
        .map(|rows| rows.into_iter().map(Freshness::from).collect())
        .unwrap_or_else(|e| {
            error!("error loading freshness: {}", e);
            Vec::new()
        });

    let healthy = state.weather_db.health_check().await.is_ok();

    StatusData {
        stations,
        freshness,
        healthy,
    }
}
