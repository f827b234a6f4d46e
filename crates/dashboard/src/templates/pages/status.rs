use maud::{html, Markup};

use crate::{
    routes::api::{Freshness, Station},
    templates::layouts::{base, PageConfig},
};

pub struct StatusData {
    pub stations: Vec<Station>,
    pub freshness: Vec<Freshness>,
    pub healthy: bool,
}

/// Status page: configured stations and how current their data is
pub fn status_page(api_base: &str, data: &StatusData) -> Markup {
    let config = PageConfig {
        title: "PWS Weather - Status",
        api_base,
    };
    base(&config, status_content(data))
}

pub fn status_content(data: &StatusData) -> Markup {
    html! {
        div class="box" {
            div class="is-flex is-justify-content-space-between is-align-items-center mb-4" {
                h2 class="title is-5 mb-0" { "Stations" }
                @if data.healthy {
                    span class="tag is-success" { "Database OK" }
                } @else {
                    span class="tag is-danger" { "Database unavailable" }
                }
            }

            @if data.stations.is_empty() {
                div class="has-text-centered has-text-grey py-4" {
                    p { "No stations configured." }
                }
            } @else {
                div class="table-container" {
                    table class="table is-fullwidth is-striped is-hoverable" {
                        thead {
                            tr {
                                th { "Station" }
                                th { "PWS ID" }
                                th { "Latest raw" }
                                th { "Latest hourly" }
                                th { "Latest daily" }
                            }
                        }
                        tbody {
                            @for station in &data.stations {
                                @let fresh = data.freshness.iter().find(|f| f.station_id == station.alias);
                                tr {
                                    td {
                                        strong { (station.alias) }
                                        @if let Some(name) = &station.name {
                                            " - " (name)
                                        }
                                    }
                                    td { (station.pws_id) }
                                    td { (or_dash(fresh.and_then(|f| f.latest_raw.as_deref()))) }
                                    td { (or_dash(fresh.and_then(|f| f.latest_hourly.as_deref()))) }
                                    td { (or_dash(fresh.and_then(|f| f.latest_daily.as_deref()))) }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}
