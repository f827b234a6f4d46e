use serde::Serialize;
use std::collections::BTreeMap;
use time::{
    format_description::FormatItem, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime,
};

/// Station-local wall clock, as the provider reports `obsTimeLocal`
pub const LOCAL_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

pub const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub fn format_local(value: PrimitiveDateTime) -> Result<String, time::error::Format> {
    value.format(LOCAL_TIME_FORMAT)
}

pub fn parse_local(value: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(value, LOCAL_TIME_FORMAT)
}

pub fn parse_date(value: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    Ok(Date::parse(value, DATE_FORMAT)?.midnight())
}

/// Anything the rollup engine can aggregate: a keyed, timestamped bag of metric columns
pub trait Sample {
    fn station_id(&self) -> &str;
    fn timestamp(&self) -> PrimitiveDateTime;
    fn value(&self, column: &str) -> Option<f64>;
}

/// One 5-minute observation as ingested from the provider (the bronze layer)
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub station_id: String,
    pub local_time: PrimitiveDateTime,
    pub observed_at: OffsetDateTime,
    pub tz: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub temp_avg: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub humidity_avg: Option<f64>,
    pub humidity_min: Option<f64>,
    pub humidity_max: Option<f64>,
    pub wind_speed_avg: Option<f64>,
    pub wind_speed_min: Option<f64>,
    pub wind_speed_max: Option<f64>,
    pub wind_gust_max: Option<f64>,
    pub wind_dir_avg: Option<f64>,
    pub dew_point_avg: Option<f64>,
    pub windchill_avg: Option<f64>,
    pub heatindex_avg: Option<f64>,
    pub pressure_max: Option<f64>,
    pub pressure_min: Option<f64>,
    pub pressure_trend: Option<f64>,
    pub precip_rate: Option<f64>,
    pub precip_total: Option<f64>,
    pub solar_rad_max: Option<f64>,
    pub uv_max: Option<f64>,
    pub qc_status: Option<i64>,
}

/// Metric columns of `weather_raw`, in table order
pub const RAW_COLUMNS: &[&str] = &[
    "temp_avg",
    "temp_min",
    "temp_max",
    "humidity_avg",
    "humidity_min",
    "humidity_max",
    "wind_speed_avg",
    "wind_speed_min",
    "wind_speed_max",
    "wind_gust_max",
    "wind_dir_avg",
    "dew_point_avg",
    "windchill_avg",
    "heatindex_avg",
    "pressure_max",
    "pressure_min",
    "pressure_trend",
    "precip_rate",
    "precip_total",
    "solar_rad_max",
    "uv_max",
];

impl RawObservation {
    /// An observation with every metric unset
    pub fn empty(
        station_id: &str,
        local_time: PrimitiveDateTime,
        observed_at: OffsetDateTime,
    ) -> Self {
        Self {
            station_id: station_id.to_owned(),
            local_time,
            observed_at,
            tz: None,
            latitude: None,
            longitude: None,
            temp_avg: None,
            temp_min: None,
            temp_max: None,
            humidity_avg: None,
            humidity_min: None,
            humidity_max: None,
            wind_speed_avg: None,
            wind_speed_min: None,
            wind_speed_max: None,
            wind_gust_max: None,
            wind_dir_avg: None,
            dew_point_avg: None,
            windchill_avg: None,
            heatindex_avg: None,
            pressure_max: None,
            pressure_min: None,
            pressure_trend: None,
            precip_rate: None,
            precip_total: None,
            solar_rad_max: None,
            uv_max: None,
            qc_status: None,
        }
    }

    /// Metric values in [`RAW_COLUMNS`] order
    pub fn metric_values(&self) -> Vec<Option<f64>> {
        RAW_COLUMNS.iter().map(|c| self.value(c)).collect()
    }

    pub fn set_value(&mut self, column: &str, value: Option<f64>) {
        let slot = match column {
            "temp_avg" => &mut self.temp_avg,
            "temp_min" => &mut self.temp_min,
            "temp_max" => &mut self.temp_max,
            "humidity_avg" => &mut self.humidity_avg,
            "humidity_min" => &mut self.humidity_min,
            "humidity_max" => &mut self.humidity_max,
            "wind_speed_avg" => &mut self.wind_speed_avg,
            "wind_speed_min" => &mut self.wind_speed_min,
            "wind_speed_max" => &mut self.wind_speed_max,
            "wind_gust_max" => &mut self.wind_gust_max,
            "wind_dir_avg" => &mut self.wind_dir_avg,
            "dew_point_avg" => &mut self.dew_point_avg,
            "windchill_avg" => &mut self.windchill_avg,
            "heatindex_avg" => &mut self.heatindex_avg,
            "pressure_max" => &mut self.pressure_max,
            "pressure_min" => &mut self.pressure_min,
            "pressure_trend" => &mut self.pressure_trend,
            "precip_rate" => &mut self.precip_rate,
            "precip_total" => &mut self.precip_total,
            "solar_rad_max" => &mut self.solar_rad_max,
            "uv_max" => &mut self.uv_max,
            _ => return,
        };
        *slot = value;
    }
}

impl Sample for RawObservation {
    fn station_id(&self) -> &str {
        &self.station_id
    }

    fn timestamp(&self) -> PrimitiveDateTime {
        self.local_time
    }

    fn value(&self, column: &str) -> Option<f64> {
        match column {
            "temp_avg" => self.temp_avg,
            "temp_min" => self.temp_min,
            "temp_max" => self.temp_max,
            "humidity_avg" => self.humidity_avg,
            "humidity_min" => self.humidity_min,
            "humidity_max" => self.humidity_max,
            "wind_speed_avg" => self.wind_speed_avg,
            "wind_speed_min" => self.wind_speed_min,
            "wind_speed_max" => self.wind_speed_max,
            "wind_gust_max" => self.wind_gust_max,
            "wind_dir_avg" => self.wind_dir_avg,
            "dew_point_avg" => self.dew_point_avg,
            "windchill_avg" => self.windchill_avg,
            "heatindex_avg" => self.heatindex_avg,
            "pressure_max" => self.pressure_max,
            "pressure_min" => self.pressure_min,
            "pressure_trend" => self.pressure_trend,
            "precip_rate" => self.precip_rate,
            "precip_total" => self.precip_total,
            "solar_rad_max" => self.solar_rad_max,
            "uv_max" => self.uv_max,
            _ => None,
        }
    }
}

/// One aggregated bucket; the row shape of both `weather_hourly` and `weather_daily`
#[derive(Debug, Clone, PartialEq)]
pub struct RollupRow {
    pub station_id: String,
    /// Start of the bucket in station-local time
    pub bucket: PrimitiveDateTime,
    pub sample_count: i64,
    pub values: BTreeMap<&'static str, Option<f64>>,
}

impl RollupRow {
    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }
}

impl Sample for RollupRow {
    fn station_id(&self) -> &str {
        &self.station_id
    }

    fn timestamp(&self) -> PrimitiveDateTime {
        self.bucket
    }

    fn value(&self, column: &str) -> Option<f64> {
        self.get(column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRecord {
    pub alias: String,
    pub pws_id: String,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub tz: Option<String>,
}
