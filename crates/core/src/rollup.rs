//! Time-bucketed aggregation of observations.
//!
//! Raw 5-minute observations roll up into hourly buckets, and hourly buckets
//! roll up into daily buckets. Both steps go through [`aggregate`], which is
//! pure: it groups samples by `(station_id, truncated timestamp)` and folds each
//! metric with its [`Aggregation`]. Persisting the result is the store's job.

use std::collections::BTreeMap;
use time::{Duration, PrimitiveDateTime, Time};

use crate::models::{format_local, parse_date, parse_local, RollupRow, Sample, DATE_FORMAT};

/// Fixed window a timestamp is floored to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Hour,
    Day,
}

impl Bucket {
    pub fn truncate(&self, ts: PrimitiveDateTime) -> PrimitiveDateTime {
        let midnight = ts.replace_time(Time::MIDNIGHT);
        match self {
            Bucket::Hour => midnight + Duration::hours(ts.hour() as i64),
            Bucket::Day => midnight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Min,
    Max,
    Sum,
}

/// One output column of a rollup: `column` is computed from the input's `source` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSpec {
    pub column: &'static str,
    pub source: &'static str,
    pub aggregation: Aggregation,
}

const fn metric(
    column: &'static str,
    source: &'static str,
    aggregation: Aggregation,
) -> MetricSpec {
    MetricSpec {
        column,
        source,
        aggregation,
    }
}

/// weather_raw -> weather_hourly
pub const HOURLY_METRICS: &[MetricSpec] = &[
    metric("temp_avg", "temp_avg", Aggregation::Mean),
    metric("temp_min", "temp_min", Aggregation::Min),
    metric("temp_max", "temp_max", Aggregation::Max),
    metric("humidity_avg", "humidity_avg", Aggregation::Mean),
    metric("humidity_min", "humidity_min", Aggregation::Min),
    metric("humidity_max", "humidity_max", Aggregation::Max),
    metric("wind_speed_avg", "wind_speed_avg", Aggregation::Mean),
    metric("wind_speed_min", "wind_speed_min", Aggregation::Min),
    metric("wind_speed_max", "wind_speed_max", Aggregation::Max),
    metric("wind_gust_max", "wind_gust_max", Aggregation::Max),
    metric("dew_point_avg", "dew_point_avg", Aggregation::Mean),
    metric("windchill_avg", "windchill_avg", Aggregation::Mean),
    metric("heatindex_avg", "heatindex_avg", Aggregation::Mean),
    // 5-minute samples only carry a max/min pair; the max is the closer reading
    metric("pressure_avg", "pressure_max", Aggregation::Mean),
    metric("pressure_min", "pressure_min", Aggregation::Min),
    metric("pressure_max", "pressure_max", Aggregation::Max),
    metric("pressure_trend", "pressure_trend", Aggregation::Mean),
    metric("precip_total", "precip_total", Aggregation::Sum),
    metric("solar_rad_max", "solar_rad_max", Aggregation::Max),
    metric("uv_max", "uv_max", Aggregation::Max),
];

/// weather_hourly -> weather_daily
pub const DAILY_METRICS: &[MetricSpec] = &[
    metric("temp_avg", "temp_avg", Aggregation::Mean),
    metric("temp_low", "temp_min", Aggregation::Min),
    metric("temp_high", "temp_max", Aggregation::Max),
    metric("humidity_avg", "humidity_avg", Aggregation::Mean),
    metric("humidity_min", "humidity_min", Aggregation::Min),
    metric("humidity_max", "humidity_max", Aggregation::Max),
    metric("wind_speed_avg", "wind_speed_avg", Aggregation::Mean),
    metric("wind_speed_low", "wind_speed_min", Aggregation::Min),
    metric("wind_speed_high", "wind_speed_max", Aggregation::Max),
    metric("wind_gust_max", "wind_gust_max", Aggregation::Max),
    metric("dew_point_avg", "dew_point_avg", Aggregation::Mean),
    metric("windchill_avg", "windchill_avg", Aggregation::Mean),
    metric("heatindex_avg", "heatindex_avg", Aggregation::Mean),
    metric("pressure_avg", "pressure_avg", Aggregation::Mean),
    metric("pressure_min", "pressure_min", Aggregation::Min),
    metric("pressure_max", "pressure_max", Aggregation::Max),
    metric("pressure_trend", "pressure_trend", Aggregation::Mean),
    metric("precip_total", "precip_total", Aggregation::Sum),
    metric("solar_rad_max", "solar_rad_max", Aggregation::Max),
    metric("uv_max", "uv_max", Aggregation::Max),
];

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    count: u32,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    fn finish(&self, aggregation: Aggregation) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(match aggregation {
            Aggregation::Mean => self.sum / self.count as f64,
            Aggregation::Min => self.min,
            Aggregation::Max => self.max,
            Aggregation::Sum => self.sum,
        })
    }
}

struct BucketState {
    samples: i64,
    accumulators: Vec<Accumulator>,
}

/// Group `records` by station and `bucket`, folding every metric in `metrics`.
///
/// Missing and non-finite values are skipped, so a metric with no usable
/// values in a bucket comes out as `None` while the bucket itself is still
/// emitted. Rows are ordered by station, then bucket start.
pub fn aggregate<S: Sample>(
    records: &[S],
    bucket: Bucket,
    metrics: &[MetricSpec],
) -> Vec<RollupRow> {
    let mut groups: BTreeMap<(String, PrimitiveDateTime), BucketState> = BTreeMap::new();

    for record in records {
        let key = (
            record.station_id().to_owned(),
            bucket.truncate(record.timestamp()),
        );
        let state = groups.entry(key).or_insert_with(|| BucketState {
            samples: 0,
            accumulators: vec![Accumulator::default(); metrics.len()],
        });
        state.samples += 1;

        for (acc, metric) in state.accumulators.iter_mut().zip(metrics) {
            if let Some(value) = record.value(metric.source).filter(|v| v.is_finite()) {
                acc.push(value);
            }
        }
    }

    groups
        .into_iter()
        .map(|((station_id, bucket), state)| RollupRow {
            station_id,
            bucket,
            sample_count: state.samples,
            values: metrics
                .iter()
                .zip(state.accumulators.iter())
                .map(|(metric, acc)| (metric.column, acc.finish(metric.aggregation)))
                .collect(),
        })
        .collect()
}

/// A downstream table produced by a rollup, keyed by `(station_id, <bucket column>)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupTable {
    Hourly,
    Daily,
}

impl RollupTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            RollupTable::Hourly => "weather_hourly",
            RollupTable::Daily => "weather_daily",
        }
    }

    pub fn bucket_column(&self) -> &'static str {
        match self {
            RollupTable::Hourly => "hour",
            RollupTable::Daily => "date",
        }
    }

    pub fn bucket(&self) -> Bucket {
        match self {
            RollupTable::Hourly => Bucket::Hour,
            RollupTable::Daily => Bucket::Day,
        }
    }

    pub fn metrics(&self) -> &'static [MetricSpec] {
        match self {
            RollupTable::Hourly => HOURLY_METRICS,
            RollupTable::Daily => DAILY_METRICS,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.metrics().iter().any(|m| m.column == column)
    }

    /// Roll `records` up into this table's rows
    pub fn aggregate<S: Sample>(&self, records: &[S]) -> Vec<RollupRow> {
        aggregate(records, self.bucket(), self.metrics())
    }

    /// Text key stored in the bucket column: `YYYY-MM-DD HH:00:00` or `YYYY-MM-DD`
    pub fn format_bucket(
        &self,
        bucket: PrimitiveDateTime,
    ) -> Result<String, time::error::Format> {
        let bucket = self.bucket().truncate(bucket);
        match self {
            RollupTable::Hourly => format_local(bucket),
            RollupTable::Daily => bucket.date().format(DATE_FORMAT),
        }
    }

    pub fn parse_bucket(&self, value: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
        match self {
            RollupTable::Hourly => parse_local(value),
            RollupTable::Daily => parse_date(value),
        }
    }
}
