//! Metric aggregation: time bucketing, percentiles and counter rates.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{HistogramData, MetricEntry, MetricType};
use crate::storage::error::ParamError;
use crate::storage::params::{parse_duration, parse_time};

/// Supported bucket widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "10s")]
    TenSeconds,
    #[serde(rename = "30s")]
    ThirtySeconds,
    #[default]
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Resolution {
    pub fn seconds(&self) -> i64 {
        match self {
            Self::TenSeconds => 10,
            Self::ThirtySeconds => 30,
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::OneHour => 3_600,
            Self::SixHours => 21_600,
            Self::OneDay => 86_400,
        }
    }
}

impl FromStr for Resolution {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "10s" => Self::TenSeconds,
            "30s" => Self::ThirtySeconds,
            "1m" => Self::OneMinute,
            "5m" => Self::FiveMinutes,
            "15m" => Self::FifteenMinutes,
            "1h" => Self::OneHour,
            "6h" => Self::SixHours,
            "1d" => Self::OneDay,
            other => return Err(ParamError::InvalidResolution(other.to_string())),
        })
    }
}

/// How samples in one bucket are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    #[default]
    Avg,
    Sum,
    Min,
    Max,
    Count,
}

impl FromStr for AggregateFn {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "avg" | "mean" => Self::Avg,
            "sum" => Self::Sum,
            "min" => Self::Min,
            "max" => Self::Max,
            "count" => Self::Count,
            _ => {
                return Err(ParamError::InvalidValue {
                    name: "aggregation",
                    value: s.to_string(),
                })
            }
        })
    }
}

/// What to aggregate and over which window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregationQuery {
    pub name: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub function: AggregateFn,
    /// Replace bucket values with their per-second rate of change.
    #[serde(default)]
    pub rate: bool,
}

impl AggregationQuery {
    /// Parse the query-string representation.
    ///
    /// `name` is required. `label.<key>=<value>` pins a label. `from`/`to`
    /// accept RFC3339 or relative times; `time_range` sets `from` relative to
    /// `to` when `from` is absent.
    pub fn from_query(query: &HashMap<String, String>, now: DateTime<Utc>) -> Result<Self, ParamError> {
        let get = |key: &str| query.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let name = get("name").ok_or(ParamError::InvalidValue {
            name: "name",
            value: String::new(),
        })?;
        let mut agg = Self {
            name: name.to_string(),
            service: get("service").map(str::to_string),
            ..Self::default()
        };

        if let Some(resolution) = get("resolution") {
            agg.resolution = resolution.parse()?;
        }
        if let Some(function) = get("aggregation").or_else(|| get("function")) {
            agg.function = function.parse()?;
        }
        if let Some(to) = get("to") {
            agg.to = Some(parse_time(to, now)?);
        }
        agg.from = match (get("from"), get("time_range")) {
            (Some(from), _) => Some(parse_time(from, now)?),
            (None, Some(range)) => Some(agg.to.unwrap_or(now) - parse_duration(range)?),
            (None, None) => None,
        };
        if let Some(rate) = get("rate") {
            agg.rate = match rate.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ParamError::InvalidValue {
                        name: "rate",
                        value: rate.to_string(),
                    })
                }
            };
        }

        for (key, value) in query {
            if let Some(label) = key.strip_prefix("label.") {
                if !label.is_empty() {
                    agg.labels.insert(label.to_string(), value.clone());
                }
            }
        }
        Ok(agg)
    }

    /// `[from, to)`, defaulting to the hour ending at `now`.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let to = self.to.unwrap_or(now);
        let from = self.from.unwrap_or(to - Duration::hours(1));
        (from, to)
    }

    /// Whether a raw sample belongs to this query's series (window aside).
    pub fn selects(&self, metric: &MetricEntry) -> bool {
        metric.name == self.name
            && self.service.as_ref().map_or(true, |s| &metric.service == s)
            && self
                .labels
                .iter()
                .all(|(k, v)| metric.labels.get(k).is_some_and(|l| l == v))
    }
}

/// One bucket of an aggregated series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub count: u64,
}

/// An aggregated metric series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAggregation {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub time_series: Vec<AggregationPoint>,
    pub labels: BTreeMap<String, String>,
}

struct Accumulator {
    sum: f64,
    min: f64,
    max: f64,
    count: u64,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            count: 0,
        }
    }

    fn push(&mut self, v: f64) {
        self.sum += v;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.count += 1;
    }

    fn value(&self, function: AggregateFn) -> f64 {
        match function {
            AggregateFn::Avg => self.sum / self.count as f64,
            AggregateFn::Sum => self.sum,
            AggregateFn::Min => self.min,
            AggregateFn::Max => self.max,
            AggregateFn::Count => self.count as f64,
        }
    }
}

/// Start of the epoch-aligned bucket containing `t`.
pub fn bucket_start(t: DateTime<Utc>, resolution: Resolution) -> DateTime<Utc> {
    let width = resolution.seconds();
    let secs = t.timestamp().div_euclid(width) * width;
    Utc.timestamp_opt(secs, 0).single().unwrap_or(t)
}

/// Bucket samples that fall in `[from, to)` into fixed-width windows.
///
/// Empty buckets are omitted. Points come out in ascending time order.
pub fn aggregate<'a, I>(samples: I, query: &AggregationQuery, now: DateTime<Utc>) -> MetricAggregation
where
    I: IntoIterator<Item = &'a MetricEntry>,
{
    let (from, to) = query.window(now);
    let mut buckets: BTreeMap<DateTime<Utc>, Accumulator> = BTreeMap::new();
    let mut metric_type = None;

    for sample in samples {
        if !query.selects(sample) || sample.timestamp < from || sample.timestamp >= to {
            continue;
        }
        metric_type.get_or_insert(sample.metric_type);
        buckets
            .entry(bucket_start(sample.timestamp, query.resolution))
            .or_insert_with(Accumulator::new)
            .push(sample.value);
    }

    let mut time_series: Vec<AggregationPoint> = buckets
        .into_iter()
        .map(|(timestamp, acc)| AggregationPoint {
            timestamp,
            value: acc.value(query.function),
            count: acc.count,
        })
        .collect();

    if query.rate {
        time_series = calculate_metrics_rate(&time_series);
    }

    MetricAggregation {
        name: query.name.clone(),
        metric_type: metric_type.unwrap_or_default(),
        time_series,
        labels: query.labels.clone(),
    }
}

/// Approximate the `p`th percentile from histogram buckets.
///
/// Walks buckets in ascending upper-bound order and returns the upper bound
/// of the first one whose cumulative count reaches `p/100 * total`. Returns
/// `None` for a histogram with no observations.
pub fn calculate_percentile(histogram: &HistogramData, p: f64) -> Option<f64> {
    let total = histogram.total_count();
    if total == 0 {
        return None;
    }
    let mut buckets: Vec<_> = histogram.buckets.iter().collect();
    buckets.sort_by(|a, b| a.upper_bound.total_cmp(&b.upper_bound));

    let target = p.clamp(0.0, 100.0) / 100.0 * total as f64;
    let mut cumulative = 0u64;
    for bucket in &buckets {
        cumulative += bucket.count;
        if cumulative as f64 >= target {
            return Some(bucket.upper_bound);
        }
    }
    buckets.last().map(|b| b.upper_bound)
}

/// Per-second rate between consecutive points.
///
/// A decrease is read as a counter reset to zero, so the delta becomes the
/// post-reset value. Each output point carries the later point's timestamp;
/// pairs with non-increasing timestamps are skipped.
pub fn calculate_metrics_rate(points: &[AggregationPoint]) -> Vec<AggregationPoint> {
    points
        .windows(2)
        .filter_map(|pair| {
            let (prev, cur) = (&pair[0], &pair[1]);
            let elapsed = (cur.timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
            if elapsed <= 0.0 {
                return None;
            }
            let delta = if cur.value < prev.value {
                cur.value
            } else {
                cur.value - prev.value
            };
            Some(AggregationPoint {
                timestamp: cur.timestamp,
                value: delta / elapsed,
                count: cur.count,
            })
        })
        .collect()
}
