use crate::core::error::{Result, StrataError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = i64;

/// Label key that carries a histogram bucket's upper bound.
pub const LE_LABEL: &str = "le";

/// How a sample's value relates to the samples before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporality {
    /// Running total since the series started.
    Cumulative,
    /// Increment since the previous sample.
    Delta,
    /// No temporality recorded (gauges).
    Unspecified,
}

impl Default for Temporality {
    fn default() -> Self {
        Temporality::Unspecified
    }
}

/// Kind of instrument that produced a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Point-in-time measurement (memory, queue depth)
    Gauge,
    /// Monotonic counter (requests, bytes)
    Sum,
    /// One bucket counter of a histogram, tagged with an `le` label
    Histogram,
}

impl MetricType {
    /// Whether raw values must be turned into increases before aggregation.
    pub fn is_monotonic(&self) -> bool {
        matches!(self, MetricType::Sum | MetricType::Histogram)
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricType::Gauge => write!(f, "gauge"),
            MetricType::Sum => write!(f, "sum"),
            MetricType::Histogram => write!(f, "histogram"),
        }
    }
}

/// Ordered label set. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a label, replacing any previous value for the key.
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keep only the given keys. Missing keys are simply absent from the result.
    pub fn project<'a, I>(&self, keys: I) -> LabelSet
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut projected = LabelSet::new();
        for key in keys {
            if let Some(value) = self.0.get(key) {
                projected.insert(key, value.clone());
            }
        }
        projected
    }

    /// Drop a single key.
    pub fn without(&self, key: &str) -> LabelSet {
        let mut labels = self.clone();
        labels.0.remove(key);
        labels
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}=\"{}\"", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Identity of a series: metric name plus its full label set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub metric_name: String,
    pub labels: LabelSet,
}

impl SeriesKey {
    pub fn new<S: Into<String>>(metric_name: S, labels: LabelSet) -> Self {
        Self {
            metric_name: metric_name.into(),
            labels,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.metric_name, self.labels)
    }
}

/// A single observation within a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: TimestampMs,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp_ms: TimestampMs, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

/// Flat ingestion record as handed to a sample store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_name: String,
    pub labels: LabelSet,
    pub timestamp_ms: TimestampMs,
    pub value: f64,
    #[serde(default)]
    pub temporality: Temporality,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
}

impl MetricSample {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.metric_name.clone(), self.labels.clone())
    }
}

/// Time-ordered samples of one series.
///
/// Timestamps are strictly increasing; the constructor enforces it.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub key: SeriesKey,
    pub metric_type: MetricType,
    pub temporality: Temporality,
    samples: Vec<Sample>,
}

impl Series {
    /// Build a series, sorting samples by time and rejecting duplicate timestamps.
    pub fn new(
        key: SeriesKey,
        metric_type: MetricType,
        temporality: Temporality,
        mut samples: Vec<Sample>,
    ) -> Result<Self> {
        samples.sort_by_key(|s| s.timestamp_ms);
        if let Some(pair) = samples.windows(2).find(|w| w[0].timestamp_ms == w[1].timestamp_ms) {
            return Err(StrataError::invalid_series(format!(
                "duplicate timestamp {} in series {}",
                pair[0].timestamp_ms, key
            )));
        }
        Ok(Self {
            key,
            metric_type,
            temporality,
            samples,
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Samples with `start <= timestamp < end`.
    pub fn range(&self, start: TimestampMs, end: TimestampMs) -> &[Sample] {
        let lo = self.samples.partition_point(|s| s.timestamp_ms < start);
        let hi = self.samples.partition_point(|s| s.timestamp_ms < end);
        &self.samples[lo..hi.max(lo)]
    }

    /// Insert or replace the sample at `sample.timestamp_ms`, keeping order.
    pub fn upsert(&mut self, sample: Sample) {
        match self
            .samples
            .binary_search_by_key(&sample.timestamp_ms, |s| s.timestamp_ms)
        {
            Ok(idx) => self.samples[idx] = sample,
            Err(idx) => self.samples.insert(idx, sample),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Parse a histogram bucket bound, accepting the usual spellings of infinity.
pub fn parse_le(value: &str) -> Option<f64> {
    match value.trim() {
        "+Inf" | "+inf" | "Inf" | "inf" | "+INF" => Some(f64::INFINITY),
        other => other.parse::<f64>().ok().filter(|v| !v.is_nan()),
    }
}

/// Bucket bound carried by a label set, if any.
pub fn parse_le_label(labels: &LabelSet) -> Option<f64> {
    labels.get(LE_LABEL).and_then(parse_le)
}
