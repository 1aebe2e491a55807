//! Common test utilities and fixtures.
//!
//! Both fixtures cover one hour starting at [`BASE`]; queries run from five
//! minutes before it up to [`NOW`], one step per minute.

#![allow(dead_code)]

use std::sync::Arc;
use strata_lib::core::config::EngineConfig;
use strata_lib::core::{LabelSet, MetricSample, MetricType, Temporality};
use strata_lib::metrics::InMemorySampleStore;
use strata_lib::query::{QueryEngine, QueryRequest, ResultSeries};

pub const MINUTE: i64 = 60_000;
/// End of every query, minute aligned.
pub const NOW: i64 = 28_333_334 * MINUTE;
/// Timestamp of the first fixture sample.
pub const BASE: i64 = NOW - 60 * MINUTE;
/// Start of every query.
pub const START: i64 = NOW - 65 * MINUTE;

pub const BUCKETS: [&str; 8] = ["1000", "1500", "2000", "4000", "5000", "6000", "8000", "+Inf"];

/// Test fixture builder for metric samples with sensible defaults.
pub struct SampleBuilder {
    metric_name: String,
    labels: LabelSet,
    metric_type: MetricType,
    temporality: Temporality,
}

impl SampleBuilder {
    pub fn new(metric_name: &str) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            labels: LabelSet::new(),
            metric_type: MetricType::Gauge,
            temporality: Temporality::Unspecified,
        }
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key, value);
        self
    }

    pub fn histogram(mut self, temporality: Temporality) -> Self {
        self.metric_type = MetricType::Histogram;
        self.temporality = temporality;
        self
    }

    pub fn counter(mut self, temporality: Temporality) -> Self {
        self.metric_type = MetricType::Sum;
        self.temporality = temporality;
        self
    }

    pub fn at(&self, timestamp_ms: i64, value: f64) -> MetricSample {
        MetricSample {
            metric_name: self.metric_name.clone(),
            labels: self.labels.clone(),
            timestamp_ms,
            value,
            temporality: self.temporality,
            metric_type: self.metric_type,
        }
    }
}

/// Per-minute increase of bucket `i` at minute `m` (m >= 1).
pub fn bucket_increase(i: usize, m: i64) -> f64 {
    (10 + m + i as i64) as f64
}

/// Histogram buckets for two cumulative `api` endpoints and one delta `web`
/// endpoint.
///
/// Every bucket grows by [`bucket_increase`] per minute. The delta series
/// reports 12345 in every bucket at minute 0.
pub fn histogram_samples(metric_name: &str) -> Vec<MetricSample> {
    let mut samples = Vec::new();
    for (i, le) in BUCKETS.iter().enumerate() {
        for endpoint in ["/health", "/users"] {
            let series = SampleBuilder::new(metric_name)
                .label("service", "api")
                .label("endpoint", endpoint)
                .label("le", le)
                .histogram(Temporality::Cumulative);
            let mut total = 100.0 + i as f64;
            for m in 0..60 {
                if m > 0 {
                    total += bucket_increase(i, m);
                }
                samples.push(series.at(BASE + m * MINUTE, total));
            }
        }

        let series = SampleBuilder::new(metric_name)
            .label("service", "web")
            .label("endpoint", "/home")
            .label("le", le)
            .histogram(Temporality::Delta);
        samples.push(series.at(BASE, 12345.0));
        for m in 1..60 {
            samples.push(series.at(BASE + m * MINUTE, bucket_increase(i, m)));
        }
    }
    samples
}

/// Gauge samples for three services.
///
/// - `api`: 400, then 800 for minutes 1..19, then 400
/// - `web`: 800 until minute 19, silent for minutes 20..29, then 600
/// - `lab`: two samples per minute, (400, 600), then (600, 800) for minutes 1..19, then (400, 600)
pub fn gauge_samples(metric_name: &str) -> Vec<MetricSample> {
    let api = SampleBuilder::new(metric_name).label("service", "api");
    let web = SampleBuilder::new(metric_name).label("service", "web");
    let lab = SampleBuilder::new(metric_name).label("service", "lab");

    let mut samples = Vec::new();
    for m in 0..60 {
        let ts = BASE + m * MINUTE;
        let raised = (1..20).contains(&m);

        samples.push(api.at(ts, if raised { 800.0 } else { 400.0 }));

        if m < 20 {
            samples.push(web.at(ts, 800.0));
        } else if m >= 30 {
            samples.push(web.at(ts, 600.0));
        }

        let (low, high) = if raised { (600.0, 800.0) } else { (400.0, 600.0) };
        samples.push(lab.at(ts, low));
        samples.push(lab.at(ts + 30_000, high));
    }
    samples
}

pub fn engine_with(samples: Vec<MetricSample>) -> QueryEngine {
    let store = InMemorySampleStore::new(10_000);
    store.insert_batch(samples).unwrap();
    QueryEngine::new(Arc::new(store), EngineConfig::default()).unwrap()
}

/// Minute-step request over the fixture hour.
pub fn hour_request(metric_name: &str) -> QueryRequest {
    QueryRequest::new(metric_name, START, NOW, 60)
}

/// Values of a result series in timestamp order.
pub fn values(series: &ResultSeries) -> Vec<f64> {
    let mut points = series.values.clone();
    points.sort_by_key(|p| p.timestamp_ms);
    points.into_iter().map(|p| p.value).collect()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-3,
        "expected {}, got {}",
        expected,
        actual
    );
}
