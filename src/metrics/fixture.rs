//! JSONL sample fixtures.
//!
//! One JSON object per line:
//!
//! ```text
//! {"metric_name":"http_server_duration_bucket","labels":{"service":"api","le":"1000"},
//!  "timestamp":"2025-01-01T00:01:00Z","value":42,"temporality":"Cumulative","type":"Histogram"}
//! ```
//!
//! Temporality and type are matched case-insensitively. Blank lines are
//! skipped.

use crate::core::{LabelSet, MetricSample, MetricType, Result, StrataError, Temporality, TimestampMs};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

/// Adjustments applied while loading a fixture.
#[derive(Debug, Clone, Default)]
pub struct FixtureOptions {
    /// Replace every record's metric name.
    pub metric_name_override: Option<String>,
    /// Shift all timestamps so the earliest lands on this instant.
    pub base_time_ms: Option<TimestampMs>,
}

#[derive(Debug, Deserialize)]
struct FixtureRecord {
    metric_name: String,
    #[serde(default)]
    labels: LabelSet,
    timestamp: DateTime<Utc>,
    value: f64,
    #[serde(default)]
    temporality: Option<String>,
    #[serde(rename = "type")]
    metric_type: String,
}

/// Read and parse a fixture file.
pub async fn load_jsonl<P: AsRef<Path>>(path: P, options: &FixtureOptions) -> Result<Vec<MetricSample>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let samples = parse_jsonl(&text, options)
        .map_err(|e| StrataError::invalid_series(format!("{}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), samples = samples.len(), "Loaded fixture");
    Ok(samples)
}

/// Parse fixture text.
pub fn parse_jsonl(text: &str, options: &FixtureOptions) -> Result<Vec<MetricSample>> {
    let mut samples = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: FixtureRecord = serde_json::from_str(line)
            .map_err(|e| StrataError::invalid_series(format!("line {}: {}", idx + 1, e)))?;
        samples.push(into_sample(record, options).map_err(|e| match e {
            StrataError::InvalidSeries(msg) => {
                StrataError::invalid_series(format!("line {}: {}", idx + 1, msg))
            },
            other => other,
        })?);
    }

    if let Some(base) = options.base_time_ms {
        if let Some(earliest) = samples.iter().map(|s| s.timestamp_ms).min() {
            let shift = base - earliest;
            for sample in &mut samples {
                sample.timestamp_ms += shift;
            }
        }
    }
    Ok(samples)
}

fn into_sample(record: FixtureRecord, options: &FixtureOptions) -> Result<MetricSample> {
    let metric_type = parse_metric_type(&record.metric_type)?;
    let temporality = match record.temporality.as_deref() {
        None => Temporality::Unspecified,
        Some(raw) => parse_temporality(raw)?,
    };
    Ok(MetricSample {
        metric_name: options
            .metric_name_override
            .clone()
            .unwrap_or(record.metric_name),
        labels: record.labels,
        timestamp_ms: record.timestamp.timestamp_millis(),
        value: record.value,
        temporality,
        metric_type,
    })
}

fn parse_metric_type(raw: &str) -> Result<MetricType> {
    match raw.to_ascii_lowercase().as_str() {
        "gauge" => Ok(MetricType::Gauge),
        "sum" | "counter" => Ok(MetricType::Sum),
        "histogram" => Ok(MetricType::Histogram),
        other => Err(StrataError::invalid_series(format!("unknown metric type '{}'", other))),
    }
}

fn parse_temporality(raw: &str) -> Result<Temporality> {
    match raw.to_ascii_lowercase().as_str() {
        "cumulative" => Ok(Temporality::Cumulative),
        "delta" => Ok(Temporality::Delta),
        "unspecified" | "" => Ok(Temporality::Unspecified),
        other => Err(StrataError::invalid_series(format!("unknown temporality '{}'", other))),
    }
}
