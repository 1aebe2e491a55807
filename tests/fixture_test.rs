//! Loading JSONL fixtures from disk and querying them.

mod common;

use common::{assert_close, values, MINUTE};
use std::io::Write;
use std::sync::Arc;
use strata_lib::cli::load_store;
use strata_lib::core::config::EngineConfig;
use strata_lib::core::{ConfigBuilder, StrataError};
use strata_lib::metrics::{load_jsonl, FixtureOptions, InMemorySampleStore, SampleStore, TimeReducer};
use strata_lib::query::{QueryEngine, QueryRequest};
use tempfile::NamedTempFile;

const ORIGIN: i64 = 1_000 * MINUTE;

fn counter_line(minute: u32, value: f64) -> String {
    format!(
        r#"{{"metric_name":"requests","labels":{{"service":"api"}},"timestamp":"2025-01-01T00:{:02}:00Z","value":{},"temporality":"Cumulative","type":"Sum"}}"#,
        minute, value
    )
}

fn gauge_line(service: &str, minute: u32, value: f64) -> String {
    format!(
        r#"{{"metric_name":"memory","labels":{{"service":"{}"}},"timestamp":"2025-01-01T00:{:02}:00Z","value":{},"type":"gauge"}}"#,
        service, minute, value
    )
}

fn write_fixture(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

fn counter_fixture() -> NamedTempFile {
    let lines: Vec<_> = [10.0, 20.0, 30.0, 5.0, 15.0]
        .iter()
        .enumerate()
        .map(|(m, v)| counter_line(m as u32, *v))
        .collect();
    write_fixture(&lines)
}

#[tokio::test]
async fn test_load_rebased_counter_and_query_increase() {
    let file = counter_fixture();
    let options = FixtureOptions {
        metric_name_override: Some("http_requests".to_string()),
        base_time_ms: Some(ORIGIN),
    };
    let samples = load_jsonl(file.path(), &options).await.unwrap();
    assert_eq!(samples.len(), 5);
    assert_eq!(samples[0].timestamp_ms, ORIGIN);
    assert!(samples.iter().all(|s| s.metric_name == "http_requests"));

    let store = InMemorySampleStore::new(100);
    store.insert_batch(samples).unwrap();
    let engine = QueryEngine::new(Arc::new(store), EngineConfig::default()).unwrap();

    let request = QueryRequest::new("http_requests", ORIGIN, ORIGIN + 5 * MINUTE, 60)
        .time_aggregation(TimeReducer::Increase);
    let response = engine.query_range(&request).await.unwrap();
    let v = values(&response.data.series[0]);

    // first sample has nothing to diff against; the drop to 5 is a restart
    assert_eq!(v.len(), 4);
    for (actual, expected) in v.iter().zip([10.0, 10.0, 5.0, 10.0]) {
        assert_close(*actual, expected);
    }
    let stats = engine.stats();
    assert_eq!(stats.counter_resets, 1);
    assert_eq!(stats.unanchored_steps, 1);

    let rate = request.clone().time_aggregation(TimeReducer::Rate);
    let response = engine.query_range(&rate).await.unwrap();
    assert_close(values(&response.data.series[0])[0], 10.0 / 60.0);
}

#[tokio::test]
async fn test_missing_fixture_is_io_error() {
    let err = load_jsonl("/nonexistent/strata/fixture.jsonl", &FixtureOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::Io(_)), "{:?}", err);
}

#[tokio::test]
async fn test_bad_line_reports_path_and_line() {
    let file = write_fixture(&[gauge_line("api", 0, 1.0), "{not json".to_string()]);
    let err = load_jsonl(file.path(), &FixtureOptions::default())
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("line 2"), "{}", message);
    assert!(message.contains(&file.path().display().to_string()), "{}", message);
}

#[tokio::test]
async fn test_load_store_from_config_preload() {
    let counters = counter_fixture();
    let gauges = write_fixture(&[
        gauge_line("api", 0, 100.0),
        gauge_line("web", 0, 300.0),
        gauge_line("api", 1, 200.0),
    ]);
    let config = ConfigBuilder::new()
        .preload(counters.path().to_path_buf())
        .preload(gauges.path().to_path_buf())
        .build()
        .unwrap();

    let store = load_store(&config).await.unwrap();
    assert_eq!(store.series_count().await.unwrap(), 3);

    let series = store
        .query("memory", &Default::default(), 0, i64::MAX)
        .await
        .unwrap();
    assert_eq!(series.len(), 2);
}
