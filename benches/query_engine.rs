//! Query engine benchmarks: bucket math, filter parsing and full range queries.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use strata_lib::core::config::EngineConfig;
use strata_lib::core::{LabelSet, MetricSample, MetricType, Temporality};
use strata_lib::metrics::histogram::{count_le, quantile, Bucket};
use strata_lib::metrics::{ComparisonOperator, InMemorySampleStore, SpaceReducer, TimeReducer};
use strata_lib::query::{LabelFilter, QueryEngine, QueryRequest};

const MINUTE: i64 = 60_000;
const BOUNDS: [&str; 8] = ["1000", "1500", "2000", "4000", "5000", "6000", "8000", "+Inf"];

fn histogram_samples(services: usize, minutes: i64) -> Vec<MetricSample> {
    let mut samples = Vec::new();
    for s in 0..services {
        for (i, le) in BOUNDS.iter().enumerate() {
            let mut labels = LabelSet::new();
            labels.insert("service", &format!("svc-{}", s));
            labels.insert("le", le);
            let mut total = 0.0;
            for m in 0..minutes {
                total += (10 + m + i as i64) as f64;
                samples.push(MetricSample {
                    metric_name: "latency_bucket".to_string(),
                    labels: labels.clone(),
                    timestamp_ms: m * MINUTE,
                    value: total,
                    temporality: Temporality::Cumulative,
                    metric_type: MetricType::Histogram,
                });
            }
        }
    }
    samples
}

fn gauge_samples(services: usize, minutes: i64) -> Vec<MetricSample> {
    let mut samples = Vec::new();
    for s in 0..services {
        let mut labels = LabelSet::new();
        labels.insert("service", &format!("svc-{}", s));
        for m in 0..minutes {
            for offset in [0, 20_000, 40_000] {
                samples.push(MetricSample {
                    metric_name: "memory".to_string(),
                    labels: labels.clone(),
                    timestamp_ms: m * MINUTE + offset,
                    value: (400 + (m + s as i64) % 400) as f64,
                    temporality: Temporality::Unspecified,
                    metric_type: MetricType::Gauge,
                });
            }
        }
    }
    samples
}

fn engine(samples: Vec<MetricSample>) -> QueryEngine {
    let store = InMemorySampleStore::new(1_000_000);
    store.insert_batch(samples).unwrap();
    QueryEngine::new(Arc::new(store), EngineConfig::default()).unwrap()
}

fn bench_bucket_math(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_math");
    let buckets: Vec<Bucket> = [1000.0, 1500.0, 2000.0, 4000.0, 5000.0, 6000.0, 8000.0, f64::INFINITY]
        .iter()
        .enumerate()
        .map(|(i, le)| Bucket::new(*le, 11.0 + i as f64))
        .collect();

    group.bench_function("count_le", |b| {
        b.iter(|| black_box(count_le(black_box(&buckets), black_box(7500.0))));
    });
    group.bench_function("quantile_p99", |b| {
        b.iter(|| black_box(quantile(black_box(&buckets), black_box(0.99))));
    });
    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    let expression = "service IN (api, web) AND endpoint =~ \"^/users\" AND NOT EXISTS canary";

    group.bench_function("parse", |b| {
        b.iter(|| black_box(LabelFilter::parse(black_box(expression)).unwrap()));
    });

    let filter = LabelFilter::parse(expression).unwrap();
    let mut labels = LabelSet::new();
    labels.insert("service", "web");
    labels.insert("endpoint", "/users/42");
    group.bench_function("match", |b| {
        b.iter(|| black_box(filter.matches(black_box(&labels))));
    });
    group.finish();
}

fn bench_range_query(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("range_query");
    group.sample_size(20);

    for services in [10, 100] {
        let histograms = engine(histogram_samples(services, 60));
        let request = QueryRequest::new("latency_bucket", 0, 60 * MINUTE, 60)
            .time_aggregation(TimeReducer::Increase)
            .space_aggregation(SpaceReducer::Count)
            .threshold(7500.0, ComparisonOperator::Greater);
        group.bench_with_input(BenchmarkId::new("histogram_threshold", services), &request, |b, req| {
            b.iter(|| rt.block_on(histograms.query_range(req)).unwrap());
        });

        let gauges = engine(gauge_samples(services, 60));
        let request = QueryRequest::new("memory", 0, 60 * MINUTE, 60)
            .time_aggregation(TimeReducer::Avg)
            .space_aggregation(SpaceReducer::Sum);
        group.bench_with_input(BenchmarkId::new("gauge_sum", services), &request, |b, req| {
            b.iter(|| rt.block_on(gauges.query_range(req)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_bucket_math, bench_filter, bench_range_query);
criterion_main!(benches);
