//! Query executor that runs validated plans against a sample store.
//!
//! Per-series stages (normalize, align, time-reduce) run on the engine's
//! rayon pool inside a blocking task; results fan in to a
//! [`SpaceAggregator`]. Histogram bucket evaluation then joins the
//! per-`le` results step by step. The whole pipeline races the plan's
//! deadline; on expiry outstanding work is cancelled and nothing partial
//! is returned.

use super::plan::QueryPlan;
use crate::core::{LabelSet, MetricType, Result, Series, StrataError, LE_LABEL};
use crate::metrics::histogram::{evaluate_group, BucketMode};
use crate::metrics::{
    aggregate_time, align, normalize, EngineStats, SampleStore, SpaceAggregator, SpaceReducer,
    StepSeries,
};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Output of one executed plan.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub series: Vec<StepSeries>,
    pub series_scanned: usize,
    pub elapsed: Duration,
}

/// Query executor that runs plans against the store
pub struct QueryExecutor {
    store: Arc<dyn SampleStore>,
    pool: Arc<rayon::ThreadPool>,
    stats: Arc<EngineStats>,
}

impl QueryExecutor {
    /// Create an executor with its own worker pool. `worker_threads == 0`
    /// sizes the pool to the available cores.
    pub fn new(store: Arc<dyn SampleStore>, worker_threads: usize, stats: Arc<EngineStats>) -> Result<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("strata-worker-{}", i));
        if worker_threads > 0 {
            builder = builder.num_threads(worker_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| StrataError::config(format!("failed to start worker pool: {}", e)))?;

        Ok(Self {
            store,
            pool: Arc::new(pool),
            stats,
        })
    }

    pub fn store(&self) -> &Arc<dyn SampleStore> {
        &self.store
    }

    /// Execute a validated plan
    pub async fn execute(&self, plan: QueryPlan) -> Result<QueryOutput> {
        self.stats.record_query();
        let result = self.run(plan).await;
        if let Err(e) = &result {
            self.stats.record_failure();
            tracing::debug!(error = %e, category = e.category(), "Query failed");
        }
        result
    }

    async fn run(&self, plan: QueryPlan) -> Result<QueryOutput> {
        let started = Instant::now();
        tracing::debug!(
            metric = %plan.metric_name,
            filter = %plan.filter,
            steps = plan.grid.len(),
            time_reducer = %plan.time_reducer,
            space_reducer = %plan.space_reducer,
            "Executing query"
        );

        let series = self
            .store
            .query(&plan.metric_name, &plan.filter, plan.fetch_start(), plan.grid.end())
            .await?;

        let Some(metric_type) = common_metric_type(&plan.metric_name, &series)? else {
            return Ok(QueryOutput {
                series: Vec::new(),
                series_scanned: 0,
                elapsed: started.elapsed(),
            });
        };
        plan.check_metric_type(metric_type)?;

        let series_scanned = series.len();
        self.stats.record_series(series_scanned);

        let timeout = plan.timeout;
        let cancel = Arc::new(AtomicBool::new(false));
        let task = {
            let pool = Arc::clone(&self.pool);
            let stats = Arc::clone(&self.stats);
            let cancel = Arc::clone(&cancel);
            tokio::task::spawn_blocking(move || {
                run_pipeline(&pool, &plan, metric_type, series, &cancel, &stats)
            })
        };

        let output = match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined??,
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                self.stats.record_timeout();
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    series = series_scanned,
                    "Query deadline exceeded, cancelling"
                );
                return Err(StrataError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            },
        };

        let elapsed = started.elapsed();
        tracing::info!(
            series_in = series_scanned,
            series_out = output.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Query completed"
        );

        Ok(QueryOutput {
            series: output,
            series_scanned,
            elapsed,
        })
    }
}

/// The one metric type shared by all fetched series, if any were fetched.
fn common_metric_type(metric_name: &str, series: &[Series]) -> Result<Option<MetricType>> {
    let Some(first) = series.first() else {
        return Ok(None);
    };
    if let Some(other) = series.iter().find(|s| s.metric_type != first.metric_type) {
        return Err(StrataError::invalid_query(format!(
            "metric {} mixes {} and {} series; narrow the filter",
            metric_name, first.metric_type, other.metric_type
        )));
    }
    Ok(Some(first.metric_type))
}

/// Reducer applied across series that share a group and bucket bound.
///
/// Histogram buckets are counts, so `sum` and `count` both add them, and
/// percentiles are taken over the added buckets afterwards.
fn bucket_reducer(metric_type: MetricType, reducer: SpaceReducer) -> SpaceReducer {
    match (metric_type, reducer) {
        (MetricType::Histogram, SpaceReducer::Count | SpaceReducer::Percentile(_)) => {
            SpaceReducer::Sum
        },
        (_, reducer) => reducer,
    }
}

fn run_pipeline(
    pool: &rayon::ThreadPool,
    plan: &QueryPlan,
    metric_type: MetricType,
    series: Vec<Series>,
    cancel: &AtomicBool,
    stats: &EngineStats,
) -> Result<Vec<StepSeries>> {
    let histogram = metric_type == MetricType::Histogram;
    let space = SpaceAggregator::new(plan.group_by.clone(), histogram);
    let step_seconds = plan.grid.step_seconds();

    pool.install(|| {
        series.par_iter().try_for_each(|s| {
            if cancel.load(Ordering::Relaxed) {
                return Err(StrataError::Cancelled);
            }
            let normalized = normalize(s, plan.grid.start());
            stats.record_resets(normalized.resets);
            if normalized.unanchored {
                stats.record_unanchored();
            }
            if normalized.resets > 0 {
                tracing::debug!(series = %s.key, resets = normalized.resets, "Counter resets");
            }
            let aligned = align(s.key.labels.clone(), s.metric_type, &normalized.points, &plan.grid);
            space.accept(aggregate_time(&aligned, plan.time_reducer, step_seconds));
            Ok(())
        })
    })?;

    if cancel.load(Ordering::Relaxed) {
        return Err(StrataError::Cancelled);
    }

    let reduced = space.reduce(bucket_reducer(metric_type, plan.space_reducer));
    let mode = match plan.bucket_mode() {
        Some(mode) if histogram => mode,
        _ => return Ok(reduced),
    };
    Ok(collapse_buckets(reduced, mode, stats))
}

/// Evaluate each group's buckets into a single series.
fn collapse_buckets(bucket_series: Vec<StepSeries>, mode: BucketMode, stats: &EngineStats) -> Vec<StepSeries> {
    let mut groups: BTreeMap<LabelSet, Vec<StepSeries>> = BTreeMap::new();
    for series in bucket_series {
        groups.entry(series.labels.without(LE_LABEL)).or_default().push(series);
    }
    groups
        .into_iter()
        .map(|(labels, buckets)| evaluate_group(labels, &buckets, mode, stats))
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::core::{MetricSample, Temporality};
    use crate::metrics::InMemorySampleStore;
    use crate::query::plan::QueryRequest;

    const MIN: i64 = 60_000;

    fn executor(store: InMemorySampleStore) -> QueryExecutor {
        QueryExecutor::new(Arc::new(store), 2, Arc::new(EngineStats::new())).unwrap()
    }

    fn counter(store: &InMemorySampleStore, host: &str, values: &[(i64, f64)]) {
        for &(minute, value) in values {
            store
                .insert(MetricSample {
                    metric_name: "requests_total".to_string(),
                    labels: LabelSet::new().with("host", host),
                    timestamp_ms: minute * MIN,
                    value,
                    temporality: Temporality::Cumulative,
                    metric_type: MetricType::Sum,
                })
                .unwrap();
        }
    }

    fn plan(request: QueryRequest) -> QueryPlan {
        QueryPlan::build(&request, &EngineConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_counter_reset_and_anchor() {
        let store = InMemorySampleStore::new(10);
        counter(&store, "a", &[(9, 5.0), (10, 10.0), (11, 20.0), (12, 5.0), (13, 15.0)]);
        let exec = executor(store);

        let request = QueryRequest::new("requests_total", 10 * MIN, 14 * MIN, 60)
            .time_aggregation(crate::metrics::TimeReducer::Increase);
        let out = exec.execute(plan(request)).await.unwrap();

        assert_eq!(out.series.len(), 1);
        let values: Vec<_> = out.series[0].points.values().copied().collect();
        // minute 9 anchors minute 10
        assert_eq!(values, vec![5.0, 10.0, 5.0, 10.0]);
        assert_eq!(exec.stats.snapshot().counter_resets, 1);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_error() {
        let exec = executor(InMemorySampleStore::new(10));
        let out = exec
            .execute(plan(QueryRequest::new("missing", 0, 10 * MIN, 60)))
            .await
            .unwrap();
        assert!(out.series.is_empty());
        assert_eq!(exec.stats.snapshot().queries_failed, 0);
    }

    #[tokio::test]
    async fn test_type_mismatch_rejected() {
        let store = InMemorySampleStore::new(10);
        store
            .insert(MetricSample {
                metric_name: "memory".to_string(),
                labels: LabelSet::new(),
                timestamp_ms: 0,
                value: 1.0,
                temporality: Temporality::Unspecified,
                metric_type: MetricType::Gauge,
            })
            .unwrap();
        let exec = executor(store);

        let request = QueryRequest::new("memory", 0, 10 * MIN, 60)
            .time_aggregation(crate::metrics::TimeReducer::Rate);
        let err = exec.execute(plan(request)).await.unwrap_err();
        assert!(matches!(err, StrataError::InvalidQuery(_)));
        assert_eq!(exec.stats.snapshot().queries_failed, 1);
    }

    #[tokio::test]
    async fn test_idempotent() {
        let store = InMemorySampleStore::new(10);
        counter(&store, "a", &[(0, 1.0), (1, 3.0), (2, 6.0)]);
        counter(&store, "b", &[(0, 2.0), (1, 2.0), (2, 9.0)]);
        let exec = executor(store);

        let request = QueryRequest::new("requests_total", 0, 3 * MIN, 60).group_by("host");
        let first = exec.execute(plan(request.clone())).await.unwrap();
        let second = exec.execute(plan(request)).await.unwrap();
        assert_eq!(first.series, second.series);
        assert_eq!(first.series.len(), 2);
    }

    #[tokio::test]
    async fn test_deadline_expiry_returns_timeout() {
        let store = InMemorySampleStore::new(10);
        counter(&store, "a", &[(0, 1.0), (1, 3.0), (2, 6.0)]);
        let exec = QueryExecutor::new(Arc::new(store), 1, Arc::new(EngineStats::new())).unwrap();

        // park the only worker so the pipeline cannot start before the deadline
        let (release, parked) = std::sync::mpsc::channel::<()>();
        exec.pool.spawn(move || {
            let _ = parked.recv();
        });

        let mut request = QueryRequest::new("requests_total", 0, 3 * MIN, 60);
        request.timeout_ms = Some(50);
        let err = exec.execute(plan(request.clone())).await.unwrap_err();
        assert!(matches!(err, StrataError::Timeout { timeout_ms: 50 }), "{:?}", err);

        let stats = exec.stats.snapshot();
        assert_eq!(stats.queries_timed_out, 1);
        assert_eq!(stats.queries_failed, 1);

        release.send(()).unwrap();
        request.timeout_ms = None;
        let out = exec.execute(plan(request)).await.unwrap();
        assert_eq!(out.series.len(), 1);
        assert_eq!(exec.stats.snapshot().queries_timed_out, 1);
    }

    #[test]
    fn test_cancelled_pipeline_returns_nothing() {
        let series = vec![Series::new(
            crate::core::SeriesKey::new("requests_total", LabelSet::new()),
            MetricType::Sum,
            Temporality::Cumulative,
            vec![crate::core::Sample::new(0, 1.0)],
        )
        .unwrap()];
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let cancel = AtomicBool::new(true);
        let result = run_pipeline(
            &pool,
            &plan(QueryRequest::new("requests_total", 0, 2 * MIN, 60)),
            MetricType::Sum,
            series,
            &cancel,
            &EngineStats::new(),
        );
        assert!(matches!(result, Err(StrataError::Cancelled)));
    }
}
