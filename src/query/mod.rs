//! Range queries over stored metrics.
//!
//! A [`QueryRequest`] names a metric, a time range and step, a label filter
//! and the reducers to apply. The engine validates it into a [`QueryPlan`],
//! runs it, and returns one [`ResultSeries`] per output group.

pub mod ast;
pub mod executor;
pub mod filter;
pub mod parser;
pub mod plan;

use crate::core::config::EngineConfig;
use crate::core::{Result, TimestampMs};
use crate::metrics::{EngineStats, EngineStatsSnapshot, SampleStore, StepSeries};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use ast::{FilterExpr, LogicalOp, Operator, Value};
pub use executor::{QueryExecutor, QueryOutput};
pub use filter::LabelFilter;
pub use parser::parse_filter;
pub use plan::{QueryPlan, QueryRequest, ThresholdRequest};

/// High-level query API
pub struct QueryEngine {
    executor: QueryExecutor,
    config: EngineConfig,
    stats: Arc<EngineStats>,
}

impl QueryEngine {
    /// Create an engine over `store` with its own worker pool
    pub fn new(store: Arc<dyn SampleStore>, config: EngineConfig) -> Result<Self> {
        let stats = Arc::new(EngineStats::new());
        let executor = QueryExecutor::new(store, config.worker_threads, Arc::clone(&stats))?;
        Ok(Self {
            executor,
            config,
            stats,
        })
    }

    /// Run a range query
    pub async fn query_range(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let plan = self.validate(request)?;
        let output = self.executor.execute(plan).await?;
        Ok(QueryResponse::success(output.series))
    }

    /// Validate a request without executing it
    pub fn validate(&self, request: &QueryRequest) -> Result<QueryPlan> {
        QueryPlan::build(request, &self.config)
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn store(&self) -> &Arc<dyn SampleStore> {
        self.executor.store()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Successful query response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: String,
    pub data: QueryData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryData {
    pub series: Vec<ResultSeries>,
}

/// One output series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSeries {
    pub labels: Vec<Label>,
    pub values: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub timestamp_ms: TimestampMs,
    pub value: f64,
}

impl QueryResponse {
    pub fn success(series: Vec<StepSeries>) -> Self {
        Self {
            status: "success".to_string(),
            data: QueryData {
                series: series.into_iter().map(ResultSeries::from).collect(),
            },
        }
    }
}

impl ResultSeries {
    /// Value of the label `key`, if present.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }
}

impl From<StepSeries> for ResultSeries {
    fn from(series: StepSeries) -> Self {
        Self {
            labels: series
                .labels
                .iter()
                .map(|(key, value)| Label {
                    key: key.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            values: series
                .points
                .into_iter()
                .map(|(timestamp_ms, value)| Point {
                    timestamp_ms,
                    value,
                })
                .collect(),
        }
    }
}
