//! Query requests and their validation into an executable plan.

use super::filter::LabelFilter;
use crate::core::config::EngineConfig;
use crate::core::{MetricType, Result, StrataError, TimestampMs};
use crate::metrics::{BucketMode, ComparisonOperator, Grid, SpaceReducer, ThresholdSpec, TimeReducer};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Range query as sent by callers.
///
/// Reducers and the operator are kept as text so that unknown names are
/// reported as invalid queries rather than malformed JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub metric_name: String,
    pub start_ms: TimestampMs,
    pub end_ms: TimestampMs,
    pub step_seconds: i64,
    pub time_aggregation: String,
    pub space_aggregation: String,
    #[serde(default, alias = "label_filter_expression")]
    pub filter_expression: String,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub comparison_space_aggregation: Option<ThresholdRequest>,
    /// Per-request deadline; the engine default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Threshold parameters for histogram bucket counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRequest {
    pub threshold: f64,
    pub operator: String,
}

impl QueryRequest {
    pub fn new<S: Into<String>>(metric_name: S, start_ms: TimestampMs, end_ms: TimestampMs, step_seconds: i64) -> Self {
        Self {
            metric_name: metric_name.into(),
            start_ms,
            end_ms,
            step_seconds,
            time_aggregation: TimeReducer::Sum.to_string(),
            space_aggregation: SpaceReducer::Sum.to_string(),
            filter_expression: String::new(),
            group_by: Vec::new(),
            comparison_space_aggregation: None,
            timeout_ms: None,
        }
    }

    pub fn time_aggregation(mut self, reducer: TimeReducer) -> Self {
        self.time_aggregation = reducer.to_string();
        self
    }

    pub fn space_aggregation(mut self, reducer: SpaceReducer) -> Self {
        self.space_aggregation = reducer.to_string();
        self
    }

    pub fn filter<S: Into<String>>(mut self, expression: S) -> Self {
        self.filter_expression = expression.into();
        self
    }

    pub fn group_by<S: Into<String>>(mut self, key: S) -> Self {
        self.group_by.push(key.into());
        self
    }

    pub fn threshold(mut self, threshold: f64, operator: ComparisonOperator) -> Self {
        self.comparison_space_aggregation = Some(ThresholdRequest {
            threshold,
            operator: operator.to_string(),
        });
        self
    }
}

/// Validated query, ready to run.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub metric_name: String,
    pub grid: Grid,
    pub lookback_ms: i64,
    fetch_start_ms: TimestampMs,
    pub time_reducer: TimeReducer,
    pub space_reducer: SpaceReducer,
    pub filter: LabelFilter,
    pub group_by: Vec<String>,
    pub threshold: Option<ThresholdSpec>,
    pub timeout: Duration,
}

impl QueryPlan {
    /// Check everything that does not depend on stored data.
    pub fn build(request: &QueryRequest, engine: &EngineConfig) -> Result<Self> {
        let metric_name = request.metric_name.trim();
        if metric_name.is_empty() {
            return Err(StrataError::invalid_query("metric_name is required"));
        }
        if request.step_seconds <= 0 {
            return Err(StrataError::invalid_query(format!(
                "step_seconds must be positive, got {}",
                request.step_seconds
            )));
        }
        let step_ms = request
            .step_seconds
            .checked_mul(1000)
            .ok_or_else(|| StrataError::invalid_query("step_seconds is too large"))?;

        let grid = Grid::new(request.start_ms, request.end_ms, step_ms)?;
        if grid.len() > engine.max_points {
            return Err(StrataError::invalid_query(format!(
                "query spans {} steps, limit is {}; use a larger step",
                grid.len(),
                engine.max_points
            )));
        }

        let time_reducer: TimeReducer = request.time_aggregation.parse()?;
        let space_reducer: SpaceReducer = request.space_aggregation.parse()?;

        let threshold = match &request.comparison_space_aggregation {
            None => None,
            Some(t) => {
                if !t.threshold.is_finite() {
                    return Err(StrataError::invalid_query("threshold must be a finite number"));
                }
                if !matches!(space_reducer, SpaceReducer::Sum | SpaceReducer::Count) {
                    return Err(StrataError::invalid_query(format!(
                        "threshold queries need sum or count space aggregation, got {}",
                        space_reducer
                    )));
                }
                Some(ThresholdSpec {
                    threshold: t.threshold,
                    operator: t.operator.parse()?,
                })
            },
        };

        let mut group_by = Vec::with_capacity(request.group_by.len());
        for key in &request.group_by {
            let key = key.trim();
            if key.is_empty() {
                return Err(StrataError::invalid_query("group_by keys must not be empty"));
            }
            if !group_by.iter().any(|k: &String| k == key) {
                group_by.push(key.to_string());
            }
        }

        let filter = LabelFilter::parse(&request.filter_expression)?;
        let lookback_ms = i64::try_from(engine.lookback.as_millis())
            .unwrap_or(i64::MAX)
            .max(step_ms);
        let fetch_start_ms = grid.start().checked_sub(lookback_ms).ok_or_else(|| {
            StrataError::invalid_query(format!(
                "start_ms {} leaves no room for a {}ms lookback",
                request.start_ms, lookback_ms
            ))
        })?;
        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(engine.query_timeout);

        Ok(Self {
            metric_name: metric_name.to_string(),
            grid,
            lookback_ms,
            fetch_start_ms,
            time_reducer,
            space_reducer,
            filter,
            group_by,
            threshold,
            timeout,
        })
    }

    /// Earliest timestamp to fetch, leaving room for increase anchors.
    pub fn fetch_start(&self) -> TimestampMs {
        self.fetch_start_ms
    }

    /// How histogram buckets are collapsed, if they are.
    pub fn bucket_mode(&self) -> Option<BucketMode> {
        match (self.threshold, self.space_reducer.quantile()) {
            (Some(spec), _) => Some(BucketMode::Threshold(spec)),
            (None, Some(q)) => Some(BucketMode::Quantile(q)),
            (None, None) => None,
        }
    }

    /// Check the plan against the type of the stored metric.
    pub fn check_metric_type(&self, metric_type: MetricType) -> Result<()> {
        if metric_type == MetricType::Gauge && self.time_reducer.requires_monotonic() {
            return Err(StrataError::invalid_query(format!(
                "time aggregation {} is not defined for gauge metric {}",
                self.time_reducer, self.metric_name
            )));
        }
        if metric_type != MetricType::Histogram {
            if self.threshold.is_some() {
                return Err(StrataError::invalid_query(format!(
                    "threshold queries need a histogram metric, {} is a {}",
                    self.metric_name, metric_type
                )));
            }
            if self.space_reducer.quantile().is_some() {
                return Err(StrataError::invalid_query(format!(
                    "{} needs a histogram metric, {} is a {}",
                    self.space_reducer, self.metric_name, metric_type
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    fn engine() -> EngineConfig {
        EngineConfig::default()
    }

    fn request() -> QueryRequest {
        QueryRequest::new("http_duration_bucket", 10 * HOUR, 11 * HOUR, 60)
    }

    #[test]
    fn test_build_defaults() {
        let plan = QueryPlan::build(&request(), &engine()).unwrap();
        assert_eq!(plan.grid.len(), 60);
        assert_eq!(plan.time_reducer, TimeReducer::Sum);
        assert!(plan.filter.is_all());
        assert_eq!(plan.lookback_ms, 300_000);
        assert_eq!(plan.fetch_start(), 10 * HOUR - 300_000);
        assert_eq!(plan.timeout, engine().query_timeout);
        assert!(plan.bucket_mode().is_none());
    }

    #[test]
    fn test_lookback_at_least_one_step() {
        let mut req = request();
        req.step_seconds = 3600;
        let plan = QueryPlan::build(&req, &engine()).unwrap();
        assert_eq!(plan.lookback_ms, HOUR);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut req = request();
        req.step_seconds = 0;
        assert!(matches!(QueryPlan::build(&req, &engine()), Err(StrataError::InvalidQuery(_))));

        let mut req = request();
        req.end_ms = req.start_ms;
        assert!(matches!(QueryPlan::build(&req, &engine()), Err(StrataError::InvalidQuery(_))));

        let mut req = request();
        req.step_seconds = 1;
        req.end_ms = req.start_ms + 24 * HOUR;
        assert!(matches!(QueryPlan::build(&req, &engine()), Err(StrataError::InvalidQuery(_))));
    }

    #[test]
    fn test_rejects_ranges_near_timestamp_limits() {
        let cases = [
            (i64::MIN + 1, i64::MIN + 120_000),
            (-(1 << 62) - 5, (1 << 62) + 5),
            // grid fits, lookback would not
            (i64::MIN + 240_000, i64::MIN + 600_000),
        ];
        for (start, end) in cases {
            let req = QueryRequest::new("m", start, end, 60);
            let result = QueryPlan::build(&req, &engine());
            assert!(matches!(result, Err(StrataError::InvalidQuery(_))), "{} {}", start, end);
        }
    }

    #[test]
    fn test_rejects_unknown_names() {
        let mut req = request();
        req.time_aggregation = "median".to_string();
        assert!(matches!(QueryPlan::build(&req, &engine()), Err(StrataError::InvalidQuery(_))));

        let mut req = request();
        req.comparison_space_aggregation = Some(ThresholdRequest {
            threshold: 1000.0,
            operator: "<".to_string(),
        });
        assert!(matches!(QueryPlan::build(&req, &engine()), Err(StrataError::InvalidQuery(_))));

        let req = request().filter("service = ");
        assert!(matches!(QueryPlan::build(&req, &engine()), Err(StrataError::Parse { .. })));
    }

    #[test]
    fn test_threshold_validation() {
        let req = request()
            .space_aggregation(SpaceReducer::Count)
            .threshold(1000.0, ComparisonOperator::LessOrEqual);
        let plan = QueryPlan::build(&req, &engine()).unwrap();
        assert!(matches!(plan.bucket_mode(), Some(BucketMode::Threshold(_))));
        assert!(plan.check_metric_type(MetricType::Histogram).is_ok());
        assert!(plan.check_metric_type(MetricType::Gauge).is_err());

        let req = request()
            .space_aggregation(SpaceReducer::Avg)
            .threshold(1000.0, ComparisonOperator::Greater);
        assert!(QueryPlan::build(&req, &engine()).is_err());
    }

    #[test]
    fn test_metric_type_checks() {
        let plan = QueryPlan::build(&request().time_aggregation(TimeReducer::Rate), &engine()).unwrap();
        assert!(plan.check_metric_type(MetricType::Gauge).is_err());
        assert!(plan.check_metric_type(MetricType::Sum).is_ok());

        let plan = QueryPlan::build(&request().space_aggregation(SpaceReducer::Percentile(95)), &engine())
            .unwrap();
        assert!(matches!(plan.bucket_mode(), Some(BucketMode::Quantile(q)) if (q - 0.95).abs() < 1e-12));
        assert!(plan.check_metric_type(MetricType::Sum).is_err());
    }

    #[test]
    fn test_request_json() {
        let json = r#"{
            "metric_name": "m", "start_ms": 0, "end_ms": 60000, "step_seconds": 60,
            "time_aggregation": "increase", "space_aggregation": "count",
            "label_filter_expression": "endpoint = \"/health\"",
            "comparison_space_aggregation": {"threshold": 1000, "operator": "<="}
        }"#;
        let req: QueryRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.filter_expression, "endpoint = \"/health\"");
        assert!(req.group_by.is_empty());
        let plan = QueryPlan::build(&req, &engine()).unwrap();
        assert_eq!(plan.threshold.unwrap().operator, ComparisonOperator::LessOrEqual);
    }
}
