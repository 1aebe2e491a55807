//! Reducers and the per-series time aggregator.
//!
//! Reducers are closed enumerations resolved once when a query is planned;
//! the hot loops below only ever match on an already-chosen variant.

use crate::core::{Result, StrataError};
use crate::metrics::types::{AlignedSeries, StepAccumulator, StepSeries};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reduces the values of one series inside one grid step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeReducer {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    /// Sum of increments in the step; only meaningful on counters/histograms
    Increase,
    /// Increase divided by the step width in seconds
    Rate,
    /// Latest value observed in the step
    Latest,
}

/// Reduces the step values of several series into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SpaceReducer {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    /// Percentile in whole percent: 50, 75, 90, 95 or 99
    Percentile(u8),
}

const PERCENTILES: [u8; 5] = [50, 75, 90, 95, 99];

impl TimeReducer {
    /// Whether the reducer only makes sense over counter increments.
    pub fn requires_monotonic(&self) -> bool {
        matches!(self, TimeReducer::Increase | TimeReducer::Rate)
    }

    /// Collapse one step's accumulated values.
    #[inline]
    pub fn finish(&self, acc: &StepAccumulator, step_seconds: f64) -> f64 {
        match self {
            TimeReducer::Sum | TimeReducer::Increase => acc.sum,
            TimeReducer::Avg => acc.avg(),
            TimeReducer::Min => acc.min,
            TimeReducer::Max => acc.max,
            TimeReducer::Count => acc.count as f64,
            TimeReducer::Rate => acc.sum / step_seconds,
            TimeReducer::Latest => acc.last,
        }
    }

    /// Reduce a plain sequence of values observed in one step, in time order.
    pub fn reduce(&self, values: &[f64], step_seconds: f64) -> Option<f64> {
        let (first, rest) = values.split_first()?;
        let mut acc = StepAccumulator::new(0, *first);
        for (i, v) in rest.iter().enumerate() {
            acc.push(i as i64 + 1, *v);
        }
        Some(self.finish(&acc, step_seconds))
    }
}

impl SpaceReducer {
    /// Quantile in `[0, 1]` for percentile reducers.
    pub fn quantile(&self) -> Option<f64> {
        match self {
            SpaceReducer::Percentile(p) => Some(f64::from(*p) / 100.0),
            _ => None,
        }
    }

    /// Reduce the values present at one step. Returns `None` when nothing is present.
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let value = match self {
            SpaceReducer::Sum => values.iter().sum(),
            SpaceReducer::Avg => values.iter().sum::<f64>() / values.len() as f64,
            SpaceReducer::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            SpaceReducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            SpaceReducer::Count => values.len() as f64,
            SpaceReducer::Percentile(p) => {
                let mut sorted = values.to_vec();
                sorted.sort_unstable_by(|a, b| a.total_cmp(b));
                let rank = (f64::from(*p) / 100.0) * (sorted.len() - 1) as f64;
                let lo = rank.floor() as usize;
                let hi = rank.ceil() as usize;
                sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
            },
        };
        Some(value)
    }
}

/// Apply the time reducer to every present step of an aligned series.
pub fn aggregate_time(aligned: &AlignedSeries, reducer: TimeReducer, step_seconds: f64) -> StepSeries {
    let mut out = StepSeries::new(aligned.labels.clone());
    for (boundary, acc) in &aligned.steps {
        out.points.insert(*boundary, reducer.finish(acc, step_seconds));
    }
    out
}

impl FromStr for TimeReducer {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(TimeReducer::Sum),
            "avg" | "mean" => Ok(TimeReducer::Avg),
            "min" => Ok(TimeReducer::Min),
            "max" => Ok(TimeReducer::Max),
            "count" => Ok(TimeReducer::Count),
            "increase" => Ok(TimeReducer::Increase),
            "rate" => Ok(TimeReducer::Rate),
            "latest" | "last" => Ok(TimeReducer::Latest),
            other => Err(StrataError::invalid_query(format!(
                "unknown time aggregation '{}'",
                other
            ))),
        }
    }
}

impl FromStr for SpaceReducer {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "sum" => Ok(SpaceReducer::Sum),
            "avg" | "mean" => Ok(SpaceReducer::Avg),
            "min" => Ok(SpaceReducer::Min),
            "max" => Ok(SpaceReducer::Max),
            "count" => Ok(SpaceReducer::Count),
            other => other
                .strip_prefix('p')
                .and_then(|p| p.parse::<u8>().ok())
                .filter(|p| PERCENTILES.contains(p))
                .map(SpaceReducer::Percentile)
                .ok_or_else(|| {
                    StrataError::invalid_query(format!("unknown space aggregation '{}'", other))
                }),
        }
    }
}

impl TryFrom<String> for TimeReducer {
    type Error = StrataError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl TryFrom<String> for SpaceReducer {
    type Error = StrataError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeReducer> for String {
    fn from(value: TimeReducer) -> Self {
        value.to_string()
    }
}

impl From<SpaceReducer> for String {
    fn from(value: SpaceReducer) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeReducer::Sum => "sum",
            TimeReducer::Avg => "avg",
            TimeReducer::Min => "min",
            TimeReducer::Max => "max",
            TimeReducer::Count => "count",
            TimeReducer::Increase => "increase",
            TimeReducer::Rate => "rate",
            TimeReducer::Latest => "latest",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for SpaceReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpaceReducer::Sum => write!(f, "sum"),
            SpaceReducer::Avg => write!(f, "avg"),
            SpaceReducer::Min => write!(f, "min"),
            SpaceReducer::Max => write!(f, "max"),
            SpaceReducer::Count => write!(f, "count"),
            SpaceReducer::Percentile(p) => write!(f, "p{}", p),
        }
    }
}
