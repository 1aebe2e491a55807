//! Histogram bucket evaluation: threshold counts and quantiles.
//!
//! Inputs are per-step bucket counts (already turned into increases and
//! summed per `le` by the earlier stages). For every step the buckets are
//! sorted by bound and forced to be non-decreasing, then either
//!
//! - counted against a threshold (`<=` interpolates linearly between the
//!   surrounding finite bounds, `>` is the complement against the total), or
//! - searched for a quantile rank.
//!
//! Nothing is assumed about the distribution past the last finite bound: a
//! threshold at or above it reports that bound's count, and a quantile that
//! lands in the `+Inf` bucket reports the bound itself.

use crate::core::{parse_le_label, LabelSet, Result, StrataError, TimestampMs};
use crate::metrics::stats::EngineStats;
use crate::metrics::types::StepSeries;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One bucket at one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// Inclusive upper bound; `f64::INFINITY` for the overflow bucket
    pub le: f64,
    /// Observations at or below `le`
    pub count: f64,
}

impl Bucket {
    pub fn new(le: f64, count: f64) -> Self {
        Self { le, count }
    }
}

/// Buckets observed at one step.
pub type StepBuckets = SmallVec<[Bucket; 16]>;

/// Comparison applied to a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComparisonOperator {
    /// Observations less than or equal to the threshold
    LessOrEqual,
    /// Observations strictly greater than the threshold
    Greater,
}

/// Threshold and operator for a bucket count query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSpec {
    pub threshold: f64,
    pub operator: ComparisonOperator,
}

/// What to compute from each step's buckets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BucketMode {
    Threshold(ThresholdSpec),
    /// Quantile in `[0, 1]`
    Quantile(f64),
}

/// Sort by bound and clamp counts to be non-decreasing.
///
/// Buckets with the same bound are merged by summing. Returns true when a
/// count had to be raised, which means the input was inconsistent.
pub fn prepare_buckets(buckets: &mut StepBuckets) -> bool {
    buckets.sort_by(|a, b| a.le.total_cmp(&b.le));
    buckets.dedup_by(|next, kept| {
        if next.le == kept.le {
            kept.count += next.count;
            true
        } else {
            false
        }
    });

    let mut clamped = false;
    let mut running = f64::NEG_INFINITY;
    for bucket in buckets.iter_mut() {
        if bucket.count < running {
            bucket.count = running;
            clamped = true;
        }
        running = bucket.count;
    }
    clamped
}

/// Total observations: the `+Inf` bucket, or the largest bucket without one.
pub fn total_count(buckets: &[Bucket]) -> f64 {
    buckets.last().map_or(0.0, |b| b.count)
}

/// Interpolated number of observations `<= threshold`.
///
/// Expects buckets prepared by [`prepare_buckets`]. Below the smallest bound
/// the lower edge is taken as `(0, 0)`.
pub fn count_le(buckets: &[Bucket], threshold: f64) -> f64 {
    let finite_len = buckets.partition_point(|b| b.le.is_finite());
    let finite = &buckets[..finite_len];
    let Some(last) = finite.last() else {
        return 0.0;
    };
    if threshold >= last.le {
        return last.count;
    }

    let idx = finite.partition_point(|b| b.le < threshold);
    let upper = finite[idx];
    if upper.le == threshold {
        return upper.count;
    }
    let lower = if idx == 0 {
        Bucket::new(0.0, 0.0)
    } else {
        finite[idx - 1]
    };
    if threshold <= lower.le || upper.le <= lower.le {
        return lower.count;
    }
    lower.count + (upper.count - lower.count) * (threshold - lower.le) / (upper.le - lower.le)
}

/// Evaluate a threshold comparison over prepared buckets.
pub fn evaluate_threshold(buckets: &[Bucket], spec: ThresholdSpec) -> Option<f64> {
    if buckets.is_empty() {
        return None;
    }
    let at_or_below = count_le(buckets, spec.threshold);
    Some(match spec.operator {
        ComparisonOperator::LessOrEqual => at_or_below,
        ComparisonOperator::Greater => total_count(buckets) - at_or_below,
    })
}

/// Estimate the `q` quantile from prepared buckets.
///
/// Returns `None` when there are no observations or no finite bound to
/// report.
pub fn quantile(buckets: &[Bucket], q: f64) -> Option<f64> {
    let total = total_count(buckets);
    if buckets.is_empty() || total <= 0.0 {
        return None;
    }
    let rank = q.clamp(0.0, 1.0) * total;
    let idx = buckets.partition_point(|b| b.count < rank).min(buckets.len() - 1);
    let upper = buckets[idx];

    if !upper.le.is_finite() {
        return buckets[..idx].iter().rev().find(|b| b.le.is_finite()).map(|b| b.le);
    }

    let lower = if idx == 0 {
        Bucket::new(0.0, 0.0)
    } else {
        buckets[idx - 1]
    };
    if upper.count <= lower.count {
        return Some(upper.le);
    }
    Some(lower.le + (upper.le - lower.le) * (rank - lower.count) / (upper.count - lower.count))
}

/// Join per-`le` series of one group into per-step bucket lists.
///
/// Series without a parseable `le` label are skipped.
pub fn collect_buckets(bucket_series: &[StepSeries]) -> BTreeMap<TimestampMs, StepBuckets> {
    let mut steps: BTreeMap<TimestampMs, StepBuckets> = BTreeMap::new();
    for series in bucket_series {
        let Some(le) = parse_le_label(&series.labels) else {
            tracing::warn!(labels = %series.labels, "Skipping bucket series without a valid le label");
            continue;
        };
        for (boundary, count) in &series.points {
            steps.entry(*boundary).or_default().push(Bucket::new(le, *count));
        }
    }
    steps
}

/// Evaluate one group's buckets at every step that has any.
pub fn evaluate_group(
    labels: LabelSet,
    bucket_series: &[StepSeries],
    mode: BucketMode,
    stats: &EngineStats,
) -> StepSeries {
    let mut out = StepSeries::new(labels);
    for (boundary, mut buckets) in collect_buckets(bucket_series) {
        if prepare_buckets(&mut buckets) {
            stats.record_non_monotonic();
            tracing::warn!(
                step = boundary,
                group = %out.labels,
                "Non-monotonic histogram buckets clamped"
            );
        }
        let value = match mode {
            BucketMode::Threshold(spec) => evaluate_threshold(&buckets, spec),
            BucketMode::Quantile(q) => quantile(&buckets, q),
        };
        if let Some(value) = value {
            out.points.insert(boundary, value);
        }
    }
    out
}

impl FromStr for ComparisonOperator {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "<=" => Ok(ComparisonOperator::LessOrEqual),
            ">" => Ok(ComparisonOperator::Greater),
            other => Err(StrataError::invalid_query(format!(
                "unsupported comparison operator '{}', expected '<=' or '>'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ComparisonOperator {
    type Error = StrataError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ComparisonOperator> for String {
    fn from(value: ComparisonOperator) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonOperator::LessOrEqual => write!(f, "<="),
            ComparisonOperator::Greater => write!(f, ">"),
        }
    }
}
