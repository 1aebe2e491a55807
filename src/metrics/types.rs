//! Intermediate shapes passed between engine stages.
//!
//! A series moves through the pipeline as
//! `Series` → normalized `Sample`s → `AlignedSeries` → `StepSeries`.

use crate::core::{LabelSet, MetricType, TimestampMs};
use std::collections::BTreeMap;

/// Running summary of the values that landed in one grid step.
///
/// Keeps enough state for every time reducer without holding the raw values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepAccumulator {
    pub sum: f64,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    /// Value of the latest sample pushed, by timestamp.
    pub last: f64,
    last_ts: TimestampMs,
}

impl StepAccumulator {
    pub fn new(timestamp_ms: TimestampMs, value: f64) -> Self {
        Self {
            sum: value,
            count: 1,
            min: value,
            max: value,
            last: value,
            last_ts: timestamp_ms,
        }
    }

    /// Fold one more value into the step.
    #[inline]
    pub fn push(&mut self, timestamp_ms: TimestampMs, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if timestamp_ms >= self.last_ts {
            self.last = value;
            self.last_ts = timestamp_ms;
        }
    }

    pub fn avg(&self) -> f64 {
        self.sum / self.count as f64
    }

    /// Merge two accumulators for the same step.
    pub fn merge(&mut self, other: &StepAccumulator) {
        self.sum += other.sum;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        if other.last_ts >= self.last_ts {
            self.last = other.last;
            self.last_ts = other.last_ts;
        }
    }
}

/// One series after step alignment. Absent steps are gaps.
#[derive(Debug, Clone)]
pub struct AlignedSeries {
    pub labels: LabelSet,
    pub metric_type: MetricType,
    pub steps: BTreeMap<TimestampMs, StepAccumulator>,
}

/// One value per present grid step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSeries {
    pub labels: LabelSet,
    pub points: BTreeMap<TimestampMs, f64>,
}

impl StepSeries {
    pub fn new(labels: LabelSet) -> Self {
        Self {
            labels,
            points: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn value_at(&self, timestamp_ms: TimestampMs) -> Option<f64> {
        self.points.get(&timestamp_ms).copied()
    }
}
