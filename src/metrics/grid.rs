//! Fixed-width step grid and the step aligner.
//!
//! Steps are half-open `[b, b + step)` intervals labelled by their start
//! boundary `b`. The first boundary is the query start rounded down to a
//! multiple of the step, so grids of equal step line up across queries.

use crate::core::{LabelSet, MetricType, Result, Sample, StrataError, TimestampMs};
use crate::metrics::types::{AlignedSeries, StepAccumulator};
use std::collections::BTreeMap;

/// Step boundaries covering `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    start: TimestampMs,
    end: TimestampMs,
    step_ms: i64,
    steps: usize,
}

impl Grid {
    /// Build a grid. `step_ms` must be positive and `end` after `start`.
    ///
    /// Ranges whose aligned start or span do not fit in an `i64` are rejected.
    pub fn new(start_ms: TimestampMs, end_ms: TimestampMs, step_ms: i64) -> Result<Self> {
        if step_ms <= 0 {
            return Err(StrataError::invalid_query(format!(
                "step must be positive, got {}ms",
                step_ms
            )));
        }
        if end_ms <= start_ms {
            return Err(StrataError::invalid_query(format!(
                "end ({}) must be after start ({})",
                end_ms, start_ms
            )));
        }
        let start = start_ms
            .checked_sub(start_ms.rem_euclid(step_ms))
            .ok_or_else(|| out_of_range(start_ms, end_ms))?;
        let span = end_ms
            .checked_sub(start)
            .ok_or_else(|| out_of_range(start_ms, end_ms))?;
        let steps = span / step_ms + i64::from(span % step_ms != 0);
        let steps = usize::try_from(steps).map_err(|_| out_of_range(start_ms, end_ms))?;
        Ok(Self {
            start,
            end: end_ms,
            step_ms,
            steps,
        })
    }

    /// First boundary (aligned).
    pub fn start(&self) -> TimestampMs {
        self.start
    }

    /// Exclusive end of the covered range.
    pub fn end(&self) -> TimestampMs {
        self.end
    }

    pub fn step_ms(&self) -> i64 {
        self.step_ms
    }

    pub fn step_seconds(&self) -> f64 {
        self.step_ms as f64 / 1000.0
    }

    /// Number of boundaries.
    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Boundaries in ascending order.
    pub fn boundaries(&self) -> impl Iterator<Item = TimestampMs> + '_ {
        (0..self.len() as i64).map(move |i| self.start + i * self.step_ms)
    }

    /// Boundary of the step containing `timestamp_ms`, if it is on the grid.
    #[inline]
    pub fn step_of(&self, timestamp_ms: TimestampMs) -> Option<TimestampMs> {
        if timestamp_ms < self.start || timestamp_ms >= self.end {
            return None;
        }
        Some(timestamp_ms - (timestamp_ms - self.start) % self.step_ms)
    }

    pub fn contains(&self, timestamp_ms: TimestampMs) -> bool {
        self.step_of(timestamp_ms).is_some()
    }
}

fn out_of_range(start_ms: TimestampMs, end_ms: TimestampMs) -> StrataError {
    StrataError::invalid_query(format!(
        "time range [{}, {}) is out of range",
        start_ms, end_ms
    ))
}

/// Bucket normalized values onto the grid.
///
/// Values falling in the same step are folded into one accumulator; steps
/// with no values are left out so they read as gaps rather than zeros.
/// Values outside the grid are ignored.
pub fn align(
    labels: LabelSet,
    metric_type: MetricType,
    points: &[Sample],
    grid: &Grid,
) -> AlignedSeries {
    let mut steps: BTreeMap<TimestampMs, StepAccumulator> = BTreeMap::new();
    for point in points {
        let Some(boundary) = grid.step_of(point.timestamp_ms) else {
            continue;
        };
        steps
            .entry(boundary)
            .and_modify(|acc| acc.push(point.timestamp_ms, point.value))
            .or_insert_with(|| StepAccumulator::new(point.timestamp_ms, point.value));
    }
    AlignedSeries {
        labels,
        metric_type,
        steps,
    }
}
