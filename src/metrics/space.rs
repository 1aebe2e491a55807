//! Space aggregator: merges time-aggregated series that share a group.
//!
//! Per-series workers hand their finished [`StepSeries`] to [`SpaceAggregator::accept`]
//! as they complete; values are collected per group and per grid step, and
//! nothing is reduced until every contributing series has been accepted.
//! A series with a gap at a step simply contributes nothing there, so a step
//! is only a gap for the group when no series reported at all.

use crate::core::{parse_le_label, LabelSet, TimestampMs, LE_LABEL};
use crate::metrics::aggregator::SpaceReducer;
use crate::metrics::types::StepSeries;
use ahash::AHashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Values reported by the members of one group, keyed by grid step.
pub type StepValues = BTreeMap<TimestampMs, SmallVec<[f64; 8]>>;

/// Fan-in point for per-series results.
pub struct SpaceAggregator {
    group_by: Vec<String>,
    keep_le: bool,
    groups: Mutex<AHashMap<LabelSet, StepValues>>,
}

impl SpaceAggregator {
    /// `group_by` lists the label keys retained in the output. With
    /// `keep_le`, histogram buckets stay apart by their `le` label.
    pub fn new(group_by: Vec<String>, keep_le: bool) -> Self {
        Self {
            group_by,
            keep_le,
            groups: Mutex::new(AHashMap::new()),
        }
    }

    /// Labels identifying the group `labels` belongs to.
    pub fn group_key(&self, labels: &LabelSet) -> LabelSet {
        let mut key = labels.project(self.group_by.iter().map(String::as_str));
        if self.keep_le {
            if let Some(le) = labels.get(LE_LABEL) {
                key.insert(LE_LABEL, le);
            }
        }
        key
    }

    /// Add one finished series. Safe to call from many workers at once.
    pub fn accept(&self, series: StepSeries) {
        if series.is_empty() {
            return;
        }
        let key = self.group_key(&series.labels);
        let mut groups = self.groups.lock();
        let steps = groups.entry(key).or_default();
        for (boundary, value) in series.points {
            steps.entry(boundary).or_default().push(value);
        }
    }

    /// Number of groups seen so far.
    pub fn group_count(&self) -> usize {
        self.groups.lock().len()
    }

    /// Collected values per group, ordered by group labels.
    pub fn into_groups(self) -> Vec<(LabelSet, StepValues)> {
        let mut groups: Vec<_> = self.groups.into_inner().into_iter().collect();
        groups.sort_by(|a, b| compare_labels(&a.0, &b.0));
        groups
    }

    /// Reduce every group step by step.
    pub fn reduce(self, reducer: SpaceReducer) -> Vec<StepSeries> {
        self.into_groups()
            .into_iter()
            .map(|(labels, steps)| reduce_group(labels, &steps, reducer))
            .collect()
    }
}

/// Reduce the values of one group at every step it has data for.
pub fn reduce_group(labels: LabelSet, steps: &StepValues, reducer: SpaceReducer) -> StepSeries {
    let mut out = StepSeries::new(labels);
    for (boundary, values) in steps {
        if let Some(value) = reducer.reduce(values) {
            out.points.insert(*boundary, value);
        }
    }
    out
}

/// Order label sets by their non-`le` labels, then by numeric bucket bound.
pub fn compare_labels(a: &LabelSet, b: &LabelSet) -> Ordering {
    a.without(LE_LABEL)
        .cmp(&b.without(LE_LABEL))
        .then_with(|| match (parse_le_label(a), parse_le_label(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => a.get(LE_LABEL).cmp(&b.get(LE_LABEL)),
        })
}
