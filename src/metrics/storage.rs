//! Sample store seam consumed by the query engine, plus an in-memory store.

use crate::core::{MetricSample, Result, Sample, Series, SeriesKey, StrataError, TimestampMs};
use crate::query::filter::LabelFilter;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Read access to stored samples.
#[async_trait::async_trait]
pub trait SampleStore: Send + Sync {
    /// Series of `metric_name` whose labels satisfy `filter`, trimmed to
    /// samples with `start_ms <= timestamp < end_ms`.
    ///
    /// Series with no samples in the range are not returned.
    async fn query(
        &self,
        metric_name: &str,
        filter: &LabelFilter,
        start_ms: TimestampMs,
        end_ms: TimestampMs,
    ) -> Result<Vec<Series>>;

    /// Number of distinct series held.
    async fn series_count(&self) -> Result<usize>;
}

/// Series kept in a concurrent map keyed by metric name and labels.
pub struct InMemorySampleStore {
    series: DashMap<SeriesKey, Series>,
    reserved: AtomicUsize,
    max_series: usize,
}

impl InMemorySampleStore {
    pub fn new(max_series: usize) -> Self {
        Self {
            series: DashMap::new(),
            reserved: AtomicUsize::new(0),
            max_series,
        }
    }

    /// Store one sample. A sample at an existing timestamp replaces it.
    ///
    /// The first sample of a series fixes its type and temporality; later
    /// samples that disagree are rejected. The check and the write happen
    /// under the same shard lock.
    pub fn insert(&self, sample: MetricSample) -> Result<()> {
        if !sample.value.is_finite() {
            return Err(StrataError::invalid_series(format!(
                "non-finite value {} for {}",
                sample.value,
                sample.key()
            )));
        }

        let point = Sample::new(sample.timestamp_ms, sample.value);
        match self.series.entry(sample.key()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get();
                if existing.metric_type != sample.metric_type
                    || existing.temporality != sample.temporality
                {
                    return Err(StrataError::invalid_series(format!(
                        "{} is stored as {} ({:?}), got {} ({:?})",
                        entry.key(),
                        existing.metric_type,
                        existing.temporality,
                        sample.metric_type,
                        sample.temporality
                    )));
                }
                entry.get_mut().upsert(point);
            },
            Entry::Vacant(entry) => {
                let series = Series::new(
                    entry.key().clone(),
                    sample.metric_type,
                    sample.temporality,
                    vec![point],
                )?;
                self.reserve_series()?;
                entry.insert(series);
            },
        }
        Ok(())
    }

    /// Claim room for one more series, or fail once `max_series` are held.
    fn reserve_series(&self) -> Result<()> {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_series).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|current| StrataError::SeriesLimitExceeded {
                current,
                limit: self.max_series,
            })
    }

    /// Store many samples, stopping at the first rejected one.
    pub fn insert_batch<I>(&self, samples: I) -> Result<usize>
    where
        I: IntoIterator<Item = MetricSample>,
    {
        let mut inserted = 0;
        for sample in samples {
            self.insert(sample)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Drop every stored series.
    pub fn clear(&self) {
        self.series.clear();
        self.reserved.store(0, Ordering::Release);
    }
}

impl Default for InMemorySampleStore {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

#[async_trait::async_trait]
impl SampleStore for InMemorySampleStore {
    async fn query(
        &self,
        metric_name: &str,
        filter: &LabelFilter,
        start_ms: TimestampMs,
        end_ms: TimestampMs,
    ) -> Result<Vec<Series>> {
        let mut matched = Vec::new();
        for entry in self.series.iter() {
            let series = entry.value();
            if series.key.metric_name != metric_name || !filter.matches(&series.key.labels) {
                continue;
            }
            let samples = series.range(start_ms, end_ms);
            if samples.is_empty() {
                continue;
            }
            matched.push(Series::new(
                series.key.clone(),
                series.metric_type,
                series.temporality,
                samples.to_vec(),
            )?);
        }
        matched.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(matched)
    }

    async fn series_count(&self) -> Result<usize> {
        Ok(self.series.len())
    }
}
