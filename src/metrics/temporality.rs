//! Temporality normalizer.
//!
//! Turns a raw series into per-sample increments so delta and cumulative
//! series can be aggregated together. Gauges are instantaneous values and
//! pass through untouched, as do series already recorded as deltas.

use crate::core::{Sample, Series, Temporality, TimestampMs};

/// Output of [`normalize`] for one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// In-window points; increments for counters, raw values for gauges.
    pub points: Vec<Sample>,
    /// Number of in-window counter resets recovered.
    pub resets: usize,
    /// True when the first in-window cumulative sample had no earlier anchor
    /// and was dropped.
    pub unanchored: bool,
}

/// Normalize `series`, keeping only points at or after `window_start`.
///
/// Samples before `window_start` are used solely as anchors for the first
/// in-window increase of a cumulative series.
pub fn normalize(series: &Series, window_start: TimestampMs) -> Normalized {
    let cumulative = series.metric_type.is_monotonic()
        && matches!(series.temporality, Temporality::Cumulative | Temporality::Unspecified);

    if !cumulative {
        let points = series
            .samples()
            .iter()
            .filter(|s| s.timestamp_ms >= window_start)
            .copied()
            .collect();
        return Normalized {
            points,
            ..Normalized::default()
        };
    }

    let samples = series.samples();
    let mut out = Normalized {
        points: Vec::with_capacity(samples.len()),
        ..Normalized::default()
    };

    let mut previous: Option<f64> = None;
    for sample in samples {
        let in_window = sample.timestamp_ms >= window_start;
        match previous {
            Some(prev) if in_window => {
                let increase = if sample.value >= prev {
                    sample.value - prev
                } else {
                    // counter restarted from zero
                    out.resets += 1;
                    sample.value
                };
                out.points.push(Sample::new(sample.timestamp_ms, increase));
            },
            None if in_window => out.unanchored = true,
            _ => {},
        }
        previous = Some(sample.value);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LabelSet, MetricType, SeriesKey};

    fn series(metric_type: MetricType, temporality: Temporality, values: &[(i64, f64)]) -> Series {
        Series::new(
            SeriesKey::new("requests_total", LabelSet::new()),
            metric_type,
            temporality,
            values.iter().map(|&(t, v)| Sample::new(t, v)).collect(),
        )
        .unwrap()
    }

    fn values(n: &Normalized) -> Vec<f64> {
        n.points.iter().map(|p| p.value).collect()
    }

    #[test]
    fn test_counter_reset_contributes_new_value() {
        let s = series(
            MetricType::Sum,
            Temporality::Cumulative,
            &[(0, 10.0), (1, 20.0), (2, 5.0), (3, 15.0)],
        );
        let n = normalize(&s, 0);

        assert!(n.unanchored);
        assert_eq!(n.resets, 1);
        assert_eq!(values(&n), vec![10.0, 5.0, 10.0]);
        let ts: Vec<_> = n.points.iter().map(|p| p.timestamp_ms).collect();
        assert_eq!(ts, vec![1, 2, 3]);
    }

    #[test]
    fn test_anchor_before_window() {
        let s = series(
            MetricType::Histogram,
            Temporality::Cumulative,
            &[(-60, 100.0), (0, 110.0), (60, 130.0)],
        );
        let n = normalize(&s, 0);

        assert!(!n.unanchored);
        assert_eq!(values(&n), vec![10.0, 20.0]);
    }

    #[test]
    fn test_only_nearest_anchor_matters() {
        let s = series(
            MetricType::Sum,
            Temporality::Cumulative,
            &[(-120, 1.0), (-60, 50.0), (0, 55.0)],
        );
        let n = normalize(&s, 0);
        assert_eq!(values(&n), vec![5.0]);
    }

    #[test]
    fn test_delta_passes_through() {
        let s = series(
            MetricType::Histogram,
            Temporality::Delta,
            &[(-60, 9.0), (0, 12345.0), (60, 11.0)],
        );
        let n = normalize(&s, 0);

        assert!(!n.unanchored);
        assert_eq!(values(&n), vec![12345.0, 11.0]);
    }

    #[test]
    fn test_gauge_is_not_deltified() {
        let s = series(
            MetricType::Gauge,
            Temporality::Unspecified,
            &[(0, 400.0), (60, 300.0), (120, 800.0)],
        );
        let n = normalize(&s, 0);
        assert_eq!(values(&n), vec![400.0, 300.0, 800.0]);
        assert_eq!(n.resets, 0);
    }

    #[test]
    fn test_unspecified_counter_treated_as_cumulative() {
        let s = series(MetricType::Sum, Temporality::Unspecified, &[(0, 3.0), (1, 4.0)]);
        assert_eq!(values(&normalize(&s, 0)), vec![1.0]);
    }

    #[test]
    fn test_increases_never_negative() {
        let s = series(
            MetricType::Sum,
            Temporality::Cumulative,
            &[(0, 5.0), (1, 3.0), (2, 3.0), (3, 1.0), (4, 8.0)],
        );
        let n = normalize(&s, 0);
        assert!(n.points.iter().all(|p| p.value >= 0.0));
        assert_eq!(values(&n), vec![3.0, 0.0, 1.0, 7.0]);
        assert_eq!(n.resets, 2);
    }
}
