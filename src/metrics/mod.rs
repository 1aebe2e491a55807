//! Aggregation engine stages.
//!
//! A query flows through these stages per series:
//! - [`temporality`]: cumulative counters become per-sample increases
//! - [`grid`]: increases or gauge values are folded into grid steps
//! - [`aggregator`]: each step is reduced to one value per series
//!
//! and then across series:
//! - [`space`]: steps of series in the same group are merged
//! - [`histogram`]: bucket series are joined per step for thresholds and quantiles

pub mod aggregator;
pub mod fixture;
pub mod grid;
pub mod histogram;
pub mod space;
pub mod stats;
pub mod storage;
pub mod temporality;
pub mod types;

pub use aggregator::{aggregate_time, SpaceReducer, TimeReducer};
pub use fixture::{load_jsonl, FixtureOptions};
pub use grid::{align, Grid};
pub use histogram::{BucketMode, ComparisonOperator, ThresholdSpec};
pub use space::SpaceAggregator;
pub use stats::{EngineStats, EngineStatsSnapshot};
pub use storage::{InMemorySampleStore, SampleStore};
pub use temporality::{normalize, Normalized};
pub use types::{AlignedSeries, StepAccumulator, StepSeries};
