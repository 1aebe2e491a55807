//! Core domain models for strata.
//!
//! This module contains the data model shared by the sample store,
//! the query engine and the HTTP surface.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder};
pub use error::{Result, StrataError};
pub use types::{
    parse_le, parse_le_label, LabelSet, MetricSample, MetricType, Sample, Series, SeriesKey,
    Temporality, TimestampMs, LE_LABEL,
};
