//! strata - time-series aggregation query engine.
//!
//! strata answers range queries over gauge, counter and histogram samples.
//! Every matching series is normalized to increases where needed, aligned to
//! a fixed step grid and reduced over time; series are then merged across
//! space, and histogram buckets can be counted against a threshold or
//! searched for a quantile.
//!
//! # Architecture
//!
//! - `core`: Data model, configuration and errors
//! - `metrics`: Engine stages, sample store and fixtures
//! - `query`: Filter language, planning and execution
//! - `api`: HTTP query API
//! - `cli`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_lib::core::config::EngineConfig;
//! use strata_lib::metrics::InMemorySampleStore;
//! use strata_lib::query::{QueryEngine, QueryRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemorySampleStore::new(100_000));
//!     let engine = QueryEngine::new(store, EngineConfig::default())?;
//!     let request = QueryRequest::new("memory_usage", 0, 3_600_000, 60).filter("service = \"api\"");
//!     let response = engine.query_range(&request).await?;
//!     println!("{} series", response.data.series.len());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod api;
pub mod cli;
pub mod core;
pub mod metrics;
pub mod query;

// Re-export core types for convenience
pub use crate::core::{Config, Result, StrataError};
pub use crate::query::{QueryEngine, QueryRequest, QueryResponse};
