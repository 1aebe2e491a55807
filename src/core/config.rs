//! Configuration management for strata.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (see `cli`)
//! - Validation and defaults

use crate::core::{Result, StrataError};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration for strata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Query engine configuration
    pub engine: EngineConfig,
    /// Sample store configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the query API
    pub bind_address: IpAddr,
    /// HTTP port for the query API
    pub port: u16,
    /// Enable permissive CORS headers
    pub enable_cors: bool,
    /// Maximum accepted request body size
    pub max_request_bytes: usize,
}

/// Query engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads for per-series evaluation (0 = available cores)
    pub worker_threads: usize,
    /// Deadline applied to queries that do not carry their own
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
    /// How far before the first grid step to look for counter anchors.
    /// Never less than one step.
    #[serde(with = "humantime_serde")]
    pub lookback: Duration,
    /// Maximum number of grid steps a single query may produce
    pub max_points: usize,
}

/// Sample store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSONL sample files loaded at startup
    pub preload: Vec<PathBuf>,
    /// Maximum number of distinct series held in memory
    pub max_series: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format (targets, thread ids, line numbers)
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            enable_cors: true,
            max_request_bytes: 1024 * 1024,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            worker_threads: 0,
            query_timeout: Duration::from_secs(30),
            lookback: Duration::from_secs(300),
            max_points: 11_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            preload: Vec::new(),
            max_series: 1_000_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(StrataError::config("port must be greater than 0"));
        }

        if self.server.max_request_bytes == 0 {
            return Err(StrataError::config("max_request_bytes must be greater than 0"));
        }

        if self.engine.query_timeout.is_zero() {
            return Err(StrataError::config("query_timeout must be greater than 0"));
        }

        if self.engine.max_points == 0 {
            return Err(StrataError::config("max_points must be greater than 0"));
        }

        if self.storage.max_series == 0 {
            return Err(StrataError::config("max_series must be greater than 0"));
        }

        for path in &self.storage.preload {
            if path.as_os_str().is_empty() {
                return Err(StrataError::config("preload paths must not be empty"));
            }
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| StrataError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set HTTP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set bind address
    pub fn bind_address(mut self, address: IpAddr) -> Self {
        self.config.server.bind_address = address;
        self
    }

    /// Set worker thread count
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.engine.worker_threads = threads;
        self
    }

    /// Set default query deadline
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.query_timeout = timeout;
        self
    }

    /// Set counter anchor lookback
    pub fn lookback(mut self, lookback: Duration) -> Self {
        self.config.engine.lookback = lookback;
        self
    }

    /// Set maximum grid steps per query
    pub fn max_points(mut self, max_points: usize) -> Self {
        self.config.engine.max_points = max_points;
        self
    }

    /// Add a JSONL file to load at startup
    pub fn preload(mut self, path: PathBuf) -> Self {
        self.config.storage.preload.push(path);
        self
    }

    /// Set maximum stored series
    pub fn max_series(mut self, count: usize) -> Self {
        self.config.storage.max_series = count;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
