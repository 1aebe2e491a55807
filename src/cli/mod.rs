//! Command-line interface for strata.
//!
//! `strata` loads sample fixtures into memory and serves range queries over
//! HTTP. With `--query` it runs a single request from a JSON file instead and
//! prints the response.

use crate::core::config::{ConfigBuilder, LogLevel};
use crate::core::{Config, Result, StrataError};
use crate::metrics::{load_jsonl, FixtureOptions, InMemorySampleStore, SampleStore};
use crate::query::{QueryEngine, QueryRequest};
use clap::Parser;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Time-series aggregation query engine
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// HTTP port for the query API
    #[arg(short, long, env = "STRATA_PORT")]
    pub port: Option<u16>,

    /// Address to bind the query API to
    #[arg(long, env = "STRATA_BIND")]
    pub bind: Option<IpAddr>,

    /// Configuration file path (default: ~/.config/strata/config.yaml)
    #[arg(short, long, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSONL sample files to load at startup (repeatable)
    #[arg(long = "data", env = "STRATA_DATA", value_delimiter = ',')]
    pub data: Vec<PathBuf>,

    /// Worker threads for query evaluation (0 = available cores)
    #[arg(long, env = "STRATA_WORKER_THREADS")]
    pub worker_threads: Option<usize>,

    /// Default query deadline in seconds
    #[arg(long, env = "STRATA_QUERY_TIMEOUT_SECS")]
    pub query_timeout_secs: Option<u64>,

    /// Maximum number of series held in memory
    #[arg(long, env = "STRATA_MAX_SERIES")]
    pub max_series: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, env = "STRATA_DEBUG")]
    pub debug: bool,

    /// Structured logs with targets, thread ids and line numbers
    #[arg(long, env = "STRATA_HEADLESS")]
    pub headless: bool,

    /// Run the query in this JSON file, print the result and exit
    #[arg(long, value_name = "FILE")]
    pub query: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Show version information
    #[arg(short = 'V', long = "show-version")]
    pub version: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and environment variables
    /// 2. Config file
    /// 3. Defaults
    ///
    /// Returns the file the configuration was read from, if any.
    pub async fn load_config(&self) -> Result<(Config, Option<PathBuf>)> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let mut loaded_from = None;
        if let Some(path) = config_path {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    builder = builder.from_yaml(&content)?;
                    loaded_from = Some(path);
                },
                Err(e) if self.config.is_some() => {
                    // User explicitly specified a config file that can't be read
                    return Err(StrataError::config(format!(
                        "Failed to read config file {:?}: {}",
                        path, e
                    )));
                },
                Err(_) => {},
            }
        }

        Ok((self.apply_overrides(builder).build()?, loaded_from))
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(bind) = self.bind {
            builder = builder.bind_address(bind);
        }
        if let Some(threads) = self.worker_threads {
            builder = builder.worker_threads(threads);
        }
        if let Some(secs) = self.query_timeout_secs {
            builder = builder.query_timeout(Duration::from_secs(secs));
        }
        if let Some(max) = self.max_series {
            builder = builder.max_series(max);
        }
        for path in &self.data {
            builder = builder.preload(path.clone());
        }
        builder.debug(self.debug)
    }

    /// Initialize logging.
    ///
    /// `--debug` wins, then `RUST_LOG`, then `STRATA_LOG_LEVEL`, then the
    /// configured level.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let filter = if self.debug {
            EnvFilter::new(LogLevel::Debug.as_str())
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = std::env::var("STRATA_LOG_LEVEL")
                    .unwrap_or_else(|_| config.logging.level.as_str().to_string());
                EnvFilter::new(level)
            })
        };

        let structured = self.headless || config.logging.structured;
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(structured)
            .with_thread_ids(structured)
            .with_line_number(structured)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| StrataError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("strata").join("config.yaml"))
}

/// Build the in-memory store and load every configured fixture into it.
pub async fn load_store(config: &Config) -> Result<InMemorySampleStore> {
    let store = InMemorySampleStore::new(config.storage.max_series);
    let options = FixtureOptions::default();

    let batches = futures::future::try_join_all(
        config
            .storage
            .preload
            .iter()
            .map(|path| load_jsonl(path, &options)),
    )
    .await?;

    for batch in batches {
        store.insert_batch(batch)?;
    }
    tracing::info!(series = store.len(), "Sample store ready");
    Ok(store)
}

async fn run_query_file(engine: &QueryEngine, path: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(path).await?;
    let request: QueryRequest = serde_json::from_str(&text)?;
    let response = engine.query_range(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Execute the strata application.
pub async fn execute(cli: Cli) -> Result<()> {
    // Handle version flag first
    if cli.version {
        println!("strata {}", env!("CARGO_PKG_VERSION"));
        println!("Time-series aggregation query engine");
        return Ok(());
    }

    let (config, loaded_from) = cli.load_config().await?;
    cli.init_logging(&config)?;
    match &loaded_from {
        Some(path) => tracing::info!("Loaded configuration from: {:?}", path),
        None => tracing::debug!("No config file found, using defaults"),
    }

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Listen: {}:{}", config.server.bind_address, config.server.port);
        println!("  Worker threads: {}", config.engine.worker_threads);
        println!("  Query timeout: {:?}", config.engine.query_timeout);
        println!("  Max points: {}", config.engine.max_points);
        println!("  Max series: {}", config.storage.max_series);
        println!("  Preload files: {}", config.storage.preload.len());
        return Ok(());
    }

    let store: Arc<dyn SampleStore> = Arc::new(load_store(&config).await?);
    let engine = Arc::new(QueryEngine::new(store, config.engine.clone())?);

    if let Some(path) = &cli.query {
        return run_query_file(&engine, path).await;
    }

    crate::api::start_server(engine, config.server.clone()).await
}
