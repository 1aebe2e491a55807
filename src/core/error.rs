use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrataError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Invalid series: {0}")]
    InvalidSeries(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Series limit exceeded: {current} series stored, limit {limit}")]
    SeriesLimitExceeded { current: usize, limit: usize },

    #[error("Timeout error: query took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Query cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for strata operations
pub type Result<T> = std::result::Result<T, StrataError>;

impl StrataError {
    /// Creates a new invalid query error
    pub fn invalid_query<S: Into<String>>(msg: S) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Creates a new invalid series error
    pub fn invalid_series<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSeries(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Returns true if the caller sent a query that can never succeed as written
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidQuery(_) | Self::Parse { .. })
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) | Self::InvalidSeries(_) => "validation",
            Self::Parse { .. } | Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::SeriesLimitExceeded { .. } => "resource",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Join(_) => "async",
        }
    }
}
