//! HTTP API for range queries.
//!
//! - `POST /api/v1/query_range`: run a [`QueryRequest`]
//! - `GET /health`: version, stored series and engine counters
//!
//! Failures use one envelope: `{"status": "error", "error": {"code", "message"}}`.

use crate::core::config::ServerConfig;
use crate::core::{Result, StrataError};
use crate::metrics::EngineStatsSnapshot;
use crate::query::{QueryEngine, QueryRequest};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// API server state.
#[derive(Clone)]
struct ApiState {
    engine: Arc<QueryEngine>,
    started: Instant,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub series_count: usize,
    pub engine: EngineStatsSnapshot,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Wraps engine errors so handlers can use `?`.
struct ApiError(StrataError);

impl From<StrataError> for ApiError {
    fn from(err: StrataError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            StrataError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            StrataError::SeriesLimitExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            StrataError::InvalidQuery(_) | StrataError::Parse { .. } => "invalid_query",
            StrataError::Timeout { .. } => "timeout",
            _ => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, category = self.0.category(), "Query failed");
        }
        let body = ErrorResponse {
            status: "error".to_string(),
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router. Exposed separately from [`start_server`] for tests.
pub fn router(engine: Arc<QueryEngine>, config: &ServerConfig) -> Router {
    let state = ApiState {
        engine,
        started: Instant::now(),
    };

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/query_range", post(query_range_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(config.max_request_bytes)),
        );

    if config.enable_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Start the API server and run until Ctrl-C.
pub async fn start_server(engine: Arc<QueryEngine>, config: ServerConfig) -> Result<()> {
    let app = router(engine, &config);
    let addr = SocketAddr::new(config.bind_address, config.port);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        StrataError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to bind to {}: {}", addr, e),
        ))
    })?;
    tracing::info!("Starting API server on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// POST /api/v1/query_range
async fn query_range_handler(
    State(state): State<ApiState>,
    body: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        StrataError::invalid_query(format!("malformed request body: {}", rejection.body_text()))
    })?;
    let response = state.engine.query_range(&request).await?;
    Ok(Json(response).into_response())
}

/// GET /health
async fn health_handler(
    State(state): State<ApiState>,
) -> std::result::Result<Json<HealthResponse>, ApiError> {
    let series_count = state.engine.store().series_count().await?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        series_count,
        engine: state.engine.stats(),
    }))
}
