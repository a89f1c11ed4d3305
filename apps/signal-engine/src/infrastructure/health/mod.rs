//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks and Prometheus metrics, used by
//! container orchestrators and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::{ApprovalStateMachine, IngestionLoop};
use crate::infrastructure::metrics::get_metrics_handle;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    pub current_time: DateTime<Utc>,
    pub pending_signals: usize,
    pub malformed_journal_reads: u64,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    approval: Arc<ApprovalStateMachine>,
    ingestion: Arc<IngestionLoop>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        approval: Arc<ApprovalStateMachine>,
        ingestion: Arc<IngestionLoop>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            approval,
            ingestion,
        }
    }
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    /// Returns [`HealthServerError`] if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("health server stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let pending = state.approval.pending_count();
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        pending_signals: pending,
        malformed_journal_reads: state.ingestion.malformed_reads(),
    };
    (StatusCode::OK, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler() -> impl IntoResponse {
    (StatusCode::OK, "READY")
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),
    #[error("server error: {0}")]
    ServerFailed(String),
}
