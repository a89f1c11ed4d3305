//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, connection status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks the pumping adapter)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::gateway::GatewayState;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::pumping::{PumpingAdapter, PumpingState};

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Pumping Adapter status.
    pub pumping: PumpingInfo,
    /// Connected client count.
    pub clients: ClientStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational.
    Healthy,
    /// Some systems degraded but functional.
    Degraded,
    /// Critical systems unavailable.
    Unhealthy,
}

/// Pumping Adapter status.
#[derive(Debug, Clone, Serialize)]
pub struct PumpingInfo {
    /// Lifecycle state as a string (`idle`, `starting`, `running`, `stopping`).
    pub state: String,
    /// Whether the adapter is currently running.
    pub running: bool,
    /// Events decoded and dispatched so far.
    pub events_decoded: u64,
    /// Events dropped at the handoff boundary (channel full).
    pub events_dropped: u64,
    /// Events that failed to decode.
    pub decode_errors: u64,
    /// When the most recent event was accepted, if any.
    pub last_event_at: Option<DateTime<Utc>>,
    /// Seconds since the adapter was last started, if it has been started.
    pub uptime_secs: Option<u64>,
}

/// Connected client information.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    /// Total connected gateway clients.
    pub total: u64,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    pumping: Arc<PumpingAdapter>,
    gateway: Arc<GatewayState>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, pumping: Arc<PumpingAdapter>, gateway: Arc<GatewayState>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            pumping,
            gateway,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

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
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
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

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.pumping.state() == PumpingState::Running {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
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

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let pumping_state = state.pumping.state();
    let stats = state.pumping.stats();

    let pumping = PumpingInfo {
        state: pumping_state_to_string(pumping_state),
        running: pumping_state == PumpingState::Running,
        events_decoded: stats.events_decoded.load(Ordering::Relaxed),
        events_dropped: stats.events_dropped.load(Ordering::Relaxed),
        decode_errors: stats.decode_errors.load(Ordering::Relaxed),
        last_event_at: stats.last_event_at(),
        uptime_secs: stats.uptime().map(|d| d.as_secs()),
    };

    let status = determine_health_status(pumping_state, &pumping);

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        pumping,
        clients: ClientStatus {
            total: state.gateway.connected_clients(),
        },
    }
}

fn pumping_state_to_string(state: PumpingState) -> String {
    match state {
        PumpingState::Idle => "idle".to_string(),
        PumpingState::Starting => "starting".to_string(),
        PumpingState::Running => "running".to_string(),
        PumpingState::Stopping => "stopping".to_string(),
    }
}

fn determine_health_status(state: PumpingState, info: &PumpingInfo) -> HealthStatus {
    match state {
        PumpingState::Running if info.decode_errors == 0 => HealthStatus::Healthy,
        PumpingState::Running | PumpingState::Starting => HealthStatus::Degraded,
        PumpingState::Idle | PumpingState::Stopping => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
