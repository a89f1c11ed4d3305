//! Stream Gateway Binary
//!
//! Starts the broker push-event bridge and its client-facing streaming
//! gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin stream-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `GATEWAY_BEARER_SECRET`: shared secret used to verify client bearer tokens
//!
//! ## Optional
//! - `GATEWAY_MOCK_MODE`: use the synthetic broker instead of a real manager connection (default: true)
//! - `BROKER_HOST` / `BROKER_PORT` / `BROKER_LOGIN` / `BROKER_PASSWORD`: manager connection, required when mock mode is off
//! - `GATEWAY_PORT`: WebSocket server port (default: 8090)
//! - `GATEWAY_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `GATEWAY_METRICS_PORT`: Prometheus metrics port (default: 9090)
//! - `GATEWAY_REQUIRE_AUTH`: require `auth` before subscribe/get_quotes (default: true)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: cream-stream-gateway)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stream_gateway::broker::mock::MockBrokerManager;
use stream_gateway::gateway::auth::HmacBearerVerifier;
use stream_gateway::infrastructure::config::GatewayProcessConfig;
use stream_gateway::infrastructure::health::{HealthServer, HealthServerState};
use stream_gateway::infrastructure::telemetry;
use stream_gateway::liveness::LivenessConfig;
use stream_gateway::{init_metrics, router, BrokerManager, EventDispatcher, GatewayConfig, GatewayState, PumpingAdapter, PumpingConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Stream Gateway");

    let _metrics_handle = init_metrics();

    let config = GatewayProcessConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let broker: Arc<dyn BrokerManager> = if config.broker.mock_mode {
        Arc::new(MockBrokerManager::new())
    } else {
        // No real manager-interface adapter is wired up in this build; the
        // synthetic broker stands in until one is.
        tracing::warn!("GATEWAY_MOCK_MODE is false but no real broker adapter is built; falling back to the mock broker");
        Arc::new(MockBrokerManager::new())
    };

    let dispatcher = Arc::new(EventDispatcher::new(
        config.dispatcher.subscriber_mailbox_capacity,
        config.dispatcher.trade_cache_capacity,
    ));

    let pumping_config = PumpingConfig {
        handoff_capacity: config.pumping.handoff_capacity,
        startup_window: config.pumping.startup_window,
        liveness: LivenessConfig::new(config.pumping.ping_interval, config.pumping.pong_deadline),
    };
    let pumping = Arc::new(PumpingAdapter::new(
        Arc::clone(&broker),
        Arc::clone(&dispatcher),
        pumping_config,
    ));
    pumping.start().await?;

    let verifier = Arc::new(HmacBearerVerifier::new(
        config.gateway.bearer_secret.clone().into_bytes(),
    ));
    let gateway_config = GatewayConfig {
        client_mailbox_capacity: config.gateway.client_mailbox_capacity,
        require_auth: config.gateway.require_auth,
        liveness: LivenessConfig::new(config.gateway.ping_interval, config.gateway.pong_deadline),
        max_quote_updates_per_second: config.dispatcher.max_quote_updates_per_second,
    };
    let gateway_state = GatewayState::new(Arc::clone(&dispatcher), verifier, gateway_config);

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&pumping),
        Arc::clone(&gateway_state),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        Arc::clone(&health_state),
        shutdown_token.clone(),
    );

    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let app = router(Arc::clone(&gateway_state));
    let bind_addr = config.gateway.bind_addr;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Streaming gateway listening");

    let gateway_shutdown = shutdown_token.clone();
    let gateway_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(gateway_shutdown.cancelled_owned())
        .await
        {
            tracing::error!(error = %e, "Streaming gateway server error");
        }
    });

    tracing::info!("Stream gateway ready");

    await_shutdown(shutdown_token).await;

    pumping.stop().await;
    let _ = gateway_task.await;

    tracing::info!("Stream gateway stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayProcessConfig) {
    tracing::info!(
        broker = %config.broker,
        gateway_port = config.gateway.bind_addr.port(),
        health_port = config.server.health_port,
        metrics_port = config.server.metrics_port,
        require_auth = config.gateway.require_auth,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
