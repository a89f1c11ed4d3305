//! Signal Engine Binary
//!
//! Watches an advisor's journal file for trade signals, carries each one
//! through an approval state machine, and executes approved signals
//! against a broker's manager interface.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin signal-engine
//! ```
//!
//! # Environment Variables
//!
//! - `SIGNAL_ENGINE_CONFIG`: path to the YAML config file (default: config.yaml)
//! - `BROKER_HOST` / `BROKER_PORT` / `BROKER_LOGIN` / `BROKER_PASSWORD`: manager connection, required when mock mode is off
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: cream-signal-engine)
//! - `RUST_LOG`: Log level (default: info)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use signal_engine::application::{ApprovalStateMachine, IngestionConfig, IngestionLoop, OrderClient};
use signal_engine::broker::mock::MockBrokerManager;
use signal_engine::broker::{BrokerManager, BrokerRetryPolicy};
use signal_engine::infrastructure::config::{self, Config};
use signal_engine::infrastructure::health::{HealthServer, HealthServerState};
use signal_engine::infrastructure::{metrics, telemetry};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("starting signal engine");

    let _metrics_handle = metrics::init_metrics();

    let config_path = std::env::var("SIGNAL_ENGINE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = match config::load_config(Some(&config_path)) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, path = %config_path, "failed to load config file, using defaults");
            Config::default()
        }
    };
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let broker: Arc<dyn BrokerManager> = if config.broker.mock_mode {
        Arc::new(MockBrokerManager::new())
    } else {
        tracing::warn!(
            "broker.mock_mode is false but no real manager-interface adapter is built; falling back to the mock broker"
        );
        Arc::new(MockBrokerManager::new())
    };
    broker.connect(&config.broker.host, config.broker.port).await?;
    if !config.broker.mock_mode {
        broker.login(config.broker.login, &config.broker.password).await?;
    }

    let retry_policy = BrokerRetryPolicy::new(config.retry.max_attempts, config.retry.backoff());
    let order_client = Arc::new(OrderClient::new(Arc::clone(&broker), retry_policy));
    let approval = Arc::new(ApprovalStateMachine::new(Arc::clone(&broker), order_client));

    let ingestion_config = IngestionConfig {
        journal_path: PathBuf::from(&config.ingestion.journal_path),
        debounce: Duration::from_secs(config.ingestion.debounce_secs),
        poll_interval: Duration::from_secs(config.ingestion.poll_interval_secs),
    };
    let ingestion = Arc::new(IngestionLoop::new(
        ingestion_config,
        Arc::clone(&approval),
        shutdown_token.clone(),
    ));

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&approval),
        Arc::clone(&ingestion),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        Arc::clone(&health_state),
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "health server error");
        }
    });

    let ingestion_task = tokio::spawn(async move {
        if let Err(e) = ingestion.run().await {
            tracing::error!(error = %e, "signal ingestion loop error");
        }
    });

    tracing::info!("signal engine ready");

    await_shutdown(shutdown_token).await;

    broker.disconnect().await;
    let _ = ingestion_task.await;

    tracing::info!("signal engine stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &Config) {
    tracing::info!(
        broker_host = %config.broker.host,
        broker_mock_mode = config.broker.mock_mode,
        journal_path = %config.ingestion.journal_path,
        health_port = config.server.health_port,
        metrics_port = config.server.metrics_port,
        "configuration loaded"
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
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "graceful shutdown started"
    );
}
