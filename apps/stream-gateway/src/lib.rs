#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Stream Gateway - Broker Push-Event Bridge
//!
//! Bridges a broker's native push-event callback interface into a
//! client-facing WebSocket streaming gateway: decodes quote and trade
//! events, maintains last-value caches, and relays updates to the clients
//! subscribed to them.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core event-fabric types and business logic
//!   - `model`: Quote, Trade, Signal, and approval-lifecycle value types
//!   - `subscription`: Client/symbol subscription tracking
//!
//! - **Broker**: Manager-interface consumer contract
//!   - `mock`: Synthetic background event generator for local/offline use
//!
//! - **Pumping**: Bridges the broker's foreign callback thread into the
//!   async event fabric and decodes raw events into domain values
//!
//! - **Dispatcher**: Owns the last-value caches and subscriber indexes;
//!   delivers decoded events to registered subscribers
//!
//! - **Gateway**: Client-facing WebSocket server (auth, subscriptions,
//!   per-connection relay)
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `config`: Configuration and dependency injection
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`: Prometheus metrics
//!   - `telemetry`: OpenTelemetry tracing integration
//!
//! # Data Flow
//!
//! ```text
//! Broker manager  ──►  Pumping Adapter  ──►  Event Dispatcher  ──►  Gateway ──► Client 1
//!  (push callback)     (decode, liveness)    (cache, fan-out)     (WS server) ──► Client 2
//!                                                                              ──► Client N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - core event-fabric types with no external dependencies.
pub mod domain;

/// Broker manager interface (consumer contract) and mock implementation.
pub mod broker;

/// Pumping Adapter - broker callback to async event fabric.
pub mod pumping;

/// Event Dispatcher - caches, subscriber indexes, and delivery.
pub mod dispatcher;

/// Streaming Gateway - client-facing WebSocket server.
pub mod gateway;

/// Generic ping/pong liveness watchdog.
pub mod liveness;

/// Infrastructure layer - adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::model::{
    PendingSignal, Quote, Signal, SignalKind, SignalStatus, Trade, TradeSide, TradeState,
};
pub use domain::subscription::{SubscriptionChange, SubscriptionManager};

// Broker contract
pub use broker::{
    BrokerError, BrokerManager, PumpingCode, RawPumpData, RawPumpEvent, SymbolInfo, TradeRecord,
    TradeTransInfo,
};

// Pumping Adapter
pub use pumping::{PumpingAdapter, PumpingConfig, PumpingError, PumpingState, PumpingStats};

// Event Dispatcher
pub use dispatcher::{DispatchEvent, DispatcherStats, EventDispatcher, SharedEventDispatcher};

// Streaming Gateway
pub use gateway::{router, GatewayConfig, GatewayState};

// Liveness watchdog
pub use liveness::{LivenessConfig, LivenessEvent, LivenessManager, LivenessState};

// Infrastructure config
pub use infrastructure::config::{
    BrokerSettings, ConfigError, DispatcherSettings, GatewayProcessConfig, GatewaySettings,
    PumpingSettings, ServerSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::{init_metrics, EventKind as MetricsEventKind, LivenessSide};

// Telemetry
pub use infrastructure::telemetry::{init as init_telemetry, TelemetryConfig, TelemetryGuard};
