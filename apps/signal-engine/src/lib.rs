// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
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

//! Signal Engine - Rust Core Library
//!
//! Watches an advisor's journal file for trade signals, carries each one
//! through an approval state machine, and executes approved signals
//! against a broker's manager interface.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: signal value types and journal-entry normalization,
//!   independent of how signals arrive or how they are eventually executed.
//! - **Broker**: the consumer contract for the broker's native manager
//!   interface (`BrokerManager`), plus the deterministic mock used offline
//!   and the fixed-backoff retry policy.
//! - **Application**: orchestration — the Order Client, the approval state
//!   machine, the filesystem ingestion loop.
//! - **Infrastructure**: configuration loading, the health/metrics HTTP
//!   surface, and telemetry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - signal value types, no external dependencies.
pub mod domain;

/// Broker manager consumer contract, mock backend, retry policy.
pub mod broker;

/// Application layer - Order Client, approval state machine, ingestion loop.
pub mod application;

/// Infrastructure layer - configuration, health/metrics, telemetry.
pub mod infrastructure;

pub use application::{
    ApprovalError, ApprovalStateMachine, EventPublisherPort, IngestionConfig, IngestionError,
    IngestionLoop, NoOpEventPublisher, OrderClient, OrderClientError, OrderRequest, OrderTicket,
    SignalEvent,
};
pub use broker::{BrokerError, BrokerManager, BrokerRetryPolicy, ErrorCategory, SymbolInfo, TradeTransInfo};
pub use domain::{Decision, ModifyOverrides, PendingSignal, Signal, SignalError, SignalKind, SignalStatus};
