//! Streaming Gateway.
//!
//! The client-facing half of the bridge: a WebSocket server that
//! authenticates connections, tracks per-client symbol subscriptions, and
//! relays [`crate::dispatcher::EventDispatcher`] events to the clients that
//! asked for them.

/// Bearer token verification.
pub mod auth;
/// Wire protocol (client/server JSON frames).
pub mod protocol;
/// Connection handling and the axum router.
pub mod server;

pub use server::{router, GatewayConfig, GatewayState};
