//! Wire protocol for the streaming gateway: JSON text frames exchanged with
//! clients over a WebSocket connection.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A frame sent from the gateway to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent immediately on connect, before authentication.
    Welcome {
        /// The id assigned to this connection.
        client_id: u64,
        /// Server wall-clock time.
        server_time: DateTime<Utc>,
        /// Whether the gateway requires authentication before other
        /// actions are accepted.
        require_auth: bool,
    },
    /// Reply to an `auth` frame.
    AuthResponse {
        /// Whether the token verified.
        success: bool,
        /// The authenticated account, if verification succeeded.
        #[serde(skip_serializing_if = "Option::is_none")]
        user_login: Option<i64>,
        /// A human-readable reason, typically present only on failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Reply to a `subscribe`/`unsubscribe` request.
    SubscriptionUpdate {
        /// Which action was performed.
        action: SubscriptionAction,
        /// Symbols actually added/removed by this request.
        symbols: Vec<String>,
        /// The client's full subscription set after the change.
        all_subscriptions: Vec<String>,
    },
    /// A quote update for a subscribed symbol.
    Quote {
        symbol: String,
        bid: Decimal,
        ask: Decimal,
        spread: Decimal,
        time: i64,
        server_time: DateTime<Utc>,
    },
    /// A trade update for the client's authenticated account.
    Trade {
        order: i64,
        login: i64,
        symbol: String,
        cmd: String,
        volume: Decimal,
        open_price: Decimal,
        close_price: Decimal,
        sl: Decimal,
        tp: Decimal,
        profit: Decimal,
        state: String,
    },
    /// An out-of-band notification, targeted or broadcast.
    Notification {
        /// Free-form notification payload.
        #[serde(flatten)]
        body: serde_json::Value,
    },
    /// A protocol-level error. The connection stays open.
    Error {
        /// Human-readable message.
        message: String,
    },
    /// Reply to a client `ping`.
    Pong,
}

/// Whether a subscription change added or removed symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionAction {
    /// Symbols were added.
    Subscribed,
    /// Symbols were removed.
    Unsubscribed,
}

/// A frame sent from a client to the gateway.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Authenticate with a bearer token.
    Auth {
        /// The bearer token string.
        token: String,
    },
    /// Add symbols to this client's subscription set.
    Subscribe {
        /// Symbols to subscribe to.
        symbols: Vec<String>,
    },
    /// Remove symbols from this client's subscription set.
    Unsubscribe {
        /// Symbols to unsubscribe from.
        symbols: Vec<String>,
    },
    /// Request the latest cached quotes, optionally scoped to a symbol set.
    GetQuotes {
        /// Symbols to fetch; all subscribed symbols if omitted.
        #[serde(default)]
        symbols: Option<Vec<String>>,
    },
    /// Liveness ping.
    Ping,
}
