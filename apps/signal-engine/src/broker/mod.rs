//! Broker manager interface (consumer contract).
//!
//! The broker's native manager library is out of scope for this core; what
//! lives here is the thin contract an adapter around that library must
//! satisfy for order execution. This binary holds its own `BrokerManager`
//! handle independent of the streaming gateway's: the two reach the same
//! broker account independently rather than sharing an in-process object.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Retry policy and error classification for the Order Client.
pub mod retry;

/// Deterministic synthetic backend, the only one available offline.
pub mod mock;

pub use retry::{BrokerRetryPolicy, ErrorCategory};

/// A symbol's metadata and latest quote, as returned by `symbol_info`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolInfo {
    /// Number of decimal digits used to express price for this symbol.
    pub digits: u32,
    /// Latest bid.
    pub bid: Decimal,
    /// Latest ask.
    pub ask: Decimal,
}

/// Normalized trade transaction request sent to `trade_transaction`.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTransInfo {
    /// Owning account number.
    pub login: i64,
    /// Target symbol.
    pub symbol: String,
    /// Numeric broker command code (side/order-type), broker-defined.
    pub cmd: i32,
    /// Volume in hundredths of a lot.
    pub volume_hundredths: i64,
    pub price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Ticket being closed or modified; zero for a fresh order.
    pub ticket: i64,
    pub comment: String,
    pub magic: i32,
}

/// Errors surfaced by a [`BrokerManager`] implementation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BrokerError {
    /// Network-level connect failure.
    #[error("failed to connect to broker at {host}:{port}")]
    ConnectFailed {
        /// Host that was dialed.
        host: String,
        /// Port that was dialed.
        port: u16,
    },
    /// Login/authentication rejected by the broker.
    #[error("login rejected for account {login}")]
    LoginRejected {
        /// Account number that failed to log in.
        login: i64,
    },
    /// Not connected when an operation requiring a connection was invoked.
    #[error("not connected to broker")]
    NotConnected,
    /// The broker has no record of this symbol.
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    /// `trade_transaction` was rejected with a raw broker error code.
    #[error("trade transaction rejected with code {0}")]
    TransactionRejected(i32),
}

/// The contract an adapter around the broker's native manager library must
/// satisfy for order execution. All native-side details (calling
/// convention, memory ownership) are confined to the implementation and
/// never leak into the Order Client.
#[async_trait]
pub trait BrokerManager: Send + Sync {
    /// Open a network connection to the broker's manager endpoint.
    ///
    /// # Errors
    /// Returns [`BrokerError::ConnectFailed`] if the connection cannot be
    /// established.
    async fn connect(&self, host: &str, port: u16) -> Result<(), BrokerError>;

    /// Authenticate as a manager account.
    ///
    /// # Errors
    /// Returns [`BrokerError::LoginRejected`] if the broker rejects the
    /// credentials.
    async fn login(&self, login: i64, password: &str) -> Result<(), BrokerError>;

    /// Close the connection.
    async fn disconnect(&self);

    /// Fetch metadata and the latest quote for a single symbol.
    ///
    /// # Errors
    /// Returns [`BrokerError::UnknownSymbol`] if the broker has no such
    /// symbol.
    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, BrokerError>;

    /// Execute a trade transaction synchronously.
    ///
    /// # Errors
    /// Returns the broker's raw negative error code on rejection; the Order
    /// Client classifies it into an `OrderClientError`.
    async fn trade_transaction(&self, account: i64, info: &TradeTransInfo) -> Result<i64, i32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_info_carries_bid_ask() {
        let info = SymbolInfo {
            digits: 5,
            bid: Decimal::new(11000, 4),
            ask: Decimal::new(11002, 4),
        };
        assert!(info.ask > info.bid);
    }
}
