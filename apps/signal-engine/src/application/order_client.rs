//! Order Client.
//!
//! Performs the concrete broker transactions behind an approved signal,
//! retrying transient failures with the fixed-backoff policy in
//! `broker::retry`.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::broker::{BrokerManager, BrokerRetryPolicy, ErrorCategory, TradeTransInfo};
use crate::domain::signal::{Signal, SignalKind};

/// A ticket returned by a successful broker transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTicket(pub i64);

/// Error surface for Order Client operations. Unknown negative codes not
/// in this table round-trip through `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OrderClientError {
    #[error("generic broker error")]
    Generic,
    #[error("invalid order parameters")]
    InvalidParameters,
    #[error("broker server error")]
    ServerError,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("trade not allowed")]
    TradeNotAllowed,
    #[error("market closed")]
    MarketClosed,
    #[error("invalid price")]
    InvalidPrice,
    #[error("invalid stops")]
    InvalidStops,
    #[error("trading disabled for this account")]
    TradeDisabled,
    #[error("position is locked")]
    PositionLocked,
    #[error("unknown error code {0}")]
    Unknown(i32),
}

impl OrderClientError {
    /// Map the broker's raw negative error code onto this error surface.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::Generic,
            -2 => Self::ServerError,
            -3 => Self::InvalidParameters,
            -4 => Self::InsufficientFunds,
            -5 => Self::TradeNotAllowed,
            -6 => Self::MarketClosed,
            -7 => Self::InvalidPrice,
            -8 => Self::InvalidStops,
            -9 => Self::TradeDisabled,
            -10 => Self::PositionLocked,
            other => Self::Unknown(other),
        }
    }

    /// Whether this error class is worth retrying. Only a generic failure
    /// or a server-side error is transient; every named rejection reason
    /// surfaces immediately.
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::Generic | Self::ServerError => ErrorCategory::Retryable,
            _ => ErrorCategory::NonRetryable,
        }
    }
}

/// A normalized request to place, modify, or close a position.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub account_id: i64,
    pub symbol: String,
    pub kind: SignalKind,
    pub volume_lots: Option<Decimal>,
    pub price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub ticket: i64,
    pub comment: String,
    pub magic: i32,
}

impl OrderRequest {
    /// Build a request from a signal and a resolved execution price.
    #[must_use]
    pub fn from_signal(signal: &Signal, resolved_price: Decimal) -> Self {
        Self {
            account_id: signal.account_id,
            symbol: signal.symbol.clone(),
            kind: signal.kind,
            volume_lots: signal.volume_lots,
            price: resolved_price,
            stop_loss: signal.stop_loss.unwrap_or(Decimal::ZERO),
            take_profit: signal.take_profit.unwrap_or(Decimal::ZERO),
            ticket: signal.ticket.unwrap_or(0),
            comment: signal.comment.clone(),
            magic: signal.magic,
        }
    }

    fn cmd_code(&self) -> i32 {
        match self.kind {
            SignalKind::Buy => 0,
            SignalKind::Sell => 1,
            SignalKind::BuyLimit => 2,
            SignalKind::SellLimit => 3,
            SignalKind::BuyStop => 4,
            SignalKind::SellStop => 5,
            SignalKind::Close | SignalKind::Modify => 6,
        }
    }

    fn volume_hundredths(&self) -> i64 {
        let lots = self.volume_lots.unwrap_or(Decimal::ZERO);
        (lots * Decimal::from(100)).round().try_into().unwrap_or(0)
    }

    fn to_trans_info(&self) -> TradeTransInfo {
        TradeTransInfo {
            login: self.account_id,
            symbol: self.symbol.clone(),
            cmd: self.cmd_code(),
            volume_hundredths: self.volume_hundredths(),
            price: self.price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            ticket: self.ticket,
            comment: self.comment.clone(),
            magic: self.magic,
        }
    }
}

/// Wraps a [`BrokerManager`] with the fixed-backoff retry policy described
/// in the Order Client's realization notes.
pub struct OrderClient {
    broker: Arc<dyn BrokerManager>,
    policy: BrokerRetryPolicy,
}

impl OrderClient {
    /// Build an Order Client over a broker handle with a retry policy.
    #[must_use]
    pub const fn new(broker: Arc<dyn BrokerManager>, policy: BrokerRetryPolicy) -> Self {
        Self { broker, policy }
    }

    /// Place a fresh order.
    ///
    /// # Errors
    /// Returns the classified [`OrderClientError`] once retries (if any)
    /// are exhausted or the failure class is non-retryable.
    pub async fn place_order(&self, request: &OrderRequest) -> Result<OrderTicket, OrderClientError> {
        self.submit(request).await
    }

    /// Modify an existing position's stops/price.
    ///
    /// # Errors
    /// See [`Self::place_order`].
    pub async fn modify_order(
        &self,
        request: &OrderRequest,
    ) -> Result<OrderTicket, OrderClientError> {
        self.submit(request).await
    }

    /// Close an existing position.
    ///
    /// # Errors
    /// See [`Self::place_order`].
    pub async fn close_order(&self, request: &OrderRequest) -> Result<OrderTicket, OrderClientError> {
        self.submit(request).await
    }

    async fn submit(&self, request: &OrderRequest) -> Result<OrderTicket, OrderClientError> {
        let info = request.to_trans_info();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.broker.trade_transaction(request.account_id, &info).await {
                Ok(ticket) => return Ok(OrderTicket(ticket)),
                Err(code) => {
                    let err = OrderClientError::from_code(code);
                    let retryable = matches!(err.category(), ErrorCategory::Retryable);
                    if !retryable || attempt >= self.policy.max_attempts {
                        return Err(err);
                    }
                    tracing::warn!(attempt, code, "transient order-client error, retrying");
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }
    }
}
