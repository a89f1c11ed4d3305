//! Core value types shared by the pumping adapter, dispatcher, and gateway.
//!
//! These types have no external dependencies beyond `serde`/`chrono`/
//! `rust_decimal` and carry no behavior beyond construction helpers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A symbol string (e.g. `EURUSD`). Bounded to a short ticker by convention,
/// not enforced at the type level.
pub type Symbol = String;

/// Best bid/ask for a symbol at a point in time.
///
/// Quotes are immutable once constructed; `spread` is derived at
/// construction and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// The quoted symbol.
    pub symbol: Symbol,
    /// Best bid price.
    pub bid: Decimal,
    /// Best ask price.
    pub ask: Decimal,
    /// Derived spread: `round((ask - bid) * 10^digits, 1)`.
    pub spread: Decimal,
    /// Broker-assigned timestamp, seconds since epoch.
    pub broker_timestamp: i64,
    /// Wall-clock time this process observed the event.
    pub receive_time: DateTime<Utc>,
}

impl Quote {
    /// Construct a quote, deriving `spread` from `bid`/`ask` and the
    /// symbol's decimal-digit metadata.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        bid: Decimal,
        ask: Decimal,
        digits: u32,
        broker_timestamp: i64,
        receive_time: DateTime<Utc>,
    ) -> Self {
        let scale = Decimal::from(10u64.pow(digits));
        let spread = ((ask - bid) * scale).round_dp(1);
        Self {
            symbol,
            bid,
            ask,
            spread,
            broker_timestamp,
            receive_time,
        }
    }
}

/// Side / order type of a trade record or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    /// Market buy.
    Buy,
    /// Market sell.
    Sell,
    /// Pending buy-limit order.
    BuyLimit,
    /// Pending sell-limit order.
    SellLimit,
    /// Pending buy-stop order.
    BuyStop,
    /// Pending sell-stop order.
    SellStop,
    /// Account balance adjustment.
    Balance,
    /// Account credit adjustment.
    Credit,
}

impl TradeSide {
    /// Whether this side resolves its price from the current market quote
    /// (as opposed to carrying an explicit pending-order price).
    #[must_use]
    pub const fn is_market(self) -> bool {
        matches!(self, Self::Buy | Self::Sell)
    }
}

/// Lifecycle state of a broker trade record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    /// Position is open.
    Open,
    /// Position is fully closed.
    Closed,
    /// Position was partially closed.
    PartiallyClosed,
    /// Pending order was deleted before execution.
    Deleted,
    /// Broker reported a state code outside the known mapping.
    Unknown,
}

impl TradeState {
    /// Map the broker's numeric trade-state code to a typed state.
    ///
    /// This is a total mapping: any code not recognized yields `Unknown`
    /// rather than failing decode.
    #[must_use]
    pub const fn from_broker_code(code: i32) -> Self {
        match code {
            0 => Self::Open,
            1 => Self::Closed,
            2 => Self::PartiallyClosed,
            3 => Self::Deleted,
            _ => Self::Unknown,
        }
    }
}

/// A broker trade record (open position, pending order, or closed ticket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Broker-assigned order/ticket number.
    pub order_id: i64,
    /// Account number the trade belongs to.
    pub account_id: i64,
    /// Traded symbol.
    pub symbol: Symbol,
    /// Order side / type.
    pub side: TradeSide,
    /// Volume in lots (converted from hundredths-of-a-lot at the boundary).
    pub volume_lots: Decimal,
    /// Opening price.
    pub open_price: Decimal,
    /// Closing price, if closed.
    pub close_price: Decimal,
    /// Stop-loss price, zero if unset.
    pub stop_loss: Decimal,
    /// Take-profit price, zero if unset.
    pub take_profit: Decimal,
    /// Realized/unrealized profit.
    pub profit: Decimal,
    /// Lifecycle state.
    pub state: TradeState,
    /// Broker-assigned timestamp of this update, seconds since epoch.
    pub broker_timestamp: i64,
}

/// A trade instruction produced by the advisor, read from the signal
/// journal and surfaced to the approval state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Globally unique id assigned by the advisor.
    pub signal_id: String,
    /// Requested action.
    pub kind: SignalKind,
    /// Target symbol.
    pub symbol: Symbol,
    /// Target account.
    pub account_id: i64,
    /// Requested volume in lots. Absent for `close`/`modify`.
    pub volume_lots: Option<Decimal>,
    /// Requested price. Required for pending orders, resolved at execution
    /// time for market orders.
    pub price: Option<Decimal>,
    /// Requested stop-loss.
    pub stop_loss: Option<Decimal>,
    /// Requested take-profit.
    pub take_profit: Option<Decimal>,
    /// Ticket being closed or modified. Required for `close`/`modify`.
    pub ticket: Option<i64>,
    /// Free-text comment attached to the order.
    pub comment: Option<String>,
    /// When this process first observed the signal.
    pub received_at: DateTime<Utc>,
}

/// The action a [`Signal`] requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Market buy.
    Buy,
    /// Market sell.
    Sell,
    /// Pending buy-limit order.
    BuyLimit,
    /// Pending sell-limit order.
    SellLimit,
    /// Pending buy-stop order.
    BuyStop,
    /// Pending sell-stop order.
    SellStop,
    /// Close an existing ticket.
    Close,
    /// Modify an existing ticket's volume/stops.
    Modify,
}

impl SignalKind {
    /// Whether this kind requires a `ticket` rather than a fresh volume.
    #[must_use]
    pub const fn requires_ticket(self) -> bool {
        matches!(self, Self::Close | Self::Modify)
    }

    /// Whether this kind resolves its price from the current market quote.
    #[must_use]
    pub const fn is_market(self) -> bool {
        matches!(self, Self::Buy | Self::Sell)
    }

    /// The corresponding [`TradeSide`] for order placement, where applicable.
    #[must_use]
    pub const fn as_trade_side(self) -> Option<TradeSide> {
        match self {
            Self::Buy => Some(TradeSide::Buy),
            Self::Sell => Some(TradeSide::Sell),
            Self::BuyLimit => Some(TradeSide::BuyLimit),
            Self::SellLimit => Some(TradeSide::SellLimit),
            Self::BuyStop => Some(TradeSide::BuyStop),
            Self::SellStop => Some(TradeSide::SellStop),
            Self::Close | Self::Modify => None,
        }
    }
}

/// Lifecycle status of a [`PendingSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// Awaiting a verdict.
    Pending,
    /// Verdict was `approve`; awaiting Order Client result.
    Approved,
    /// Verdict was `reject`. Terminal.
    Rejected,
    /// Order Client returned a ticket. Terminal.
    Executed,
    /// Order Client returned a non-retryable failure, or retries exhausted.
    /// Terminal.
    Failed,
}

impl SignalStatus {
    /// Whether this status is terminal (no further transitions expected).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Executed | Self::Failed)
    }
}

/// A [`Signal`] plus its approval lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSignal {
    /// The underlying signal, possibly patched by a `modify` verdict.
    pub signal: Signal,
    /// Current lifecycle status.
    pub status: SignalStatus,
    /// Ticket assigned once executed.
    pub executed_ticket: Option<i64>,
    /// Identity that rendered the terminal-ward verdict, if known.
    pub verdict_by: Option<String>,
    /// When the terminal-ward verdict was recorded.
    pub verdict_at: Option<DateTime<Utc>>,
}

impl PendingSignal {
    /// Wrap a freshly ingested signal as `pending`.
    #[must_use]
    pub const fn new(signal: Signal) -> Self {
        Self {
            signal,
            status: SignalStatus::Pending,
            executed_ticket: None,
            verdict_by: None,
            verdict_at: None,
        }
    }
}
