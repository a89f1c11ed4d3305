//! Broker manager interface (consumer contract).
//!
//! The broker's native manager library is out of scope for this core; what
//! lives here is the thin contract an adapter around that library must
//! satisfy, plus the raw decode-input shapes whose binary layout is fixed
//! by the broker and reproduced verbatim by a real adapter. No actual
//! foreign-function boundary exists in this port: the broker is represented
//! as a trait object, and `register_pump_callback` takes a boxed closure the
//! implementation invokes from whatever thread it owns (a real adapter would
//! invoke it from the native callback thread; [`mock::MockBrokerManager`]
//! invokes it from a dedicated `std::thread`).

use rust_decimal::Decimal;
use thiserror::Error;

/// Background event-generating mock implementation of [`BrokerManager`].
pub mod mock;

/// A symbol's static metadata, as returned by `symbols_all`/`symbol_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    /// Symbol name.
    pub symbol: String,
    /// Number of decimal digits used to express price for this symbol.
    pub digits: u32,
}

/// A broker-side trade/order record, as returned by `trades_all`/`trades_for`.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    /// Broker-assigned order/ticket number.
    pub order: i64,
    /// Owning account number.
    pub login: i64,
    /// Traded symbol.
    pub symbol: String,
    /// Numeric broker command code (side/order-type).
    pub cmd: i32,
    /// Volume in hundredths of a lot.
    pub volume_hundredths: i64,
    pub open_price: Decimal,
    pub close_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub profit: Decimal,
    /// Numeric broker state code.
    pub state_code: i32,
    /// Seconds since epoch.
    pub timestamp: i64,
}

/// Normalized trade transaction request sent to `trade_transaction`.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeTransInfo {
    /// Owning account number.
    pub login: i64,
    /// Target symbol.
    pub symbol: String,
    /// Numeric broker command code (side/order-type).
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

/// Raw, not-yet-decoded payload handed to the pumping callback.
///
/// Mirrors the fixed binary records the broker library would actually push;
/// in this port, these are plain Rust structs rather than pointers into a
/// foreign arena, but the decode rules in `pumping` treat them exactly as
/// the adapter treats a raw memory record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPumpData {
    /// A fixed symbol-info record (bid/ask-updated).
    SymbolInfo {
        symbol: String,
        digits: u32,
        bid: Decimal,
        ask: Decimal,
        timestamp: i64,
    },
    /// A fixed trade record (trades-updated).
    Trade(TradeRecord),
    /// Any other code's payload, carried opaquely for statistics only.
    Opaque,
}

/// The broker's closed set of push-event codes (0-16 in the source
/// library). Unrecognized codes still round-trip through [`PumpingCode::Unknown`]
/// rather than failing decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PumpingCode {
    /// Pumping mode has started; required to leave the `starting` state.
    PumpingStarted,
    /// Pumping mode has stopped.
    PumpingStopped,
    /// Liveness ping from the broker.
    Ping,
    /// Symbol universe changed.
    SymbolsUpdated,
    /// Group configuration changed.
    GroupsUpdated,
    /// User/account configuration changed.
    UsersUpdated,
    /// A symbol's bid/ask changed.
    BidAskUpdated,
    /// A trade/order changed.
    TradesUpdated,
    /// Mail event.
    Mail,
    /// News event.
    News,
    /// Pending request event.
    Requests,
    /// Plugin event.
    Plugins,
    /// Activation event.
    Activation,
    /// Margin call event.
    MarginCall,
    /// A code outside the recognized set (still forwarded verbatim).
    Unknown(u8),
}

impl PumpingCode {
    /// Decode the broker's numeric event code.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::PumpingStarted,
            1 => Self::PumpingStopped,
            2 => Self::Ping,
            3 => Self::SymbolsUpdated,
            4 => Self::GroupsUpdated,
            5 => Self::UsersUpdated,
            6 => Self::BidAskUpdated,
            7 => Self::TradesUpdated,
            8 => Self::Mail,
            9 => Self::News,
            10 => Self::Requests,
            11 => Self::Plugins,
            12 => Self::Activation,
            13 => Self::MarginCall,
            other => Self::Unknown(other),
        }
    }

    /// Whether the core has decode rules for this code (`bid/ask-updated`
    /// and `trades-updated`); all others are observed for statistics only.
    #[must_use]
    pub const fn is_core_handled(self) -> bool {
        matches!(self, Self::BidAskUpdated | Self::TradesUpdated)
    }
}

/// One push event as delivered to the registered callback: a code plus its
/// (possibly absent) raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPumpEvent {
    /// The event code.
    pub code: PumpingCode,
    /// The raw payload. `None` represents a null data pointer in the source
    /// library, which the adapter records as a decode error and drops.
    pub data: Option<RawPumpData>,
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
    /// A pump callback is already registered.
    #[error("pumping callback already registered")]
    AlreadyRunning,
}

/// The contract an adapter around the broker's native manager library must
/// satisfy. All native-side details (calling convention, memory ownership,
/// callback lifetime management) are confined to the implementation and
/// never leak into the dispatcher or gateway above this trait.
pub trait BrokerManager: Send + Sync {
    /// Open a network connection to the broker's manager endpoint.
    ///
    /// # Errors
    /// Returns [`BrokerError::ConnectFailed`] if the connection cannot be
    /// established.
    fn connect(&self, host: &str, port: u16) -> Result<(), BrokerError>;

    /// Authenticate as a manager account.
    ///
    /// # Errors
    /// Returns [`BrokerError::LoginRejected`] if the broker rejects the
    /// credentials.
    fn login(&self, login: i64, password: &str) -> Result<(), BrokerError>;

    /// Close the connection.
    fn disconnect(&self);

    /// Fetch the full symbol universe.
    fn symbols_all(&self) -> Vec<SymbolInfo>;

    /// Fetch metadata for a single symbol, if known.
    fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo>;

    /// Fetch all trade records across all accounts.
    fn trades_all(&self) -> Vec<TradeRecord>;

    /// Fetch trade records for a single account.
    fn trades_for(&self, account: i64) -> Vec<TradeRecord>;

    /// Execute a trade transaction synchronously.
    ///
    /// # Errors
    /// Returns the broker's raw negative error code on rejection; the Order
    /// Client is responsible for classifying it.
    fn trade_transaction(&self, account: i64, info: &TradeTransInfo) -> Result<i64, i32>;

    /// Install the push-mode callback. The implementation invokes `cb` for
    /// each event on whatever thread it owns; callers must not assume this
    /// is the calling thread.
    ///
    /// # Errors
    /// Returns [`BrokerError::AlreadyRunning`] if a callback is already
    /// installed, or [`BrokerError::NotConnected`] if not yet connected.
    fn register_pump_callback(
        &self,
        cb: Box<dyn Fn(RawPumpEvent) + Send + Sync>,
    ) -> Result<(), BrokerError>;

    /// Deregister the push-mode callback and block until the owning thread
    /// has observed the stop.
    fn unregister_pump_callback(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pumping_code_round_trips_known_values() {
        assert_eq!(PumpingCode::from_code(0), PumpingCode::PumpingStarted);
        assert_eq!(PumpingCode::from_code(6), PumpingCode::BidAskUpdated);
        assert_eq!(PumpingCode::from_code(7), PumpingCode::TradesUpdated);
        assert_eq!(PumpingCode::from_code(13), PumpingCode::MarginCall);
    }

    #[test]
    fn pumping_code_unknown_for_unmapped_values() {
        assert_eq!(PumpingCode::from_code(200), PumpingCode::Unknown(200));
    }

    #[test]
    fn only_bid_ask_and_trades_are_core_handled() {
        assert!(PumpingCode::BidAskUpdated.is_core_handled());
        assert!(PumpingCode::TradesUpdated.is_core_handled());
        assert!(!PumpingCode::Ping.is_core_handled());
        assert!(!PumpingCode::Unknown(99).is_core_handled());
    }
}
