//! Signal value types.
//!
//! A `Signal` is the normalized form of one journal entry written by the
//! advisor. Field names on the wire vary (`type`/`kind`, `login`/`account_id`)
//! but the normalized form picks one name each.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The kind of trade action a signal requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Buy,
    Sell,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
    Close,
    Modify,
}

impl SignalKind {
    /// Parse from the wire's lowercase/underscore spelling.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            "buy_limit" | "buylimit" => Some(Self::BuyLimit),
            "sell_limit" | "selllimit" => Some(Self::SellLimit),
            "buy_stop" | "buystop" => Some(Self::BuyStop),
            "sell_stop" | "sellstop" => Some(Self::SellStop),
            "close" => Some(Self::Close),
            "modify" => Some(Self::Modify),
            _ => None,
        }
    }

    /// Whether a volume in lots is required for this kind.
    #[must_use]
    pub const fn requires_volume(self) -> bool {
        !matches!(self, Self::Close | Self::Modify)
    }

    /// Whether this kind requires an existing ticket.
    #[must_use]
    pub const fn requires_ticket(self) -> bool {
        matches!(self, Self::Close | Self::Modify)
    }

    /// Whether this is a market order (price resolved at execution time)
    /// rather than a pending order carrying its own price.
    #[must_use]
    pub const fn is_market(self) -> bool {
        matches!(self, Self::Buy | Self::Sell)
    }

    /// Whether a price must be present in the journal entry itself. Market
    /// orders resolve their price at execution time instead; close/modify
    /// act on an existing ticket.
    #[must_use]
    pub const fn requires_price(self) -> bool {
        matches!(
            self,
            Self::BuyLimit | Self::SellLimit | Self::BuyStop | Self::SellStop
        )
    }

    /// Broker-side buy/sell direction, where applicable.
    #[must_use]
    pub const fn is_buy(self) -> bool {
        matches!(self, Self::Buy | Self::BuyLimit | Self::BuyStop)
    }
}

/// Lifecycle state of a signal once it has entered the approval pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
}

impl SignalStatus {
    /// Terminal states no longer accept verdicts.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Executed | Self::Failed)
    }
}

/// Decision carried by an external verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Modify,
}

/// Field overrides carried by a `modify` verdict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifyOverrides {
    pub volume_lots: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// A normalized signal, as handed from the ingestion loop to the approval
/// state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub signal_id: String,
    pub kind: SignalKind,
    pub symbol: String,
    pub account_id: i64,
    pub volume_lots: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub ticket: Option<i64>,
    pub comment: String,
    pub magic: i32,
}

/// A signal tracked by the approval state machine, plus its lifecycle
/// bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSignal {
    pub signal: Signal,
    pub status: SignalStatus,
    pub executed_ticket: Option<i64>,
    pub failure_reason: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub terminal_at: Option<DateTime<Utc>>,
}

impl PendingSignal {
    /// Start tracking a freshly-enqueued signal.
    #[must_use]
    pub fn new(signal: Signal, now: DateTime<Utc>) -> Self {
        Self {
            signal,
            status: SignalStatus::Pending,
            executed_ticket: None,
            failure_reason: None,
            enqueued_at: now,
            terminal_at: None,
        }
    }
}

/// A journal entry failed validation and was never handed to the approval
/// state machine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    #[error("journal entry missing required field '{0}'")]
    MissingField(&'static str),
    #[error("journal entry has unrecognized kind '{0}'")]
    UnrecognizedKind(String),
}

/// Normalize one parsed JSON journal entry into a [`Signal`], applying the
/// wire's field-name aliases (`type`|`kind`, `login`|`account_id`).
///
/// # Errors
/// Returns [`SignalError`] if a field required for the entry's kind is
/// absent.
pub fn normalize_entry(value: &serde_json::Value) -> Result<Signal, SignalError> {
    let obj = value.as_object();

    let signal_id = obj
        .and_then(|o| o.get("signal_id"))
        .and_then(serde_json::Value::as_str)
        .ok_or(SignalError::MissingField("signal_id"))?
        .to_string();

    let kind_raw = obj
        .and_then(|o| o.get("type").or_else(|| o.get("kind")))
        .and_then(serde_json::Value::as_str)
        .ok_or(SignalError::MissingField("kind"))?;
    let kind = SignalKind::parse(kind_raw)
        .ok_or_else(|| SignalError::UnrecognizedKind(kind_raw.to_string()))?;

    let symbol = obj
        .and_then(|o| o.get("symbol"))
        .and_then(serde_json::Value::as_str)
        .ok_or(SignalError::MissingField("symbol"))?
        .to_string();

    let account_id = obj
        .and_then(|o| o.get("login").or_else(|| o.get("account_id")))
        .and_then(serde_json::Value::as_i64)
        .ok_or(SignalError::MissingField("account_id"))?;

    let volume_lots = obj
        .and_then(|o| o.get("volume"))
        .and_then(serde_json::Value::as_f64)
        .and_then(Decimal::from_f64_retain);
    if kind.requires_volume() && volume_lots.is_none() {
        return Err(SignalError::MissingField("volume"));
    }

    let ticket = obj
        .and_then(|o| o.get("ticket"))
        .and_then(serde_json::Value::as_i64);
    if kind.requires_ticket() && ticket.is_none() {
        return Err(SignalError::MissingField("ticket"));
    }

    let price = obj
        .and_then(|o| o.get("price"))
        .and_then(serde_json::Value::as_f64)
        .and_then(Decimal::from_f64_retain);
    if kind.requires_price() && price.is_none() {
        return Err(SignalError::MissingField("price"));
    }
    let stop_loss = obj
        .and_then(|o| o.get("sl"))
        .and_then(serde_json::Value::as_f64)
        .and_then(Decimal::from_f64_retain);
    let take_profit = obj
        .and_then(|o| o.get("tp"))
        .and_then(serde_json::Value::as_f64)
        .and_then(Decimal::from_f64_retain);
    let comment = obj
        .and_then(|o| o.get("comment"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let magic = obj
        .and_then(|o| o.get("magic"))
        .and_then(serde_json::Value::as_i64)
        .unwrap_or_default() as i32;

    Ok(Signal {
        signal_id,
        kind,
        symbol,
        account_id,
        volume_lots,
        price,
        stop_loss,
        take_profit,
        ticket,
        comment,
        magic,
    })
}

use rust_decimal::prelude::FromPrimitive;
