//! Approval State Machine.
//!
//! Holds every signal the ingestion loop has handed over, pending an
//! external verdict, and carries approved signals through to the Order
//! Client. The transition table below is a static, exhaustive match over
//! `(from, to, decision)` triples rather than a per-state method, so every
//! reachable transition is visible in one place.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::application::event_publisher::{EventPublisherPort, NoOpEventPublisher, SignalEvent};
use crate::application::order_client::{OrderClient, OrderClientError, OrderRequest};
use crate::broker::{BrokerError, BrokerManager};
use crate::domain::signal::{Decision, ModifyOverrides, PendingSignal, Signal, SignalStatus};

/// Errors raised while carrying a signal through the approval pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApprovalError {
    /// No quote is cached and the broker has no record of the symbol.
    #[error("no quote available for symbol {0}")]
    SymbolUnavailable(String),
    /// The broker connection required to resolve a price or submit the
    /// order is down.
    #[error("broker not connected")]
    NotConnected,
    /// The broker rejected the resulting order.
    #[error("order rejected: {0}")]
    OrderRejected(#[from] OrderClientError),
}

impl From<BrokerError> for ApprovalError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::NotConnected => Self::NotConnected,
            BrokerError::UnknownSymbol(symbol) => Self::SymbolUnavailable(symbol),
            other => Self::SymbolUnavailable(other.to_string()),
        }
    }
}

/// Returns whether a verdict-driven transition between two statuses is
/// legal. `decision` disambiguates the one pair that branches on more than
/// the states themselves: `Pending -> Pending` is only a transition (a
/// `modify` verdict patching fields while the signal stays queued), never a
/// bare self-loop.
#[must_use]
pub fn is_valid_transition(from: SignalStatus, to: SignalStatus, decision: Decision) -> bool {
    matches!(
        (from, to, decision),
        (SignalStatus::Pending, SignalStatus::Pending, Decision::Modify)
            | (SignalStatus::Pending, SignalStatus::Approved, Decision::Approve)
            | (SignalStatus::Pending, SignalStatus::Rejected, Decision::Reject)
            | (SignalStatus::Approved, SignalStatus::Executed, _)
            | (SignalStatus::Approved, SignalStatus::Failed, _)
    )
}

/// Tracks every signal awaiting a verdict and drives approved signals
/// through to the broker.
pub struct ApprovalStateMachine {
    pending: RwLock<HashMap<String, PendingSignal>>,
    quotes: RwLock<HashMap<String, (Decimal, Decimal)>>,
    broker: Arc<dyn BrokerManager>,
    order_client: Arc<OrderClient>,
    publisher: Arc<dyn EventPublisherPort>,
    retention_window: Duration,
}

impl ApprovalStateMachine {
    /// Build a state machine over a broker handle and its Order Client,
    /// with no event publisher attached.
    #[must_use]
    pub fn new(broker: Arc<dyn BrokerManager>, order_client: Arc<OrderClient>) -> Self {
        Self::with_publisher(broker, order_client, Arc::new(NoOpEventPublisher))
    }

    /// Build a state machine with an explicit event publisher.
    #[must_use]
    pub fn with_publisher(
        broker: Arc<dyn BrokerManager>,
        order_client: Arc<OrderClient>,
        publisher: Arc<dyn EventPublisherPort>,
    ) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            quotes: RwLock::new(HashMap::new()),
            broker,
            order_client,
            publisher,
            retention_window: Duration::from_secs(3600),
        }
    }

    /// Feed a freshly-arrived quote into the resolution cache, so a later
    /// market-order approval does not need a synchronous broker round trip.
    pub fn update_quote(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        self.quotes
            .write()
            .expect("quote cache lock poisoned")
            .insert(symbol.to_string(), (bid, ask));
    }

    /// Hand a newly-ingested signal to the pipeline. Always succeeds: a
    /// signal that fails normalization never reaches this call.
    pub async fn enqueue(&self, signal: Signal) {
        self.evict_expired();
        let signal_id = signal.signal_id.clone();
        let pending = PendingSignal::new(signal, Utc::now());
        self.pending
            .write()
            .expect("pending map lock poisoned")
            .insert(signal_id.clone(), pending);
        tracing::info!(signal_id = %signal_id, "signal enqueued for approval");
        self.notify(&signal_id, SignalStatus::Pending, None).await;
    }

    /// Drop terminal entries whose `terminal_at` is older than
    /// `retention_window`. Called from `enqueue`/`verdict` so the pending
    /// map never grows unbounded without needing a background task.
    fn evict_expired(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.retention_window.as_secs() as i64);
        self.pending
            .write()
            .expect("pending map lock poisoned")
            .retain(|_, entry| !entry.status.is_terminal() || entry.terminal_at.is_none_or(|at| at >= cutoff));
    }

    /// Number of signals currently awaiting a verdict.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending
            .read()
            .expect("pending map lock poisoned")
            .values()
            .filter(|p| p.status == SignalStatus::Pending)
            .count()
    }

    /// Apply an external verdict to a pending signal.
    ///
    /// A verdict on an id that is missing, or whose signal has already left
    /// the `Pending` state, is a no-op: verdicts can arrive more than once
    /// and must not double-execute or double-reject.
    ///
    /// # Errors
    /// Returns [`ApprovalError`] if approval leads to a broker call that
    /// fails (no quote available, not connected, or the order is rejected).
    pub async fn verdict(
        &self,
        signal_id: &str,
        decision: Decision,
        overrides: Option<ModifyOverrides>,
    ) -> Result<(), ApprovalError> {
        self.evict_expired();
        let Some(current) = self.snapshot(signal_id) else {
            tracing::warn!(signal_id, "verdict for unknown signal, ignoring");
            return Ok(());
        };
        if current.status != SignalStatus::Pending {
            tracing::warn!(
                signal_id,
                status = ?current.status,
                "verdict for non-pending signal, ignoring"
            );
            return Ok(());
        }

        match decision {
            Decision::Modify => {
                self.apply_overrides(signal_id, overrides.unwrap_or_default());
                self.notify(signal_id, SignalStatus::Pending, Some("modified".to_string()))
                    .await;
                Ok(())
            }
            Decision::Reject => {
                self.set_status(signal_id, SignalStatus::Rejected, None);
                self.notify(signal_id, SignalStatus::Rejected, None).await;
                Ok(())
            }
            Decision::Approve => self.approve(signal_id).await,
        }
    }

    /// Execute a signal immediately, bypassing the pending queue. Used for
    /// auto-approval configurations.
    ///
    /// # Errors
    /// See [`Self::verdict`].
    pub async fn execute_now(&self, signal: Signal) -> Result<(), ApprovalError> {
        let signal_id = signal.signal_id.clone();
        let pending = PendingSignal::new(signal, Utc::now());
        self.pending
            .write()
            .expect("pending map lock poisoned")
            .insert(signal_id.clone(), pending);
        self.approve(&signal_id).await
    }

    fn snapshot(&self, signal_id: &str) -> Option<PendingSignal> {
        self.pending
            .read()
            .expect("pending map lock poisoned")
            .get(signal_id)
            .cloned()
    }

    fn set_status(&self, signal_id: &str, status: SignalStatus, failure_reason: Option<String>) {
        if let Some(entry) = self
            .pending
            .write()
            .expect("pending map lock poisoned")
            .get_mut(signal_id)
        {
            entry.status = status;
            entry.failure_reason = failure_reason;
            if status.is_terminal() {
                entry.terminal_at = Some(Utc::now());
            }
        }
    }

    fn apply_overrides(&self, signal_id: &str, overrides: ModifyOverrides) {
        if let Some(entry) = self
            .pending
            .write()
            .expect("pending map lock poisoned")
            .get_mut(signal_id)
        {
            if let Some(volume) = overrides.volume_lots {
                entry.signal.volume_lots = Some(volume);
            }
            if let Some(sl) = overrides.stop_loss {
                entry.signal.stop_loss = Some(sl);
            }
            if let Some(tp) = overrides.take_profit {
                entry.signal.take_profit = Some(tp);
            }
        }
    }

    async fn approve(&self, signal_id: &str) -> Result<(), ApprovalError> {
        self.set_status(signal_id, SignalStatus::Approved, None);
        self.notify(signal_id, SignalStatus::Approved, None).await;

        let signal = self
            .snapshot(signal_id)
            .expect("just wrote this entry")
            .signal;

        let result = self.dispatch(&signal).await;
        match &result {
            Ok(ticket) => {
                if let Some(entry) = self
                    .pending
                    .write()
                    .expect("pending map lock poisoned")
                    .get_mut(signal_id)
                {
                    entry.executed_ticket = Some(ticket.0);
                }
                self.set_status(signal_id, SignalStatus::Executed, None);
                self.notify(signal_id, SignalStatus::Executed, None).await;
            }
            Err(err) => {
                self.set_status(signal_id, SignalStatus::Failed, Some(err.to_string()));
                self.notify(signal_id, SignalStatus::Failed, Some(err.to_string()))
                    .await;
            }
        }
        result.map(|_| ())
    }

    async fn dispatch(
        &self,
        signal: &Signal,
    ) -> Result<crate::application::order_client::OrderTicket, ApprovalError> {
        let price = self.resolve_price(signal).await?;
        let request = OrderRequest::from_signal(signal, price);
        let ticket = if signal.kind.requires_ticket() {
            if signal.kind == crate::domain::signal::SignalKind::Close {
                self.order_client.close_order(&request).await
            } else {
                self.order_client.modify_order(&request).await
            }
        } else {
            self.order_client.place_order(&request).await
        };
        Ok(ticket?)
    }

    async fn resolve_price(&self, signal: &Signal) -> Result<Decimal, ApprovalError> {
        if !signal.kind.is_market() {
            return Ok(signal.price.unwrap_or(Decimal::ZERO));
        }
        if let Some((bid, ask)) = self
            .quotes
            .read()
            .expect("quote cache lock poisoned")
            .get(&signal.symbol)
            .copied()
        {
            return Ok(if signal.kind.is_buy() { ask } else { bid });
        }
        let info = self.broker.symbol_info(&signal.symbol).await?;
        self.update_quote(&signal.symbol, info.bid, info.ask);
        Ok(if signal.kind.is_buy() { info.ask } else { info.bid })
    }

    #[cfg(test)]
    fn with_retention_window(mut self, retention_window: Duration) -> Self {
        self.retention_window = retention_window;
        self
    }

    async fn notify(&self, signal_id: &str, status: SignalStatus, detail: Option<String>) {
        let event = SignalEvent {
            signal_id: signal_id.to_string(),
            status,
            detail,
        };
        if let Err(err) = self.publisher.publish(event).await {
            tracing::warn!(signal_id, error = %err, "failed to publish signal event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::MockBrokerManager;
    use crate::broker::BrokerRetryPolicy;
    use crate::domain::signal::{normalize_entry, SignalKind};
    use serde_json::json;
    use test_case::test_case;

    #[test_case(SignalStatus::Pending, SignalStatus::Pending, Decision::Modify, true; "modify keeps pending")]
    #[test_case(SignalStatus::Pending, SignalStatus::Pending, Decision::Approve, false; "bare self loop rejected")]
    #[test_case(SignalStatus::Pending, SignalStatus::Approved, Decision::Approve, true; "approve from pending")]
    #[test_case(SignalStatus::Pending, SignalStatus::Rejected, Decision::Reject, true; "reject from pending")]
    #[test_case(SignalStatus::Approved, SignalStatus::Executed, Decision::Approve, true; "approved to executed")]
    #[test_case(SignalStatus::Approved, SignalStatus::Failed, Decision::Approve, true; "approved to failed")]
    #[test_case(SignalStatus::Rejected, SignalStatus::Approved, Decision::Approve, false; "terminal state has no transitions")]
    fn transition_table(from: SignalStatus, to: SignalStatus, decision: Decision, expected: bool) {
        assert_eq!(is_valid_transition(from, to, decision), expected);
    }

    fn machine() -> ApprovalStateMachine {
        let broker = Arc::new(MockBrokerManager::new());
        let order_client = Arc::new(OrderClient::new(broker.clone(), BrokerRetryPolicy::default()));
        ApprovalStateMachine::new(broker, order_client)
    }

    fn buy_signal(id: &str) -> Signal {
        normalize_entry(&json!({
            "signal_id": id, "type": "buy", "symbol": "EURUSD",
            "login": 1, "volume": 0.1
        }))
        .expect("valid signal")
    }

    #[tokio::test]
    async fn enqueue_then_approve_executes_against_mock_broker() {
        let sm = machine();
        sm.enqueue(buy_signal("S1")).await;
        assert_eq!(sm.pending_count(), 1);

        sm.verdict("S1", Decision::Approve, None)
            .await
            .expect("mock broker accepts");
        assert_eq!(sm.pending_count(), 0);

        let entry = sm.snapshot("S1").expect("still tracked");
        assert_eq!(entry.status, SignalStatus::Executed);
        assert!(entry.executed_ticket.is_some());
    }

    #[tokio::test]
    async fn reject_is_terminal() {
        let sm = machine();
        sm.enqueue(buy_signal("S2")).await;
        sm.verdict("S2", Decision::Reject, None).await.unwrap();
        let entry = sm.snapshot("S2").expect("still tracked");
        assert_eq!(entry.status, SignalStatus::Rejected);
    }

    #[tokio::test]
    async fn verdict_on_terminal_signal_is_a_noop() {
        let sm = machine();
        sm.enqueue(buy_signal("S3")).await;
        sm.verdict("S3", Decision::Reject, None).await.unwrap();
        sm.verdict("S3", Decision::Approve, None).await.unwrap();
        let entry = sm.snapshot("S3").expect("still tracked");
        assert_eq!(entry.status, SignalStatus::Rejected);
    }

    #[tokio::test]
    async fn terminal_entries_are_evicted_once_retention_window_elapses() {
        let broker = Arc::new(MockBrokerManager::new());
        let order_client = Arc::new(OrderClient::new(broker.clone(), BrokerRetryPolicy::default()));
        let sm = ApprovalStateMachine::new(broker, order_client)
            .with_retention_window(Duration::from_secs(0));

        sm.enqueue(buy_signal("S8")).await;
        sm.verdict("S8", Decision::Reject, None).await.unwrap();
        assert!(sm.snapshot("S8").is_some());

        tokio::time::sleep(Duration::from_millis(5)).await;
        // Any enqueue/verdict call sweeps expired terminal entries first.
        sm.enqueue(buy_signal("S9")).await;
        assert!(sm.snapshot("S8").is_none());
        assert!(sm.snapshot("S9").is_some());
    }

    #[tokio::test]
    async fn verdict_on_unknown_id_is_a_noop() {
        let sm = machine();
        assert!(sm.verdict("nonexistent", Decision::Approve, None).await.is_ok());
    }

    #[tokio::test]
    async fn modify_verdict_patches_fields_and_stays_pending() {
        let sm = machine();
        sm.enqueue(buy_signal("S4")).await;
        sm.verdict(
            "S4",
            Decision::Modify,
            Some(ModifyOverrides {
                volume_lots: Some(Decimal::new(5, 1)),
                stop_loss: None,
                take_profit: None,
            }),
        )
        .await
        .unwrap();
        let entry = sm.snapshot("S4").expect("still tracked");
        assert_eq!(entry.status, SignalStatus::Pending);
        assert_eq!(entry.signal.volume_lots, Some(Decimal::new(5, 1)));
    }

    #[tokio::test]
    async fn market_order_resolves_price_from_cached_quote() {
        let sm = machine();
        sm.update_quote("EURUSD", Decimal::new(11000, 4), Decimal::new(11002, 4));
        let signal = buy_signal("S5");
        let price = sm.resolve_price(&signal).await.expect("cached quote hits");
        assert_eq!(price, Decimal::new(11002, 4));
    }

    #[tokio::test]
    async fn market_order_falls_back_to_synchronous_symbol_info() {
        let sm = machine();
        let signal = buy_signal("S6");
        let price = sm
            .resolve_price(&signal)
            .await
            .expect("mock broker knows EURUSD");
        assert!(price > Decimal::ZERO);
    }

    #[tokio::test]
    async fn pending_order_uses_its_own_price_untouched() {
        let sm = machine();
        let signal = normalize_entry(&json!({
            "signal_id": "S7", "type": "buy_limit", "symbol": "EURUSD",
            "login": 1, "volume": 0.1, "price": 1.0950
        }))
        .expect("valid signal");
        assert_eq!(signal.kind, SignalKind::BuyLimit);
        let price = sm.resolve_price(&signal).await.expect("no broker call needed");
        assert_eq!(price, Decimal::new(10950, 4));
    }
}
