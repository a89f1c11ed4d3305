//! Event Dispatcher.
//!
//! Single owner of the last-value caches (`symbol -> latest Quote`,
//! `order_id -> latest Trade`) and the subscriber indexes. Accepts decoded
//! events from the Pumping Adapter and delivers them to registered
//! callbacks, represented here as per-subscriber bounded mailboxes so a
//! slow subscriber never blocks delivery to others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::model::{Quote, Symbol, Trade};

/// Per-subscriber bounded mailbox with drop-oldest overflow.
pub mod mailbox;

/// Per-subscriber quote rate limiting.
pub mod aggregator;

use mailbox::{mailbox as new_mailbox, MailboxReceiver, MailboxSender};

/// Identifies one registered subscriber across quote and trade indexes.
pub type SubscriberId = u64;

/// The single value a subscriber's mailbox can carry. Sync and async
/// delivery are not distinguished here — both are just a value pushed into
/// the subscriber's mailbox; what the subscriber does with it (forward to a
/// WebSocket, drive a test assertion) is up to the consumer of the
/// receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// A quote update for a subscribed symbol.
    Quote(Quote),
    /// A trade update for a subscribed account.
    Trade(Trade),
}

/// Aggregate counters for the dispatcher.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Quotes accepted into the cache and routed for delivery.
    pub quotes_dispatched: AtomicU64,
    /// Trades accepted into the cache and routed for delivery.
    pub trades_dispatched: AtomicU64,
    /// Quotes dropped for being stale relative to the cached value.
    pub quotes_stale_dropped: AtomicU64,
    /// Trades dropped for being stale relative to the cached value.
    pub trades_stale_dropped: AtomicU64,
}

#[derive(Default)]
struct Index {
    /// Subscriber ids, insertion-ordered, keyed by symbol/account.
    by_key: HashMap<String, Vec<SubscriberId>>,
    /// Subscribers registered for every key ("all" subscribers).
    all: Vec<SubscriberId>,
}

impl Index {
    fn subscribe_key(&mut self, key: &str, id: SubscriberId) {
        let entry = self.by_key.entry(key.to_string()).or_default();
        if !entry.contains(&id) {
            entry.push(id);
        }
    }

    fn unsubscribe_key(&mut self, key: &str, id: SubscriberId) {
        if let Some(entry) = self.by_key.get_mut(key) {
            entry.retain(|existing| *existing != id);
            if entry.is_empty() {
                self.by_key.remove(key);
            }
        }
    }

    fn subscribe_all(&mut self, id: SubscriberId) {
        if !self.all.contains(&id) {
            self.all.push(id);
        }
    }

    fn unsubscribe_all(&mut self, id: SubscriberId) {
        self.all.retain(|existing| *existing != id);
    }

    fn remove(&mut self, id: SubscriberId) {
        self.all.retain(|existing| *existing != id);
        self.by_key.retain(|_, ids| {
            ids.retain(|existing| *existing != id);
            !ids.is_empty()
        });
    }

    /// Subscribers for `key` followed by "all" subscribers, each group
    /// insertion-ordered, with no duplicates across the two groups.
    fn recipients(&self, key: &str) -> Vec<SubscriberId> {
        let mut result = self.by_key.get(key).cloned().unwrap_or_default();
        for id in &self.all {
            if !result.contains(id) {
                result.push(*id);
            }
        }
        result
    }
}

/// Caches and subscriber indexes for the event fabric, plus delivery.
pub struct EventDispatcher {
    quote_cache: RwLock<HashMap<Symbol, Quote>>,
    trade_cache: RwLock<HashMap<i64, Trade>>,
    trade_cache_capacity: usize,
    trade_cache_order: RwLock<Vec<i64>>,
    quote_index: RwLock<Index>,
    trade_index: RwLock<Index>,
    mailboxes: RwLock<HashMap<SubscriberId, MailboxSender<DispatchEvent>>>,
    next_subscriber_id: AtomicU64,
    mailbox_capacity: usize,
    stats: DispatcherStats,
}

impl EventDispatcher {
    /// Create a dispatcher whose per-subscriber mailboxes have capacity
    /// `mailbox_capacity` and whose trade cache evicts by LRU once
    /// `trade_cache_capacity` distinct order ids are held.
    #[must_use]
    pub fn new(mailbox_capacity: usize, trade_cache_capacity: usize) -> Self {
        Self {
            quote_cache: RwLock::new(HashMap::new()),
            trade_cache: RwLock::new(HashMap::new()),
            trade_cache_capacity: trade_cache_capacity.max(1),
            trade_cache_order: RwLock::new(Vec::new()),
            quote_index: RwLock::new(Index::default()),
            trade_index: RwLock::new(Index::default()),
            mailboxes: RwLock::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            mailbox_capacity: mailbox_capacity.max(1),
            stats: DispatcherStats::default(),
        }
    }

    /// Register a new subscriber and obtain the receiving half of its
    /// mailbox. The subscriber must still be attached via
    /// `subscribe_quotes`/`subscribe_trades`/etc to actually receive
    /// anything.
    pub fn register_subscriber(&self) -> (SubscriberId, MailboxReceiver<DispatchEvent>) {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = new_mailbox(self.mailbox_capacity);
        self.mailboxes.write().insert(id, tx);
        (id, rx)
    }

    /// Fully remove a subscriber: from every index and from the mailbox
    /// table. Idempotent.
    pub fn remove_subscriber(&self, id: SubscriberId) {
        self.quote_index.write().remove(id);
        self.trade_index.write().remove(id);
        if let Some(sender) = self.mailboxes.write().remove(&id) {
            sender.close();
        }
    }

    /// Subscribe to quote updates for one symbol. Idempotent on
    /// `(symbol, id)`.
    pub fn subscribe_quotes(&self, symbol: &str, id: SubscriberId) {
        self.quote_index.write().subscribe_key(symbol, id);
    }

    /// Unsubscribe from quote updates for one symbol.
    pub fn unsubscribe_quotes(&self, symbol: &str, id: SubscriberId) {
        self.quote_index.write().unsubscribe_key(symbol, id);
    }

    /// Subscribe to trade updates for one account. Idempotent on
    /// `(account_id, id)`.
    pub fn subscribe_trades(&self, account_id: i64, id: SubscriberId) {
        self.trade_index.write().subscribe_key(&account_id.to_string(), id);
    }

    /// Unsubscribe from trade updates for one account.
    pub fn unsubscribe_trades(&self, account_id: i64, id: SubscriberId) {
        self.trade_index
            .write()
            .unsubscribe_key(&account_id.to_string(), id);
    }

    /// Subscribe to every quote update regardless of symbol.
    pub fn subscribe_all_quotes(&self, id: SubscriberId) {
        self.quote_index.write().subscribe_all(id);
    }

    /// Subscribe to every trade update regardless of account.
    pub fn subscribe_all_trades(&self, id: SubscriberId) {
        self.trade_index.write().subscribe_all(id);
    }

    /// The latest cached quote for a symbol, if any.
    #[must_use]
    pub fn latest_quote(&self, symbol: &str) -> Option<Quote> {
        self.quote_cache.read().get(symbol).cloned()
    }

    /// The latest cached trade for an order id, if any.
    #[must_use]
    pub fn latest_trade(&self, order_id: i64) -> Option<Trade> {
        self.trade_cache.read().get(&order_id).cloned()
    }

    /// Copy-out snapshot of every cached quote.
    #[must_use]
    pub fn snapshot_quotes(&self) -> HashMap<Symbol, Quote> {
        self.quote_cache.read().clone()
    }

    /// Dispatcher-wide counters.
    #[must_use]
    pub fn stats(&self) -> &DispatcherStats {
        &self.stats
    }

    /// Accept a decoded quote event: update the cache (dropping strictly
    /// stale updates), then deliver to symbol-keyed subscribers followed by
    /// "all" subscribers, in insertion order.
    pub fn dispatch_quote(&self, quote: Quote) {
        {
            let mut cache = self.quote_cache.write();
            if let Some(existing) = cache.get(&quote.symbol)
                && quote.broker_timestamp < existing.broker_timestamp
            {
                self.stats.quotes_stale_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            cache.insert(quote.symbol.clone(), quote.clone());
        }
        self.stats.quotes_dispatched.fetch_add(1, Ordering::Relaxed);

        let recipients = self.quote_index.read().recipients(&quote.symbol);
        self.deliver_to(&recipients, DispatchEvent::Quote(quote));
    }

    /// Accept a decoded trade event: update the cache (dropping strictly
    /// stale updates, evicting by LRU at capacity), then deliver to
    /// account-keyed subscribers followed by "all" subscribers.
    pub fn dispatch_trade(&self, trade: Trade) {
        {
            let mut cache = self.trade_cache.write();
            if let Some(existing) = cache.get(&trade.order_id)
                && trade.broker_timestamp < existing.broker_timestamp
            {
                self.stats.trades_stale_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            cache.insert(trade.order_id, trade.clone());
            {
                let mut order = self.trade_cache_order.write();
                order.retain(|id| *id != trade.order_id);
                order.push(trade.order_id);
                if order.len() > self.trade_cache_capacity {
                    let evicted = order.remove(0);
                    cache.remove(&evicted);
                }
            }
        }
        self.stats.trades_dispatched.fetch_add(1, Ordering::Relaxed);

        let recipients = self
            .trade_index
            .read()
            .recipients(&trade.account_id.to_string());
        self.deliver_to(&recipients, DispatchEvent::Trade(trade));
    }

    fn deliver_to(&self, recipients: &[SubscriberId], event: DispatchEvent) {
        let mailboxes = self.mailboxes.read();
        for id in recipients {
            if let Some(sender) = mailboxes.get(id) {
                sender.deliver(event.clone());
            }
        }
    }
}

/// Shared handle to an [`EventDispatcher`].
pub type SharedEventDispatcher = Arc<EventDispatcher>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn quote(symbol: &str, ts: i64) -> Quote {
        Quote::new(symbol.to_string(), Decimal::ONE, Decimal::from(2), 5, ts, Utc::now())
    }

    #[tokio::test]
    async fn symbol_subscriber_receives_matching_quote() {
        let dispatcher = EventDispatcher::new(16, 100);
        let (id, mut rx) = dispatcher.register_subscriber();
        dispatcher.subscribe_quotes("EURUSD", id);

        dispatcher.dispatch_quote(quote("EURUSD", 1));
        dispatcher.dispatch_quote(quote("GBPUSD", 1));

        let received = rx.recv().await;
        assert!(matches!(received, Some(DispatchEvent::Quote(q)) if q.symbol == "EURUSD"));
    }

    #[test]
    fn stale_quote_is_dropped() {
        let dispatcher = EventDispatcher::new(16, 100);
        dispatcher.dispatch_quote(quote("EURUSD", 10));
        dispatcher.dispatch_quote(quote("EURUSD", 5));
        let cached = dispatcher.latest_quote("EURUSD").unwrap();
        assert_eq!(cached.broker_timestamp, 10);
        assert_eq!(
            dispatcher.stats().quotes_stale_dropped.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn all_quotes_subscriber_sees_every_symbol() {
        let dispatcher = EventDispatcher::new(16, 100);
        let (id, mut rx) = dispatcher.register_subscriber();
        dispatcher.subscribe_all_quotes(id);

        dispatcher.dispatch_quote(quote("EURUSD", 1));
        dispatcher.dispatch_quote(quote("GBPUSD", 1));

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn remove_subscriber_stops_delivery() {
        let dispatcher = EventDispatcher::new(16, 100);
        let (id, _rx) = dispatcher.register_subscriber();
        dispatcher.subscribe_quotes("EURUSD", id);
        dispatcher.remove_subscriber(id);

        // Should not panic delivering to a removed subscriber.
        dispatcher.dispatch_quote(quote("EURUSD", 1));
    }

    #[test]
    fn trade_cache_evicts_by_lru_at_capacity() {
        let dispatcher = EventDispatcher::new(16, 2);
        let mut make = |order_id: i64| Trade {
            order_id,
            account_id: 1,
            symbol: "EURUSD".to_string(),
            side: crate::domain::model::TradeSide::Buy,
            volume_lots: Decimal::ONE,
            open_price: Decimal::ONE,
            close_price: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            profit: Decimal::ZERO,
            state: crate::domain::model::TradeState::Open,
            broker_timestamp: order_id,
        };
        dispatcher.dispatch_trade(make(1));
        dispatcher.dispatch_trade(make(2));
        // Re-touch order 1 so it is no longer the least-recently-updated entry.
        dispatcher.dispatch_trade(make(1));
        dispatcher.dispatch_trade(make(3));

        assert!(dispatcher.latest_trade(2).is_none());
        assert!(dispatcher.latest_trade(1).is_some());
        assert!(dispatcher.latest_trade(3).is_some());
    }
}
