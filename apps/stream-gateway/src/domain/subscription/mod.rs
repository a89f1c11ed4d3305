//! Client subscription tracking for the streaming gateway.
//!
//! Maintains the bidirectional mapping between connected clients and the
//! symbols they have subscribed to: `client -> symbols` and the reverse
//! index `symbol -> clients`. Unlike an upstream-feed proxy, there is no
//! refcounted "upstream subscribe" side effect here — membership is the
//! only thing being tracked.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

/// Unique identifier for a connected client.
pub type ClientId = u64;

/// A symbol string (stock ticker or FX pair).
pub type Symbol = String;

/// Result of a subscribe/unsubscribe call: which symbols actually changed
/// membership for this client (duplicates and unknowns are silently
/// absorbed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChange {
    /// Symbols newly added (subscribe) or removed (unsubscribe) for this
    /// client.
    pub changed: Vec<Symbol>,
    /// The client's full current subscription set, post-change.
    pub current: Vec<Symbol>,
}

impl SubscriptionChange {
    /// Whether anything actually changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Tracks subscriptions for all connected clients.
///
/// Invariant: a symbol present in any client's subscription set appears in
/// `symbol -> clients` and vice versa; this type is the sole owner of both
/// maps and upholds the invariant internally under a single lock.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    client_symbols: HashMap<ClientId, HashSet<Symbol>>,
    symbol_clients: HashMap<Symbol, HashSet<ClientId>>,
}

impl SubscriptionManager {
    /// Create an empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add symbols to a client's subscription set.
    ///
    /// Returns the symbols newly added (excluding ones the client was
    /// already subscribed to) and the client's full resulting set.
    pub fn subscribe(&self, client: ClientId, symbols: &[Symbol]) -> SubscriptionChange {
        let mut inner = self.inner.write();
        let client_set = inner.client_symbols.entry(client).or_default();

        let mut added = Vec::new();
        for symbol in symbols {
            if client_set.insert(symbol.clone()) {
                added.push(symbol.clone());
            }
        }
        let current: Vec<Symbol> = client_set.iter().cloned().collect();

        for symbol in &added {
            inner
                .symbol_clients
                .entry(symbol.clone())
                .or_default()
                .insert(client);
        }

        SubscriptionChange {
            changed: added,
            current,
        }
    }

    /// Remove symbols from a client's subscription set. Permissive: symbols
    /// the client was never subscribed to are silently skipped.
    pub fn unsubscribe(&self, client: ClientId, symbols: &[Symbol]) -> SubscriptionChange {
        let mut inner = self.inner.write();
        let mut removed = Vec::new();

        if let Some(client_set) = inner.client_symbols.get_mut(&client) {
            for symbol in symbols {
                if client_set.remove(symbol) {
                    removed.push(symbol.clone());
                }
            }
        }

        for symbol in &removed {
            if let Some(clients) = inner.symbol_clients.get_mut(symbol) {
                clients.remove(&client);
                if clients.is_empty() {
                    inner.symbol_clients.remove(symbol);
                }
            }
        }

        let current = inner
            .client_symbols
            .get(&client)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();

        if inner
            .client_symbols
            .get(&client)
            .is_some_and(HashSet::is_empty)
        {
            inner.client_symbols.remove(&client);
        }

        SubscriptionChange {
            changed: removed,
            current,
        }
    }

    /// Remove a client entirely, dropping empty per-symbol sets.
    pub fn remove_client(&self, client: ClientId) {
        let mut inner = self.inner.write();
        let Some(symbols) = inner.client_symbols.remove(&client) else {
            return;
        };
        for symbol in symbols {
            if let Some(clients) = inner.symbol_clients.get_mut(&symbol) {
                clients.remove(&client);
                if clients.is_empty() {
                    inner.symbol_clients.remove(&symbol);
                }
            }
        }
    }

    /// All clients currently subscribed to a symbol.
    #[must_use]
    pub fn clients_for(&self, symbol: &str) -> Vec<ClientId> {
        self.inner
            .read()
            .symbol_clients
            .get(symbol)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    /// A client's full subscription set.
    #[must_use]
    pub fn symbols_for(&self, client: ClientId) -> Vec<Symbol> {
        self.inner
            .read()
            .client_symbols
            .get(&client)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of distinct subscribed symbols.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.inner.read().symbol_clients.len()
    }

    /// Total number of clients with at least one subscription.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.inner.read().client_symbols.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_adds_to_reverse_index() {
        let mgr = SubscriptionManager::new();
        let change = mgr.subscribe(1, &["EURUSD".to_string()]);
        assert_eq!(change.changed, vec!["EURUSD".to_string()]);
        assert_eq!(mgr.clients_for("EURUSD"), vec![1]);
    }

    #[test]
    fn duplicate_subscribe_is_idempotent() {
        let mgr = SubscriptionManager::new();
        mgr.subscribe(1, &["EURUSD".to_string()]);
        let change = mgr.subscribe(1, &["EURUSD".to_string()]);
        assert!(change.is_empty());
        assert_eq!(mgr.clients_for("EURUSD"), vec![1]);
    }

    #[test]
    fn multiple_clients_share_symbol() {
        let mgr = SubscriptionManager::new();
        mgr.subscribe(1, &["EURUSD".to_string()]);
        mgr.subscribe(2, &["EURUSD".to_string()]);
        let mut clients = mgr.clients_for("EURUSD");
        clients.sort_unstable();
        assert_eq!(clients, vec![1, 2]);
    }

    #[test]
    fn unsubscribe_is_permissive_for_unknown_symbols() {
        let mgr = SubscriptionManager::new();
        mgr.subscribe(1, &["EURUSD".to_string()]);
        let change = mgr.unsubscribe(1, &["GBPUSD".to_string()]);
        assert!(change.is_empty());
        assert_eq!(mgr.symbols_for(1), vec!["EURUSD".to_string()]);
    }

    #[test]
    fn unsubscribe_drops_empty_symbol_set() {
        let mgr = SubscriptionManager::new();
        mgr.subscribe(1, &["EURUSD".to_string()]);
        mgr.unsubscribe(1, &["EURUSD".to_string()]);
        assert!(mgr.clients_for("EURUSD").is_empty());
        assert_eq!(mgr.symbol_count(), 0);
    }

    #[test]
    fn remove_client_cleans_up_all_symbols() {
        let mgr = SubscriptionManager::new();
        mgr.subscribe(1, &["EURUSD".to_string(), "GBPUSD".to_string()]);
        mgr.remove_client(1);
        assert!(mgr.clients_for("EURUSD").is_empty());
        assert!(mgr.clients_for("GBPUSD").is_empty());
        assert_eq!(mgr.client_count(), 0);
    }

    #[test]
    fn remove_client_preserves_other_clients() {
        let mgr = SubscriptionManager::new();
        mgr.subscribe(1, &["EURUSD".to_string()]);
        mgr.subscribe(2, &["EURUSD".to_string()]);
        mgr.remove_client(1);
        assert_eq!(mgr.clients_for("EURUSD"), vec![2]);
    }

    #[test]
    fn removing_unknown_client_is_a_no_op() {
        let mgr = SubscriptionManager::new();
        mgr.subscribe(1, &["EURUSD".to_string()]);
        mgr.remove_client(999);
        assert_eq!(mgr.clients_for("EURUSD"), vec![1]);
    }

    #[test]
    fn thread_safety_concurrent_subscribe() {
        use std::sync::Arc;
        use std::thread;

        let mgr = Arc::new(SubscriptionManager::new());
        let mut handles = vec![];
        for i in 0..10u64 {
            let m = Arc::clone(&mgr);
            handles.push(thread::spawn(move || {
                m.subscribe(i, &[format!("SYM{i}"), "SHARED".to_string()]);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(mgr.client_count(), 10);
        assert_eq!(mgr.symbol_count(), 11);
    }
}
