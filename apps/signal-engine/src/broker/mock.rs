//! Mock broker manager.
//!
//! The only backend available when the native broker library is not
//! loadable, and the backend used for offline tests. Produces deterministic
//! synthetic tickets and echoes its inputs back as the executed price.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{BrokerError, BrokerManager, SymbolInfo, TradeTransInfo};

/// Mock implementation of [`BrokerManager`]. Order tickets are generated
/// sequentially starting from 1, mirroring the execution engine's own
/// mock-broker ticket counter.
#[derive(Debug)]
pub struct MockBrokerManager {
    connected: AtomicBool,
    next_ticket: AtomicU64,
    symbols: RwLock<HashMap<String, SymbolInfo>>,
}

impl Default for MockBrokerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrokerManager {
    /// Create a mock broker with a small default symbol universe.
    #[must_use]
    pub fn new() -> Self {
        Self::with_symbols(vec![
            ("EURUSD", 5, Decimal::new(11000, 4), Decimal::new(11002, 4)),
            ("GBPUSD", 5, Decimal::new(12850, 4), Decimal::new(12853, 4)),
            ("USDJPY", 3, Decimal::new(14970, 2), Decimal::new(14973, 2)),
        ])
    }

    /// Create a mock broker with a custom symbol universe.
    #[must_use]
    pub fn with_symbols(entries: Vec<(&str, u32, Decimal, Decimal)>) -> Self {
        let symbols = entries
            .into_iter()
            .map(|(symbol, digits, bid, ask)| (symbol.to_string(), SymbolInfo { digits, bid, ask }))
            .collect();
        Self {
            connected: AtomicBool::new(false),
            next_ticket: AtomicU64::new(1),
            symbols: RwLock::new(symbols),
        }
    }

    /// Overwrite the cached quote for a symbol (test helper).
    pub fn set_quote(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        if let Some(info) = self
            .symbols
            .write()
            .unwrap_or_else(std::sync::RwLockWriteGuard::into_inner)
            .get_mut(symbol)
        {
            info.bid = bid;
            info.ask = ask;
        }
    }
}

#[async_trait]
impl BrokerManager for MockBrokerManager {
    async fn connect(&self, _host: &str, _port: u16) -> Result<(), BrokerError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn login(&self, _login: i64, _password: &str) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo, BrokerError> {
        self.symbols
            .read()
            .unwrap_or_else(std::sync::RwLockReadGuard::into_inner)
            .get(symbol)
            .copied()
            .ok_or_else(|| BrokerError::UnknownSymbol(symbol.to_string()))
    }

    async fn trade_transaction(&self, _account: i64, _info: &TradeTransInfo) -> Result<i64, i32> {
        #[allow(clippy::cast_possible_wrap)]
        Ok(self.next_ticket.fetch_add(1, Ordering::SeqCst) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tickets_are_sequential_starting_from_one() {
        let mock = MockBrokerManager::new();
        mock.connect("localhost", 443).await.expect("connect");
        let info = TradeTransInfo {
            login: 1,
            symbol: "EURUSD".to_string(),
            cmd: 0,
            volume_hundredths: 10,
            price: Decimal::new(11002, 4),
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            ticket: 0,
            comment: String::new(),
            magic: 0,
        };
        let first = mock.trade_transaction(1, &info).await.expect("ticket");
        let second = mock.trade_transaction(1, &info).await.expect("ticket");
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn symbol_info_returns_cached_quote() {
        let mock = MockBrokerManager::new();
        let info = mock.symbol_info("EURUSD").await.expect("known symbol");
        assert_eq!(info.digits, 5);
        assert!(info.ask > info.bid);
    }

    #[tokio::test]
    async fn unknown_symbol_is_rejected() {
        let mock = MockBrokerManager::new();
        let err = mock.symbol_info("XXXYYY").await.unwrap_err();
        assert_eq!(err, BrokerError::UnknownSymbol("XXXYYY".to_string()));
    }

    #[tokio::test]
    async fn login_requires_prior_connect() {
        let mock = MockBrokerManager::new();
        let err = mock.login(1, "secret").await.unwrap_err();
        assert_eq!(err, BrokerError::NotConnected);
    }
}
