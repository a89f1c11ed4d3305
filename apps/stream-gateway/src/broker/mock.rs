//! Mock broker manager.
//!
//! The only backend available when the native broker library is not
//! loadable, and the backend used for offline tests. Generates a small,
//! deterministic-ish synthetic market on a dedicated `std::thread` so the
//! push-callback boundary behaves like a thread genuinely foreign to the
//! async runtime, the way the real library would.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use super::{
    BrokerError, BrokerManager, PumpingCode, RawPumpData, RawPumpEvent, SymbolInfo, TradeRecord,
    TradeTransInfo,
};

type Callback = Arc<dyn Fn(RawPumpEvent) + Send + Sync>;

/// Mock implementation of [`BrokerManager`] that simulates a small universe
/// of symbols and pushes synthetic quote updates on a background thread.
pub struct MockBrokerManager {
    connected: AtomicBool,
    symbols: Vec<SymbolInfo>,
    next_ticket: AtomicI64,
    callback: Mutex<Option<Callback>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
    tick_interval: Duration,
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
        Self::with_symbols(
            vec![
                SymbolInfo {
                    symbol: "EURUSD".to_string(),
                    digits: 5,
                },
                SymbolInfo {
                    symbol: "GBPUSD".to_string(),
                    digits: 5,
                },
                SymbolInfo {
                    symbol: "USDJPY".to_string(),
                    digits: 3,
                },
            ],
            Duration::from_millis(200),
        )
    }

    /// Create a mock broker with a custom symbol universe and emission rate.
    #[must_use]
    pub fn with_symbols(symbols: Vec<SymbolInfo>, tick_interval: Duration) -> Self {
        Self {
            connected: AtomicBool::new(false),
            symbols,
            next_ticket: AtomicI64::new(1_000_000),
            callback: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
            tick_interval,
        }
    }
}

impl BrokerManager for MockBrokerManager {
    fn connect(&self, _host: &str, _port: u16) -> Result<(), BrokerError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn login(&self, _login: i64, _password: &str) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.unregister_pump_callback();
    }

    fn symbols_all(&self) -> Vec<SymbolInfo> {
        self.symbols.clone()
    }

    fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo> {
        self.symbols.iter().find(|s| s.symbol == symbol).cloned()
    }

    fn trades_all(&self) -> Vec<TradeRecord> {
        Vec::new()
    }

    fn trades_for(&self, _account: i64) -> Vec<TradeRecord> {
        Vec::new()
    }

    fn trade_transaction(&self, _account: i64, _info: &TradeTransInfo) -> Result<i64, i32> {
        Ok(self.next_ticket.fetch_add(1, Ordering::SeqCst))
    }

    fn register_pump_callback(
        &self,
        cb: Box<dyn Fn(RawPumpEvent) + Send + Sync>,
    ) -> Result<(), BrokerError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }

        let mut guard = self.callback.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return Err(BrokerError::AlreadyRunning);
        }

        let cb: Callback = Arc::from(cb);
        *guard = Some(Arc::clone(&cb));
        drop(guard);

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let symbols = self.symbols.clone();
        let tick_interval = self.tick_interval;

        let handle = std::thread::spawn(move || {
            cb(RawPumpEvent {
                code: PumpingCode::PumpingStarted,
                data: None,
            });

            let mut rng = rand::rng();
            let mut prices: Vec<(String, u32, Decimal)> = symbols
                .iter()
                .map(|s| {
                    let base = Decimal::from_f64(1.1000).unwrap_or_default();
                    (s.symbol.clone(), s.digits, base)
                })
                .collect();
            let mut ticks_since_ping = 0u32;

            while running.load(Ordering::SeqCst) {
                std::thread::sleep(tick_interval);
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                ticks_since_ping += 1;
                if ticks_since_ping >= 50 {
                    ticks_since_ping = 0;
                    cb(RawPumpEvent {
                        code: PumpingCode::Ping,
                        data: None,
                    });
                }

                let idx = rng.random_range(0..prices.len());
                let (symbol, digits, mid) = &mut prices[idx];
                let drift =
                    Decimal::from_f64(rng.random_range(-0.0005..0.0005)).unwrap_or_default();
                *mid += drift;
                let half_spread = Decimal::new(1, (*digits).max(1));
                let bid = *mid - half_spread;
                let ask = *mid + half_spread;
                let symbol = symbol.clone();
                let digits = *digits;

                cb(RawPumpEvent {
                    code: PumpingCode::BidAskUpdated,
                    data: Some(RawPumpData::SymbolInfo {
                        symbol: symbol.clone(),
                        digits,
                        bid,
                        ask,
                        timestamp: chrono::Utc::now().timestamp(),
                    }),
                });
            }

            cb(RawPumpEvent {
                code: PumpingCode::PumpingStopped,
                data: None,
            });
        });

        *self.thread.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    fn unregister_pump_callback(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        *self.callback.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn connect_then_register_emits_started_event() {
        let broker = MockBrokerManager::with_symbols(
            vec![SymbolInfo {
                symbol: "EURUSD".to_string(),
                digits: 5,
            }],
            Duration::from_millis(5),
        );
        broker.connect("localhost", 443).unwrap();

        let (tx, rx) = mpsc::channel();
        broker
            .register_pump_callback(Box::new(move |event| {
                let _ = tx.send(event);
            }))
            .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.code, PumpingCode::PumpingStarted);

        broker.unregister_pump_callback();
    }

    #[test]
    fn register_without_connect_fails() {
        let broker = MockBrokerManager::new();
        let result = broker.register_pump_callback(Box::new(|_| {}));
        assert_eq!(result, Err(BrokerError::NotConnected));
    }

    #[test]
    fn double_register_fails() {
        let broker = MockBrokerManager::new();
        broker.connect("localhost", 443).unwrap();
        broker.register_pump_callback(Box::new(|_| {})).unwrap();
        let result = broker.register_pump_callback(Box::new(|_| {}));
        assert_eq!(result, Err(BrokerError::AlreadyRunning));
        broker.unregister_pump_callback();
    }

    #[test]
    fn unregister_joins_thread_and_sends_stopped() {
        let broker = MockBrokerManager::with_symbols(
            vec![SymbolInfo {
                symbol: "EURUSD".to_string(),
                digits: 5,
            }],
            Duration::from_millis(5),
        );
        broker.connect("localhost", 443).unwrap();

        let (tx, rx) = mpsc::channel();
        broker
            .register_pump_callback(Box::new(move |event| {
                let _ = tx.send(event);
            }))
            .unwrap();

        broker.unregister_pump_callback();

        let events: Vec<_> = rx.try_iter().collect();
        assert!(
            events
                .iter()
                .any(|e| e.code == PumpingCode::PumpingStopped)
        );
    }

    #[test]
    fn symbol_info_looks_up_known_symbols() {
        let broker = MockBrokerManager::new();
        assert!(broker.symbol_info("EURUSD").is_some());
        assert!(broker.symbol_info("ZZZZZZ").is_none());
    }

    #[test]
    fn trade_transaction_returns_incrementing_tickets() {
        let broker = MockBrokerManager::new();
        let info = TradeTransInfo {
            login: 1,
            symbol: "EURUSD".to_string(),
            cmd: 0,
            volume_hundredths: 10,
            price: Decimal::ONE,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            ticket: 0,
            comment: String::new(),
            magic: 0,
        };
        let t1 = broker.trade_transaction(1, &info).unwrap();
        let t2 = broker.trade_transaction(1, &info).unwrap();
        assert_eq!(t2, t1 + 1);
    }
}
