//! Pumping Adapter.
//!
//! Bridges the broker's push-callback thread into the async event fabric.
//! The callback is invoked on a thread foreign to the tokio runtime (see
//! `broker::mock::MockBrokerManager`); the closure registered with
//! `BrokerManager::register_pump_callback` does only a bounded, non-blocking
//! handoff (`try_send`) into a channel an owned tokio task drains. A full
//! handoff channel means events are produced faster than this task can
//! decode them; the new event is dropped and counted rather than blocking
//! the broker's thread.
//!
//! Lifecycle: `idle -> starting -> running -> stopping -> idle`. The broker
//! must signal `PumpingStarted` within the configured startup window or
//! `start` fails and the adapter falls back to `idle`. Once running, the
//! broker's own `Ping` events double as the liveness signal watched by
//! `liveness::LivenessManager`; silence past the pong deadline is reported
//! as `PumpingError::ConnectionLost`.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerError, BrokerManager, PumpingCode, RawPumpData, RawPumpEvent};
use crate::dispatcher::SharedEventDispatcher;
use crate::domain::model::{Quote, Trade, TradeSide, TradeState};
use crate::liveness::{LivenessConfig, LivenessEvent, LivenessManager, LivenessState};

/// Lifecycle state of a [`PumpingAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpingState {
    /// Not started, or fully torn down.
    Idle,
    /// Callback registered, waiting for `PumpingStarted` within the startup
    /// window.
    Starting,
    /// Steady state: decoding and dispatching events.
    Running,
    /// Tearing down after `stop` or a detected connection loss.
    Stopping,
}

impl PumpingState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Starting => 1,
            Self::Running => 2,
            Self::Stopping => 3,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

/// Errors from adapter lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum PumpingError {
    /// `start` called while already starting or running.
    #[error("pumping adapter already starting or running")]
    AlreadyStarted,
    /// The broker rejected registration.
    #[error(transparent)]
    Broker(#[from] BrokerError),
    /// The broker never signalled `PumpingStarted` within the startup
    /// window.
    #[error("broker did not signal pumping started within the startup window")]
    StartupTimeout,
}

/// Tunables for a [`PumpingAdapter`].
#[derive(Debug, Clone)]
pub struct PumpingConfig {
    /// Capacity of the handoff channel between the broker callback and the
    /// decode task.
    pub handoff_capacity: usize,
    /// How long to wait for `PumpingStarted` before giving up.
    pub startup_window: Duration,
    /// Ping/pong liveness tuning, reusing the broker's own `Ping` events as
    /// the liveness signal.
    pub liveness: LivenessConfig,
}

impl Default for PumpingConfig {
    fn default() -> Self {
        Self {
            handoff_capacity: 4096,
            startup_window: Duration::from_secs(10),
            liveness: LivenessConfig::default(),
        }
    }
}

/// Aggregate counters for a [`PumpingAdapter`].
#[derive(Debug, Default)]
pub struct PumpingStats {
    /// Raw events accepted from the broker callback.
    pub events_received: AtomicU64,
    /// Events successfully decoded and handed to the dispatcher.
    pub events_decoded: AtomicU64,
    /// Events dropped because the handoff channel was full.
    pub events_dropped: AtomicU64,
    /// Events with a missing or malformed payload for their code.
    pub decode_errors: AtomicU64,
    /// Unix millis of the most recently accepted event, 0 if none yet.
    last_event_at_millis: AtomicI64,
    /// Unix millis `start` last brought the adapter to `Running`, 0 if never
    /// started.
    started_at_millis: AtomicI64,
}

impl PumpingStats {
    fn mark_started(&self) {
        self.started_at_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn mark_event(&self) {
        self.last_event_at_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Time of the most recently accepted event, if any have arrived yet.
    #[must_use]
    pub fn last_event_at(&self) -> Option<DateTime<Utc>> {
        let millis = self.last_event_at_millis.load(Ordering::Relaxed);
        if millis == 0 {
            return None;
        }
        DateTime::from_timestamp_millis(millis)
    }

    /// Time elapsed since the adapter was last started, if it has been
    /// started at all.
    #[must_use]
    pub fn uptime(&self) -> Option<Duration> {
        let started = self.started_at_millis.load(Ordering::Relaxed);
        if started == 0 {
            return None;
        }
        let elapsed_millis = (Utc::now().timestamp_millis() - started).max(0);
        Some(Duration::from_millis(elapsed_millis as u64))
    }
}

struct RunHandles {
    cancel: CancellationToken,
    worker: JoinHandle<()>,
    liveness: JoinHandle<()>,
}

/// Drives one broker connection's push-event stream into an
/// [`crate::dispatcher::EventDispatcher`].
pub struct PumpingAdapter {
    broker: Arc<dyn BrokerManager>,
    dispatcher: SharedEventDispatcher,
    config: PumpingConfig,
    state: AtomicU8,
    stats: Arc<PumpingStats>,
    run: AsyncMutex<Option<RunHandles>>,
}

impl PumpingAdapter {
    /// Create a new adapter over `broker`, dispatching decoded events into
    /// `dispatcher`.
    #[must_use]
    pub fn new(
        broker: Arc<dyn BrokerManager>,
        dispatcher: SharedEventDispatcher,
        config: PumpingConfig,
    ) -> Self {
        Self {
            broker,
            dispatcher,
            config,
            state: AtomicU8::new(PumpingState::Idle.as_u8()),
            stats: Arc::new(PumpingStats::default()),
            run: AsyncMutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PumpingState {
        PumpingState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<PumpingStats> {
        Arc::clone(&self.stats)
    }

    /// Register the push callback and block until the broker confirms
    /// pumping has started, or the startup window elapses.
    ///
    /// # Errors
    /// Returns [`PumpingError::AlreadyStarted`] if already running,
    /// [`PumpingError::Broker`] if registration itself fails, or
    /// [`PumpingError::StartupTimeout`] if `PumpingStarted` does not arrive
    /// in time.
    pub async fn start(&self) -> Result<(), PumpingError> {
        let mut guard = self.run.lock().await;
        if guard.is_some() {
            return Err(PumpingError::AlreadyStarted);
        }
        self.state.store(PumpingState::Starting.as_u8(), Ordering::SeqCst);

        let (handoff_tx, mut handoff_rx) =
            mpsc::channel::<RawPumpEvent>(self.config.handoff_capacity.max(1));
        let cb_stats = Arc::clone(&self.stats);

        self.broker.register_pump_callback(Box::new(move |event| {
            cb_stats.events_received.fetch_add(1, Ordering::Relaxed);
            cb_stats.mark_event();
            if handoff_tx.try_send(event).is_err() {
                cb_stats.events_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }))?;

        let started = tokio::time::timeout(self.config.startup_window, async {
            loop {
                match handoff_rx.recv().await {
                    Some(event) if event.code == PumpingCode::PumpingStarted => return true,
                    Some(_) => continue,
                    None => return false,
                }
            }
        })
        .await
        .unwrap_or(false);

        if !started {
            self.broker.unregister_pump_callback();
            self.state.store(PumpingState::Idle.as_u8(), Ordering::SeqCst);
            return Err(PumpingError::StartupTimeout);
        }

        let cancel = CancellationToken::new();
        let liveness_state = Arc::new(LivenessState::new());
        let (liveness_tx, mut liveness_rx) = mpsc::channel::<LivenessEvent>(8);
        let liveness_manager = LivenessManager::new(
            self.config.liveness,
            Arc::clone(&liveness_state),
            liveness_tx,
            cancel.clone(),
        );
        let liveness_handle = tokio::spawn(liveness_manager.run());

        let dispatcher = Arc::clone(&self.dispatcher);
        let stats = Arc::clone(&self.stats);
        let worker_cancel = cancel.clone();

        let worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = worker_cancel.cancelled() => break,
                    maybe_event = handoff_rx.recv() => {
                        match maybe_event {
                            Some(event) => {
                                Self::handle_event(event, &dispatcher, &stats, &liveness_state);
                            }
                            None => break,
                        }
                    }
                    maybe_liveness = liveness_rx.recv() => {
                        match maybe_liveness {
                            Some(LivenessEvent::SendPing) => liveness_state.mark_ping_sent(),
                            Some(LivenessEvent::Timeout) => {
                                tracing::warn!("pumping adapter lost contact with broker");
                                break;
                            }
                            None => {}
                        }
                    }
                }
            }
        });

        self.state.store(PumpingState::Running.as_u8(), Ordering::SeqCst);
        self.stats.mark_started();
        *guard = Some(RunHandles {
            cancel,
            worker,
            liveness: liveness_handle,
        });
        Ok(())
    }

    /// Stop the adapter: cancel the worker and liveness tasks, deregister
    /// the callback, and block until the broker's thread has joined.
    /// Idempotent.
    pub async fn stop(&self) {
        let mut guard = self.run.lock().await;
        if let Some(handles) = guard.take() {
            self.state
                .store(PumpingState::Stopping.as_u8(), Ordering::SeqCst);
            handles.cancel.cancel();
            self.broker.unregister_pump_callback();
            let _ = handles.worker.await;
            let _ = handles.liveness.await;
        }
        self.state.store(PumpingState::Idle.as_u8(), Ordering::SeqCst);
    }

    fn handle_event(
        event: RawPumpEvent,
        dispatcher: &SharedEventDispatcher,
        stats: &PumpingStats,
        liveness_state: &LivenessState,
    ) {
        match event.code {
            PumpingCode::Ping => liveness_state.record_pong(),
            PumpingCode::BidAskUpdated => match event.data {
                Some(RawPumpData::SymbolInfo {
                    symbol,
                    digits,
                    bid,
                    ask,
                    timestamp,
                }) => {
                    let quote = Quote::new(symbol, bid, ask, digits, timestamp, Utc::now());
                    dispatcher.dispatch_quote(quote);
                    stats.events_decoded.fetch_add(1, Ordering::Relaxed);
                }
                _ => {
                    stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                }
            },
            PumpingCode::TradesUpdated => match event.data {
                Some(RawPumpData::Trade(record)) => {
                    let trade = Trade {
                        order_id: record.order,
                        account_id: record.login,
                        symbol: record.symbol,
                        side: side_from_cmd(record.cmd),
                        volume_lots: Decimal::new(record.volume_hundredths, 2),
                        open_price: record.open_price,
                        close_price: record.close_price,
                        stop_loss: record.stop_loss,
                        take_profit: record.take_profit,
                        profit: record.profit,
                        state: TradeState::from_broker_code(record.state_code),
                        broker_timestamp: record.timestamp,
                    };
                    dispatcher.dispatch_trade(trade);
                    stats.events_decoded.fetch_add(1, Ordering::Relaxed);
                }
                _ => {
                    stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                }
            },
            PumpingCode::PumpingStopped => {
                tracing::info!("broker signalled pumping stopped");
            }
            other => {
                tracing::trace!(?other, "observed non-core pumping event");
            }
        }
    }
}

const fn side_from_cmd(cmd: i32) -> TradeSide {
    match cmd {
        0 => TradeSide::Buy,
        1 => TradeSide::Sell,
        2 => TradeSide::BuyLimit,
        3 => TradeSide::SellLimit,
        4 => TradeSide::BuyStop,
        5 => TradeSide::SellStop,
        6 => TradeSide::Balance,
        _ => TradeSide::Credit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::MockBrokerManager;
    use crate::broker::SymbolInfo;
    use crate::dispatcher::EventDispatcher;
    use std::sync::atomic::AtomicBool;

    fn dispatcher() -> SharedEventDispatcher {
        Arc::new(EventDispatcher::new(64, 100))
    }

    #[tokio::test]
    async fn start_transitions_to_running() {
        let broker = Arc::new(MockBrokerManager::with_symbols(
            vec![SymbolInfo {
                symbol: "EURUSD".to_string(),
                digits: 5,
            }],
            Duration::from_millis(5),
        ));
        broker.connect("localhost", 443).unwrap();
        let adapter = PumpingAdapter::new(
            broker,
            dispatcher(),
            PumpingConfig {
                startup_window: Duration::from_secs(2),
                ..PumpingConfig::default()
            },
        );

        adapter.start().await.unwrap();
        assert_eq!(adapter.state(), PumpingState::Running);
        adapter.stop().await;
        assert_eq!(adapter.state(), PumpingState::Idle);
    }

    #[tokio::test]
    async fn quotes_reach_the_dispatcher() {
        let broker = Arc::new(MockBrokerManager::with_symbols(
            vec![SymbolInfo {
                symbol: "EURUSD".to_string(),
                digits: 5,
            }],
            Duration::from_millis(5),
        ));
        broker.connect("localhost", 443).unwrap();
        let dispatcher = dispatcher();
        let adapter = PumpingAdapter::new(
            broker,
            Arc::clone(&dispatcher),
            PumpingConfig {
                startup_window: Duration::from_secs(2),
                ..PumpingConfig::default()
            },
        );

        adapter.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        adapter.stop().await;

        assert!(dispatcher.latest_quote("EURUSD").is_some());
        assert!(adapter.stats().events_decoded.load(Ordering::Relaxed) > 0);
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let broker = Arc::new(MockBrokerManager::with_symbols(
            vec![SymbolInfo {
                symbol: "EURUSD".to_string(),
                digits: 5,
            }],
            Duration::from_millis(5),
        ));
        broker.connect("localhost", 443).unwrap();
        let adapter = PumpingAdapter::new(
            broker,
            dispatcher(),
            PumpingConfig {
                startup_window: Duration::from_secs(2),
                ..PumpingConfig::default()
            },
        );
        adapter.start().await.unwrap();
        let result = adapter.start().await;
        assert!(matches!(result, Err(PumpingError::AlreadyStarted)));
        adapter.stop().await;
    }

    struct StallBroker {
        connected: AtomicBool,
    }

    impl BrokerManager for StallBroker {
        fn connect(&self, _host: &str, _port: u16) -> Result<(), BrokerError> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn login(&self, _login: i64, _password: &str) -> Result<(), BrokerError> {
            Ok(())
        }
        fn disconnect(&self) {}
        fn symbols_all(&self) -> Vec<SymbolInfo> {
            Vec::new()
        }
        fn symbol_info(&self, _symbol: &str) -> Option<SymbolInfo> {
            None
        }
        fn trades_all(&self) -> Vec<crate::broker::TradeRecord> {
            Vec::new()
        }
        fn trades_for(&self, _account: i64) -> Vec<crate::broker::TradeRecord> {
            Vec::new()
        }
        fn trade_transaction(
            &self,
            _account: i64,
            _info: &crate::broker::TradeTransInfo,
        ) -> Result<i64, i32> {
            Ok(1)
        }
        fn register_pump_callback(
            &self,
            _cb: Box<dyn Fn(RawPumpEvent) + Send + Sync>,
        ) -> Result<(), BrokerError> {
            // Registers successfully but never invokes the callback, simulating
            // a broker that accepted the subscription but never confirmed it.
            Ok(())
        }
        fn unregister_pump_callback(&self) {}
    }

    #[tokio::test]
    async fn startup_timeout_when_broker_never_confirms() {
        let broker = Arc::new(StallBroker {
            connected: AtomicBool::new(false),
        });
        broker.connect("localhost", 443).unwrap();
        let adapter = PumpingAdapter::new(
            broker,
            dispatcher(),
            PumpingConfig {
                startup_window: Duration::from_millis(30),
                ..PumpingConfig::default()
            },
        );

        let result = adapter.start().await;
        assert!(matches!(result, Err(PumpingError::StartupTimeout)));
        assert_eq!(adapter.state(), PumpingState::Idle);
    }
}
