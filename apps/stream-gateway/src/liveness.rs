//! Liveness Manager
//!
//! Generic ping/pong/timeout state machine shared by the pumping adapter
//! (broker connection liveness) and the streaming gateway (per-client
//! liveness). Both contexts need identical shape: send a ping on an
//! interval, expect a pong within a deadline, signal timeout otherwise.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for liveness behavior.
#[derive(Debug, Clone, Copy)]
pub struct LivenessConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Deadline for a pong response before the peer is considered dead.
    pub pong_deadline: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            pong_deadline: Duration::from_secs(10),
        }
    }
}

impl LivenessConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_deadline: Duration) -> Self {
        Self {
            ping_interval,
            pong_deadline,
        }
    }
}

/// Events emitted by the liveness manager.
#[derive(Debug, Clone)]
pub enum LivenessEvent {
    /// Request to send a ping to the peer.
    SendPing,
    /// No pong arrived within the deadline; the peer should be considered lost.
    Timeout,
}

/// State shared between a liveness manager and the connection it watches.
#[derive(Debug)]
pub struct LivenessState {
    last_pong: RwLock<Instant>,
    waiting_for_pong: AtomicBool,
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessState {
    /// Create new liveness state, as if a pong had just been observed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_pong: RwLock::new(Instant::now()),
            waiting_for_pong: AtomicBool::new(false),
        }
    }

    /// Record that a pong (or equivalent liveness signal) was received.
    pub fn record_pong(&self) {
        *self.last_pong.write() = Instant::now();
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }

    /// Mark that a ping was just sent and a pong is now expected.
    pub fn mark_ping_sent(&self) {
        self.waiting_for_pong.store(true, Ordering::SeqCst);
    }

    /// Whether a pong is currently outstanding.
    #[must_use]
    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong.load(Ordering::SeqCst)
    }

    /// Time elapsed since the last observed pong.
    #[must_use]
    pub fn time_since_pong(&self) -> Duration {
        self.last_pong.read().elapsed()
    }

    /// Reset state, e.g. for a freshly (re)established connection.
    pub fn reset(&self) {
        *self.last_pong.write() = Instant::now();
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }
}

/// Drives the ping/pong/timeout state machine for one connection.
pub struct LivenessManager {
    config: LivenessConfig,
    state: Arc<LivenessState>,
    event_tx: mpsc::Sender<LivenessEvent>,
    cancel: CancellationToken,
}

impl LivenessManager {
    /// Create a new liveness manager.
    #[must_use]
    pub const fn new(
        config: LivenessConfig,
        state: Arc<LivenessState>,
        event_tx: mpsc::Sender<LivenessEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the liveness loop until cancelled or a timeout is detected.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("liveness manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.check_and_ping().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Check liveness state and send a ping request if no timeout occurred.
    ///
    /// Returns `Err(())` once a timeout has been signalled and the loop
    /// should exit.
    async fn check_and_ping(&self) -> Result<(), ()> {
        if self.state.is_waiting_for_pong() {
            let elapsed = self.state.time_since_pong();
            if elapsed > self.config.pong_deadline {
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs(),
                    deadline_secs = self.config.pong_deadline.as_secs(),
                    "liveness timeout detected"
                );
                let _ = self.event_tx.send(LivenessEvent::Timeout).await;
                return Err(());
            }
        }

        if self.event_tx.send(LivenessEvent::SendPing).await.is_err() {
            tracing::debug!("liveness event channel closed, stopping");
            return Err(());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = LivenessConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.pong_deadline, Duration::from_secs(10));
    }

    #[test]
    fn state_initial_values() {
        let state = LivenessState::new();
        assert!(!state.is_waiting_for_pong());
        assert!(state.time_since_pong() < Duration::from_millis(100));
    }

    #[test]
    fn state_record_pong() {
        let state = LivenessState::new();
        state.mark_ping_sent();
        assert!(state.is_waiting_for_pong());

        state.record_pong();
        assert!(!state.is_waiting_for_pong());
    }

    #[test]
    fn state_reset() {
        let state = LivenessState::new();
        state.mark_ping_sent();
        assert!(state.is_waiting_for_pong());

        state.reset();
        assert!(!state.is_waiting_for_pong());
    }

    #[tokio::test]
    async fn manager_sends_ping_events() {
        let config = LivenessConfig::new(Duration::from_millis(50), Duration::from_secs(1));
        let state = Arc::new(LivenessState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let manager = LivenessManager::new(config, state.clone(), event_tx, cancel.clone());

        let handle = tokio::spawn(manager.run());

        let event = tokio::time::timeout(Duration::from_millis(200), event_rx.recv())
            .await
            .expect("should receive event")
            .expect("channel should not close");

        assert!(matches!(event, LivenessEvent::SendPing));

        cancel.cancel();
        handle.await.expect("task should complete");
    }

    #[tokio::test]
    async fn manager_detects_timeout() {
        let config = LivenessConfig::new(Duration::from_millis(50), Duration::from_millis(100));
        let state = Arc::new(LivenessState::new());
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let manager = LivenessManager::new(config, state.clone(), event_tx, cancel.clone());

        state.mark_ping_sent();
        {
            *state.last_pong.write() = Instant::now()
                .checked_sub(Duration::from_millis(200))
                .unwrap();
        }

        let handle = tokio::spawn(manager.run());

        let mut received_timeout = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(500), event_rx.recv()).await
        {
            if matches!(event, LivenessEvent::Timeout) {
                received_timeout = true;
                break;
            }
        }

        assert!(received_timeout, "should receive timeout event");

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_millis(100), handle).await;
    }

    #[tokio::test]
    async fn manager_cancellation() {
        let config = LivenessConfig::new(Duration::from_secs(10), Duration::from_secs(10));
        let state = Arc::new(LivenessState::new());
        let (event_tx, _event_rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let manager = LivenessManager::new(config, state, event_tx, cancel.clone());

        let handle = tokio::spawn(manager.run());

        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok(), "manager should shut down on cancellation");
    }
}
