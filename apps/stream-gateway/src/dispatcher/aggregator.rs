//! Per-subscriber quote rate limiter.
//!
//! Wraps a subscriber's mailbox so that no more than `R` quote updates per
//! second are admitted *per symbol*. Excess updates within a window are
//! coalesced: only the most recent pending value per symbol survives, to be
//! emitted at the next admission tick. Symbols are never reordered relative
//! to each other, and the final value of a burst is never dropped — it sits
//! in `pending` until the next tick admits it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::model::{Quote, Symbol};

use super::mailbox::MailboxSender;
use super::DispatchEvent;

/// Rate-limits quote delivery to a downstream mailbox.
pub struct QuoteAggregator {
    downstream: MailboxSender<DispatchEvent>,
    pending: Arc<Mutex<HashMap<Symbol, Quote>>>,
    admit_interval: Duration,
}

impl QuoteAggregator {
    /// Create an aggregator admitting at most `max_per_second` updates per
    /// symbol, forwarding admitted quotes into `downstream`.
    #[must_use]
    pub fn new(max_per_second: u32, downstream: MailboxSender<DispatchEvent>) -> Self {
        let per_second = max_per_second.max(1);
        Self {
            downstream,
            pending: Arc::new(Mutex::new(HashMap::new())),
            admit_interval: Duration::from_secs_f64(1.0 / f64::from(per_second)),
        }
    }

    /// Offer a quote update. It is coalesced with any not-yet-admitted
    /// pending value for the same symbol.
    pub fn offer(&self, quote: Quote) {
        self.pending.lock().insert(quote.symbol.clone(), quote);
    }

    /// Spawn the admission loop. Runs until `cancel` fires, then performs
    /// one final flush so the last value of an in-flight burst is never
    /// lost.
    pub fn spawn_admitter(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let pending = Arc::clone(&self.pending);
        let downstream = self.downstream.clone();
        let interval_duration = self.admit_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_duration);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        Self::flush(&pending, &downstream);
                        break;
                    }
                    _ = interval.tick() => {
                        Self::flush(&pending, &downstream);
                    }
                }
            }
        })
    }

    fn flush(pending: &Mutex<HashMap<Symbol, Quote>>, downstream: &MailboxSender<DispatchEvent>) {
        let drained: Vec<Quote> = {
            let mut guard = pending.lock();
            guard.drain().map(|(_, q)| q).collect()
        };
        for quote in drained {
            downstream.deliver(DispatchEvent::Quote(quote));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::mailbox::mailbox;
    use rust_decimal::Decimal;

    fn sample_quote(symbol: &str) -> Quote {
        Quote::new(
            symbol.to_string(),
            Decimal::ONE,
            Decimal::from(2),
            5,
            1_700_000_000,
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn coalesces_burst_to_final_value() {
        let (tx, mut rx) = mailbox::<DispatchEvent>(16);
        let aggregator = QuoteAggregator::new(1000, tx);
        let cancel = CancellationToken::new();
        let handle = aggregator.spawn_admitter(cancel.clone());

        for i in 0..5 {
            let mut q = sample_quote("EURUSD");
            q.broker_timestamp += i;
            aggregator.offer(q);
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap();

        let mut last = None;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), rx.recv()).await
        {
            last = Some(event);
        }
        match last {
            Some(DispatchEvent::Quote(q)) => assert_eq!(q.broker_timestamp, 1_700_000_004),
            other => panic!("expected a quote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn distinct_symbols_both_survive() {
        let (tx, mut rx) = mailbox::<DispatchEvent>(16);
        let aggregator = QuoteAggregator::new(1000, tx);
        let cancel = CancellationToken::new();
        let handle = aggregator.spawn_admitter(cancel.clone());

        aggregator.offer(sample_quote("EURUSD"));
        aggregator.offer(sample_quote("GBPUSD"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap();

        let mut symbols = Vec::new();
        while let Ok(Some(DispatchEvent::Quote(q))) =
            tokio::time::timeout(Duration::from_millis(50), rx.recv()).await
        {
            symbols.push(q.symbol);
        }
        symbols.sort();
        assert_eq!(symbols, vec!["EURUSD".to_string(), "GBPUSD".to_string()]);
    }
}
