//! Bounded per-subscriber mailbox with drop-oldest overflow.
//!
//! A slow subscriber must never block delivery to others. Each subscriber
//! gets its own bounded queue; when full, the oldest pending value is
//! evicted to make room for the new one, and a `lagged` counter is
//! incremented. This is deliberately not `tokio::sync::mpsc` (whose
//! `send`/`try_send` either blocks or rejects the new value) nor
//! `tokio::sync::broadcast` (whose lag semantics report a count of missed
//! messages to the *receiver* rather than letting the sender evict a
//! specific slot) — the drop-oldest contract is implemented directly over a
//! deque guarded by a short lock, with a `Notify` waking the one waiting
//! receiver.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// The sending half of a bounded mailbox. Cheaply cloneable; all clones
/// share the same underlying queue and counters.
#[derive(Clone)]
pub struct MailboxSender<T> {
    inner: Arc<Inner<T>>,
}

/// The receiving half of a bounded mailbox. Not cloneable: exactly one task
/// drains a given mailbox.
pub struct MailboxReceiver<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    lagged: AtomicU64,
    closed: std::sync::atomic::AtomicBool,
}

/// Create a bounded mailbox of the given capacity.
#[must_use]
pub fn mailbox<T>(capacity: usize) -> (MailboxSender<T>, MailboxReceiver<T>) {
    let inner = Arc::new(Inner {
        queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        capacity: capacity.max(1),
        notify: Notify::new(),
        lagged: AtomicU64::new(0),
        closed: std::sync::atomic::AtomicBool::new(false),
    });
    (
        MailboxSender {
            inner: Arc::clone(&inner),
        },
        MailboxReceiver { inner },
    )
}

impl<T> MailboxSender<T> {
    /// Push a value, evicting the oldest pending value if the mailbox is at
    /// capacity. Returns `true` if an eviction occurred.
    pub fn deliver(&self, value: T) -> bool {
        let mut evicted = false;
        {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.capacity {
                queue.pop_front();
                self.inner.lagged.fetch_add(1, Ordering::Relaxed);
                evicted = true;
            }
            queue.push_back(value);
        }
        self.inner.notify.notify_one();
        evicted
    }

    /// Number of values dropped for this subscriber due to overflow.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.inner.lagged.load(Ordering::Relaxed)
    }

    /// Mark the mailbox closed; a waiting receiver's `recv` returns `None`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }
}

impl<T> MailboxReceiver<T> {
    /// Await the next value, or `None` once the mailbox is closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut queue = self.inner.queue.lock();
                if let Some(value) = queue.pop_front() {
                    return Some(value);
                }
                if self.inner.closed.load(Ordering::SeqCst) {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }

    /// Number of values dropped for this subscriber due to overflow.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.inner.lagged.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let (tx, mut rx) = mailbox::<u32>(4);
        tx.deliver(1);
        tx.deliver(2);
        tx.deliver(3);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_increments_lagged() {
        let (tx, mut rx) = mailbox::<u32>(2);
        tx.deliver(1);
        tx.deliver(2);
        let evicted = tx.deliver(3);
        assert!(evicted);
        assert_eq!(tx.lagged(), 1);
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn close_ends_recv_after_drain() {
        let (tx, mut rx) = mailbox::<u32>(4);
        tx.deliver(1);
        tx.close();
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }
}
