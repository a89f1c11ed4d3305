//! Signal Ingestion Loop.
//!
//! Watches the advisor's journal file for new entries and hands each
//! normalized signal to the approval state machine. A filesystem watcher
//! drives the common case; a slower polling backstop covers watchers that
//! miss events (network filesystems, some container overlays). Both paths
//! funnel through the same debounce timer, mirroring the tick-driven shape
//! of `liveness::LivenessManager::run` in the streaming gateway.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::approval::ApprovalStateMachine;
use crate::domain::signal::normalize_entry;

/// Maximum number of signal ids remembered for deduplication.
const SEEN_CAP: usize = 1000;
/// Number of most-recent ids kept once the cap is hit.
const SEEN_RETAIN: usize = 500;
/// How many times to re-read and re-parse the journal after a parse
/// failure, to ride out a partial write, before counting it as malformed.
const MAX_PARSE_ATTEMPTS: u32 = 3;
/// Delay between parse retries, giving the advisor time to finish its write.
const PARSE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Errors that prevent the ingestion loop from starting at all. Once
/// running, per-entry parse failures are logged and counted, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("failed to watch journal path {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Tuning for the ingestion loop.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Path to the advisor's journal file.
    pub journal_path: PathBuf,
    /// How long to wait after a filesystem event before reading the
    /// journal, coalescing a burst of writes into one read (default 1s).
    pub debounce: Duration,
    /// Polling backstop interval, independent of filesystem notifications
    /// (default 5s).
    pub poll_interval: Duration,
}

impl IngestionConfig {
    /// Build a config with the default debounce and polling cadence.
    #[must_use]
    pub fn new(journal_path: PathBuf) -> Self {
        Self {
            journal_path,
            debounce: Duration::from_secs(1),
            poll_interval: Duration::from_secs(5),
        }
    }
}

struct SeenIds {
    set: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenIds {
    fn new() -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Record an id as seen. Returns `true` if it was newly inserted.
    fn insert(&mut self, id: String) -> bool {
        if !self.set.insert(id.clone()) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > SEEN_CAP {
            while self.order.len() > SEEN_RETAIN {
                if let Some(oldest) = self.order.pop_front() {
                    self.set.remove(&oldest);
                }
            }
        }
        true
    }

    fn contains(&self, id: &str) -> bool {
        self.set.contains(id)
    }
}

/// Watches the journal and feeds new signals to an [`ApprovalStateMachine`].
pub struct IngestionLoop {
    config: IngestionConfig,
    approval: Arc<ApprovalStateMachine>,
    cancel: CancellationToken,
    seen: Mutex<SeenIds>,
    malformed_reads: AtomicU64,
}

impl IngestionLoop {
    /// Build a new ingestion loop. Does not touch the filesystem until
    /// [`Self::run`] is called.
    #[must_use]
    pub fn new(
        config: IngestionConfig,
        approval: Arc<ApprovalStateMachine>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            approval,
            cancel,
            seen: Mutex::new(SeenIds::new()),
            malformed_reads: AtomicU64::new(0),
        }
    }

    /// Number of journal reads that failed to parse even after retries.
    #[must_use]
    pub fn malformed_reads(&self) -> u64 {
        self.malformed_reads.load(Ordering::Relaxed)
    }

    /// Run until cancelled. Installs the filesystem watcher, then drives a
    /// debounce timer and a polling backstop off the same cancellation
    /// token used by the rest of the process.
    ///
    /// # Errors
    /// Returns [`IngestionError::Watch`] if the watcher cannot be
    /// installed; once running, read/parse failures are logged, not
    /// propagated.
    pub async fn run(self: Arc<Self>) -> Result<(), IngestionError> {
        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();
        let _watcher = self.spawn_watcher(fs_tx)?;

        let dirty = Arc::new(AtomicBool::new(true));
        let mut debounce = tokio::time::interval(self.config.debounce);
        debounce.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut backstop = tokio::time::interval(self.config.poll_interval);
        backstop.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("signal ingestion loop cancelled");
                    break;
                }
                event = fs_rx.recv() => {
                    if event.is_none() {
                        tracing::warn!("journal watcher channel closed, stopping ingestion");
                        break;
                    }
                    dirty.store(true, Ordering::SeqCst);
                }
                _ = debounce.tick() => {
                    if dirty.swap(false, Ordering::SeqCst) {
                        self.process_journal().await;
                    }
                }
                _ = backstop.tick() => {
                    self.process_journal().await;
                }
            }
        }
        Ok(())
    }

    fn spawn_watcher(
        &self,
        tx: mpsc::UnboundedSender<()>,
    ) -> Result<RecommendedWatcher, IngestionError> {
        let path = self.config.journal_path.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if res.is_ok() {
                let _ = tx.send(());
            }
        })
        .map_err(|source| IngestionError::Watch {
            path: path.clone(),
            source,
        })?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|source| IngestionError::Watch {
                path: path.clone(),
                source,
            })?;
        Ok(watcher)
    }

    /// Read and process the journal, retrying the read+parse up to
    /// `MAX_PARSE_ATTEMPTS` times if the top-level JSON fails to parse —
    /// the advisor may be mid-write. Still-failing after retries counts
    /// toward `malformed_reads` rather than being treated as fatal.
    async fn process_journal(&self) {
        for attempt in 1..=MAX_PARSE_ATTEMPTS {
            let Some(raw) = self.read_journal().await else {
                return;
            };
            if self.process_contents(&raw).await {
                return;
            }
            if attempt < MAX_PARSE_ATTEMPTS {
                tokio::time::sleep(PARSE_RETRY_DELAY).await;
            }
        }
        self.malformed_reads.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            path = %self.config.journal_path.display(),
            attempts = MAX_PARSE_ATTEMPTS,
            "malformed journal contents after retries, skipping this read"
        );
    }

    async fn read_journal(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.config.journal_path).await {
            Ok(raw) => Some(raw),
            Err(err) => {
                tracing::warn!(error = %err, path = %self.config.journal_path.display(), "failed to read journal");
                None
            }
        }
    }

    /// Parse and process one read of the journal. Returns `false` if the
    /// top-level JSON could not be parsed, so the caller can retry.
    async fn process_contents(&self, raw: &str) -> bool {
        if raw.trim().is_empty() {
            return true;
        }
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "journal parse attempt failed");
                return false;
            }
        };

        let entries: Vec<serde_json::Value> = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };

        for entry in entries {
            match entry.get("signal_id").and_then(serde_json::Value::as_str) {
                Some(id) if self.seen.lock().expect("seen lock poisoned").contains(id) => {
                    continue;
                }
                _ => {}
            }
            match normalize_entry(&entry) {
                Ok(signal) => {
                    let is_new = self
                        .seen
                        .lock()
                        .expect("seen lock poisoned")
                        .insert(signal.signal_id.clone());
                    if is_new {
                        self.approval.enqueue(signal).await;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "skipping malformed journal entry");
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::MockBrokerManager;
    use crate::broker::BrokerRetryPolicy;
    use crate::application::order_client::OrderClient;

    fn loop_fixture() -> Arc<IngestionLoop> {
        loop_fixture_at(PathBuf::from("/tmp/does-not-matter.json"))
    }

    fn loop_fixture_at(journal_path: PathBuf) -> Arc<IngestionLoop> {
        let broker = Arc::new(MockBrokerManager::new());
        let order_client = Arc::new(OrderClient::new(broker.clone(), BrokerRetryPolicy::default()));
        let approval = Arc::new(ApprovalStateMachine::new(broker, order_client));
        let config = IngestionConfig::new(journal_path);
        Arc::new(IngestionLoop::new(config, approval, CancellationToken::new()))
    }

    #[tokio::test]
    async fn processes_single_object_journal() {
        let il = loop_fixture();
        il.process_contents(
            r#"{"signal_id":"A1","type":"buy","symbol":"EURUSD","login":1,"volume":0.1}"#,
        )
        .await;
        assert_eq!(il.approval.pending_count(), 1);
    }

    #[tokio::test]
    async fn processes_array_journal_and_dedupes_repeats() {
        let il = loop_fixture();
        let raw = r#"[
            {"signal_id":"A2","type":"buy","symbol":"EURUSD","login":1,"volume":0.1},
            {"signal_id":"A3","type":"sell","symbol":"GBPUSD","login":1,"volume":0.2}
        ]"#;
        il.process_contents(raw).await;
        assert_eq!(il.approval.pending_count(), 2);

        // Re-processing the same contents must not enqueue duplicates.
        il.process_contents(raw).await;
        assert_eq!(il.approval.pending_count(), 2);
    }

    #[tokio::test]
    async fn malformed_entry_is_skipped_not_fatal() {
        let il = loop_fixture();
        il.process_contents(r#"{"type":"buy","symbol":"EURUSD"}"#).await;
        assert_eq!(il.approval.pending_count(), 0);
    }

    #[tokio::test]
    async fn malformed_json_does_not_panic() {
        let il = loop_fixture();
        il.process_contents("{not json").await;
        assert_eq!(il.approval.pending_count(), 0);
    }

    #[tokio::test]
    async fn empty_journal_is_a_noop() {
        let il = loop_fixture();
        il.process_contents("").await;
        assert_eq!(il.approval.pending_count(), 0);
    }

    #[tokio::test]
    async fn persistently_malformed_journal_is_counted() {
        let path = PathBuf::from("/tmp/signal-engine-ingestion-test-malformed.json");
        let il = loop_fixture_at(path.clone());
        tokio::fs::write(&path, "{not json").await.unwrap();
        il.process_journal().await;
        assert_eq!(il.malformed_reads(), 1);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[test]
    fn seen_ids_evicts_oldest_past_cap() {
        let mut seen = SeenIds::new();
        for i in 0..SEEN_CAP + 10 {
            seen.insert(format!("id-{i}"));
        }
        assert!(seen.order.len() <= SEEN_CAP);
        assert!(seen.contains(&format!("id-{}", SEEN_CAP + 9)));
        assert!(!seen.contains("id-0"));
    }
}
