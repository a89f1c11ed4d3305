//! End-to-end tests driving a signal from the journal file through the
//! approval state machine to an executed order against the mock broker.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use signal_engine::broker::mock::MockBrokerManager;
use signal_engine::broker::{BrokerManager, BrokerRetryPolicy};
use signal_engine::domain::{Decision, Signal, SignalKind};
use signal_engine::{ApprovalStateMachine, IngestionConfig, IngestionLoop, OrderClient};

fn make_signal(id: &str) -> Signal {
    Signal {
        signal_id: id.to_string(),
        kind: SignalKind::Buy,
        symbol: "EURUSD".to_string(),
        account_id: 12345,
        volume_lots: Some(Decimal::new(10, 2)),
        price: None,
        stop_loss: None,
        take_profit: None,
        ticket: None,
        comment: String::new(),
        magic: 0,
    }
}

async fn build_approval() -> (Arc<MockBrokerManager>, Arc<ApprovalStateMachine>) {
    let broker = Arc::new(MockBrokerManager::new());
    broker.connect("127.0.0.1", 443).await.unwrap();
    let order_client = Arc::new(OrderClient::new(
        broker.clone() as Arc<dyn BrokerManager>,
        BrokerRetryPolicy::new(3, Duration::from_millis(10)),
    ));
    let approval = Arc::new(ApprovalStateMachine::new(
        broker.clone() as Arc<dyn BrokerManager>,
        order_client,
    ));
    (broker, approval)
}

#[tokio::test]
async fn approval_to_execution_uses_latest_cached_quote() {
    let (_broker, approval) = build_approval().await;

    approval.update_quote("EURUSD", Decimal::new(11000, 4), Decimal::new(11002, 4));
    approval.enqueue(make_signal("S1")).await;
    assert_eq!(approval.pending_count(), 1);

    approval
        .verdict("S1", Decision::Approve, None)
        .await
        .expect("approval should succeed against the mock broker");

    assert_eq!(approval.pending_count(), 0);
}

#[tokio::test]
async fn reject_is_terminal_and_later_approve_is_a_noop() {
    let (_broker, approval) = build_approval().await;

    approval.enqueue(make_signal("S2")).await;
    approval.verdict("S2", Decision::Reject, None).await.unwrap();

    // A second verdict on a terminal signal must be a no-op, not an error,
    // and must not resurrect the signal into `approved`/`executed`.
    approval.verdict("S2", Decision::Approve, None).await.unwrap();
}

#[tokio::test]
async fn journal_file_touched_three_times_enqueues_once() {
    let (_broker, approval) = build_approval().await;

    let mut journal = NamedTempFile::new().unwrap();
    writeln!(
        journal,
        r#"[{{"signal_id":"S3","type":"buy","symbol":"EURUSD","login":12345,"volume":0.1}}]"#
    )
    .unwrap();
    journal.flush().unwrap();

    let cancel = CancellationToken::new();
    let config = IngestionConfig {
        journal_path: journal.path().to_path_buf(),
        debounce: Duration::from_millis(20),
        poll_interval: Duration::from_millis(50),
    };
    let loop_ = Arc::new(IngestionLoop::new(config, Arc::clone(&approval), cancel.clone()));
    let handle = tokio::spawn(loop_.run());

    // Give the watcher + debounce time to pick up the initial write, then
    // touch the same content twice more.
    tokio::time::sleep(Duration::from_millis(150)).await;
    for _ in 0..2 {
        let mut f = std::fs::OpenOptions::new().append(true).open(journal.path()).unwrap();
        writeln!(f, " ").unwrap();
        drop(f);
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    assert_eq!(approval.pending_count(), 1);

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn modify_verdict_keeps_signal_pending() {
    let (_broker, approval) = build_approval().await;
    approval.enqueue(make_signal("S4")).await;

    let overrides = signal_engine::domain::ModifyOverrides {
        volume_lots: Some(Decimal::new(20, 2)),
        stop_loss: None,
        take_profit: None,
    };
    approval
        .verdict("S4", Decision::Modify, Some(overrides))
        .await
        .unwrap();

    assert_eq!(approval.pending_count(), 1);
}
