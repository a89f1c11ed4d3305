//! Prometheus Metrics Module
//!
//! Exposes signal lifecycle counters via Prometheus format for monitoring.
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");
            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "signal_engine_signals_ingested_total",
        "Total journal entries successfully normalized and enqueued"
    );
    describe_counter!(
        "signal_engine_signals_malformed_total",
        "Total journal entries skipped for failing normalization"
    );
    describe_counter!(
        "signal_engine_signals_executed_total",
        "Total signals that reached the broker and were executed"
    );
    describe_counter!(
        "signal_engine_signals_failed_total",
        "Total signals that reached a terminal failed status"
    );
    describe_counter!(
        "signal_engine_signals_rejected_total",
        "Total signals terminally rejected by verdict"
    );
    describe_counter!(
        "signal_engine_order_retries_total",
        "Total retry attempts issued by the Order Client"
    );
    describe_gauge!(
        "signal_engine_pending_signals",
        "Number of signals currently awaiting a verdict"
    );
}

/// Record a successfully normalized and enqueued signal.
pub fn record_signal_ingested() {
    counter!("signal_engine_signals_ingested_total").increment(1);
}

/// Record a journal entry that failed normalization.
pub fn record_signal_malformed() {
    counter!("signal_engine_signals_malformed_total").increment(1);
}

/// Record a signal that reached the broker and executed.
pub fn record_signal_executed() {
    counter!("signal_engine_signals_executed_total").increment(1);
}

/// Record a signal that reached a terminal failed status.
pub fn record_signal_failed() {
    counter!("signal_engine_signals_failed_total").increment(1);
}

/// Record a signal terminally rejected by verdict.
pub fn record_signal_rejected() {
    counter!("signal_engine_signals_rejected_total").increment(1);
}

/// Record one retry attempt by the Order Client.
pub fn record_order_retry() {
    counter!("signal_engine_order_retries_total").increment(1);
}

/// Update the pending-signals gauge.
pub fn set_pending_signals(count: f64) {
    gauge!("signal_engine_pending_signals").set(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_absent_before_init() {
        // Other tests in the same binary may have already initialized the
        // global recorder; only assert the accessor doesn't panic.
        let _ = get_metrics_handle();
    }
}
