//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: Counts of quotes/trades decoded and dropped by the Pumping
//!   Adapter
//! - **Connections**: Connected gateway client count
//! - **Subscriptions**: Active subscription counts
//! - **Latency**: Event dispatch and decode durations
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if called more than once or if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
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

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "stream_gateway_events_received_total",
        "Total raw pump events received from the broker callback"
    );
    describe_counter!(
        "stream_gateway_events_decoded_total",
        "Total pump events decoded and dispatched, by kind"
    );
    describe_counter!(
        "stream_gateway_events_dropped_total",
        "Total pump events dropped at the broker handoff boundary"
    );
    describe_counter!(
        "stream_gateway_decode_errors_total",
        "Total pump events that failed to decode"
    );
    describe_counter!(
        "stream_gateway_stale_dropped_total",
        "Total quotes/trades dropped for being older than the cached value"
    );

    describe_gauge!(
        "stream_gateway_connected_clients",
        "Number of currently connected gateway clients"
    );
    describe_gauge!(
        "stream_gateway_subscriptions_total",
        "Total number of active client-symbol subscriptions"
    );

    describe_counter!(
        "stream_gateway_liveness_timeouts_total",
        "Total liveness timeouts observed, by side"
    );

    describe_histogram!(
        "stream_gateway_dispatch_seconds",
        "Time to decode and dispatch a pump event"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric label for the kind of event being recorded.
#[derive(Debug, Clone, Copy)]
pub enum EventKind {
    /// A quote event.
    Quote,
    /// A trade event.
    Trade,
}

impl EventKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Trade => "trade",
        }
    }
}

/// Which side of a liveness channel timed out.
#[derive(Debug, Clone, Copy)]
pub enum LivenessSide {
    /// The broker connection (Pumping Adapter) went silent.
    Broker,
    /// A gateway client connection went silent.
    Client,
}

impl LivenessSide {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::Client => "client",
        }
    }
}

/// Record a raw event handed off from the broker callback.
pub fn record_event_received() {
    counter!("stream_gateway_events_received_total").increment(1);
}

/// Record a successfully decoded and dispatched event.
pub fn record_event_decoded(kind: EventKind) {
    counter!(
        "stream_gateway_events_decoded_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record events dropped at the broker handoff boundary.
pub fn record_events_dropped(count: u64) {
    counter!("stream_gateway_events_dropped_total").increment(count);
}

/// Record an event that failed to decode.
pub fn record_decode_error() {
    counter!("stream_gateway_decode_errors_total").increment(1);
}

/// Record a quote or trade dropped for being stale.
pub fn record_stale_dropped(kind: EventKind) {
    counter!(
        "stream_gateway_stale_dropped_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Update the connected client gauge.
pub fn set_connected_clients(count: f64) {
    gauge!("stream_gateway_connected_clients").set(count);
}

/// Update the total subscription gauge.
pub fn set_subscriptions(count: f64) {
    gauge!("stream_gateway_subscriptions_total").set(count);
}

/// Record a liveness timeout.
pub fn record_liveness_timeout(side: LivenessSide) {
    counter!(
        "stream_gateway_liveness_timeouts_total",
        "side" => side.as_str()
    )
    .increment(1);
}

/// Record event dispatch duration.
pub fn record_dispatch_duration(kind: EventKind, duration: Duration) {
    histogram!(
        "stream_gateway_dispatch_seconds",
        "kind" => kind.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
