//! Application Layer
//!
//! Orchestrates the signal lifecycle: the Order Client talks to the broker,
//! the approval state machine tracks each signal from arrival to a
//! terminal status, and the ingestion loop feeds it from the advisor's
//! journal file.

/// Broker transaction execution with fixed-backoff retry.
pub mod order_client;

/// Approval state machine: pending signals, verdicts, dispatch to the
/// Order Client.
pub mod approval;

/// Filesystem journal watcher feeding the approval state machine.
pub mod ingestion;

/// Optional sink for signal lifecycle events.
pub mod event_publisher;

pub use approval::{ApprovalError, ApprovalStateMachine, is_valid_transition};
pub use event_publisher::{EventPublishError, EventPublisherPort, NoOpEventPublisher, SignalEvent};
pub use ingestion::{IngestionConfig, IngestionError, IngestionLoop};
pub use order_client::{OrderClient, OrderClientError, OrderRequest, OrderTicket};
