//! Event Publisher Port.
//!
//! Interface for publishing signal lifecycle events to external systems
//! (a metrics sink, a Slack webhook, a message bus). Optional: the approval
//! state machine runs correctly with no publisher attached.

use async_trait::async_trait;

use crate::domain::signal::SignalStatus;

/// A lifecycle transition worth publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    pub signal_id: String,
    pub status: SignalStatus,
    pub detail: Option<String>,
}

/// Event publishing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventPublishError {
    #[error("event publish connection error: {0}")]
    ConnectionError(String),
    #[error("event publish failed: {0}")]
    PublishFailed(String),
}

/// Port for publishing signal lifecycle events.
#[async_trait]
pub trait EventPublisherPort: Send + Sync {
    /// Publish one lifecycle event.
    async fn publish(&self, event: SignalEvent) -> Result<(), EventPublishError>;
}

/// No-op publisher, the default when no sink is configured.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisherPort for NoOpEventPublisher {
    async fn publish(&self, _event: SignalEvent) -> Result<(), EventPublishError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_op_publisher_always_succeeds() {
        let publisher = NoOpEventPublisher;
        let event = SignalEvent {
            signal_id: "S1".to_string(),
            status: SignalStatus::Approved,
            detail: None,
        };
        assert!(publisher.publish(event).await.is_ok());
    }
}
