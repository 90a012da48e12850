//! Broker interface.
//!
//! A broker is the transport/storage backend behind publishers and
//! subscribers. Plugin crates implement this trait for real message
//! systems; this crate ships the in-memory broker.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CommandSender, EventPublisher, Publisher, Subscriber};
use crate::message::MessageKind;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur during broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("No {0} broker configured")]
    NotConfigured(MessageKind),

    #[error("{0} has been disposed")]
    Disposed(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Unsupported broker type: {0}")]
    UnsupportedBroker(String),
}

/// Interface for a message broker.
///
/// Implementations:
/// - `InMemoryBroker`: single-process broker for tests and demos
/// - `MockBroker`: records traffic for routing tests
#[async_trait]
pub trait Broker: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Create a topic. Idempotent.
    async fn create_topic(&self, name: &str) -> Result<()>;

    /// Delete a topic. Idempotent.
    async fn delete_topic(&self, name: &str) -> Result<()>;

    /// Names of the existing topics.
    async fn topics(&self) -> Result<Vec<String>>;

    fn publisher(&self) -> Arc<dyn Publisher>;

    fn subscriber(&self) -> Arc<dyn Subscriber>;

    fn event_publisher(&self) -> EventPublisher {
        EventPublisher::new(self.publisher())
    }

    fn command_sender(&self) -> CommandSender {
        CommandSender::new(self.publisher())
    }

    /// Tear down all subscriptions and state. Further operations fail with
    /// `BrokerError::Disposed`.
    async fn dispose(&self) -> Result<()>;
}
