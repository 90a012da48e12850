//! Delivery outcomes.
//!
//! Brokers never fail a publish because a subscriber failed. Instead every
//! failed delivery is captured as a `DeliveryFailure`, returned in the
//! `PublishReport` and handed to the broker's `DeliveryObserver` if one is
//! configured.

use uuid::Uuid;

use crate::message::EnvelopeError;

/// Why a single delivery failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to decode envelope: {0}")]
    Decode(#[from] EnvelopeError),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

/// A delivery that did not complete.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub subscription_id: Uuid,
    pub topic: String,
    pub message_type: String,
    pub error: DeliveryError,
}

/// Result of publishing one envelope.
#[derive(Debug)]
pub struct PublishReport {
    /// Topic the envelope was appended to.
    pub topic: String,
    /// Id of the published message.
    pub message_id: Uuid,
    /// Deliveries whose handler completed successfully.
    pub delivered: usize,
    /// Subscriptions that were stopped between matching and delivery.
    pub skipped: usize,
    /// Deliveries that failed.
    pub failures: Vec<DeliveryFailure>,
}

impl PublishReport {
    pub fn new(topic: impl Into<String>, message_id: Uuid) -> Self {
        Self {
            topic: topic.into(),
            message_id,
            delivered: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    /// Number of subscriptions the envelope was routed to.
    pub fn attempted(&self) -> usize {
        self.delivered + self.skipped + self.failures.len()
    }

    /// True if no delivery failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Hook notified about delivery results.
pub trait DeliveryObserver: Send + Sync {
    fn on_failure(&self, failure: &DeliveryFailure);

    fn on_delivered(&self, _subscription_id: Uuid, _topic: &str) {}
}
