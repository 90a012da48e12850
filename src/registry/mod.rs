//! Broker registry.
//!
//! Holds one broker per message category and routes publishes and
//! subscriptions to it. The same broker may serve several categories.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerError, PublishReport, Result};
use crate::cancel::CancelToken;
use crate::interfaces::{
    CommandSender, EnvelopeHandler, EventPublisher, Publisher, Subscriber, Subscription,
    SubscriptionBinding, SubscriptionOptions,
};
use crate::message::{Envelope, MessageKind};

/// Brokers keyed by message category.
#[derive(Clone, Default)]
pub struct BrokerRegistry {
    event: Option<Arc<dyn Broker>>,
    command: Option<Arc<dyn Broker>>,
    message: Option<Arc<dyn Broker>>,
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_broker(self, broker: Arc<dyn Broker>) -> Self {
        self.register(MessageKind::Event, broker)
    }

    pub fn with_command_broker(self, broker: Arc<dyn Broker>) -> Self {
        self.register(MessageKind::Command, broker)
    }

    pub fn with_message_broker(self, broker: Arc<dyn Broker>) -> Self {
        self.register(MessageKind::Message, broker)
    }

    /// Set the broker for `kind`, replacing any previous one.
    pub fn register(mut self, kind: MessageKind, broker: Arc<dyn Broker>) -> Self {
        debug!(kind = %kind, broker = %broker.name(), "Broker registered");
        *self.slot_mut(kind) = Some(broker);
        self
    }

    fn slot(&self, kind: MessageKind) -> &Option<Arc<dyn Broker>> {
        match kind {
            MessageKind::Event => &self.event,
            MessageKind::Command => &self.command,
            MessageKind::Message => &self.message,
        }
    }

    fn slot_mut(&mut self, kind: MessageKind) -> &mut Option<Arc<dyn Broker>> {
        match kind {
            MessageKind::Event => &mut self.event,
            MessageKind::Command => &mut self.command,
            MessageKind::Message => &mut self.message,
        }
    }

    /// Broker serving `kind`.
    pub fn broker(&self, kind: MessageKind) -> Result<Arc<dyn Broker>> {
        self.slot(kind)
            .as_ref()
            .map(Arc::clone)
            .ok_or(BrokerError::NotConfigured(kind))
    }

    pub fn is_configured(&self, kind: MessageKind) -> bool {
        self.slot(kind).is_some()
    }

    pub fn configured_kinds(&self) -> Vec<MessageKind> {
        MessageKind::ALL
            .into_iter()
            .filter(|kind| self.is_configured(*kind))
            .collect()
    }

    /// Publisher that routes each envelope by its category.
    pub fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(RoutingPublisher {
            registry: self.clone(),
        })
    }

    /// Subscriber that routes each binding by its category.
    pub fn subscriber(&self) -> Arc<dyn Subscriber> {
        Arc::new(RoutingSubscriber {
            registry: self.clone(),
        })
    }

    pub fn event_publisher(&self) -> EventPublisher {
        EventPublisher::new(self.publisher())
    }

    pub fn command_sender(&self) -> CommandSender {
        CommandSender::new(self.publisher())
    }

    /// Configured brokers, each listed once even if it serves several
    /// categories.
    pub fn distinct_brokers(&self) -> Vec<Arc<dyn Broker>> {
        let mut brokers: Vec<Arc<dyn Broker>> = Vec::new();
        for broker in [&self.event, &self.command, &self.message]
            .into_iter()
            .flatten()
        {
            if !brokers.iter().any(|b| Arc::ptr_eq(b, broker)) {
                brokers.push(Arc::clone(broker));
            }
        }
        brokers
    }

    pub async fn connect_all(&self) -> Result<()> {
        for broker in self.distinct_brokers() {
            broker.connect().await?;
            info!(broker = %broker.name(), "Broker connected");
        }
        Ok(())
    }

    pub async fn disconnect_all(&self) -> Result<()> {
        for broker in self.distinct_brokers() {
            broker.disconnect().await?;
        }
        Ok(())
    }

    /// Dispose every broker. Keeps going past failures and returns the
    /// first one.
    pub async fn dispose_all(&self) -> Result<()> {
        let mut first_error = None;
        for broker in self.distinct_brokers() {
            if let Err(e) = broker.dispose().await {
                warn!(broker = %broker.name(), error = %e, "Failed to dispose broker");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Publisher facade over a `BrokerRegistry`.
pub struct RoutingPublisher {
    registry: BrokerRegistry,
}

#[async_trait]
impl Publisher for RoutingPublisher {
    async fn publish_envelope(
        &self,
        topic: Option<&str>,
        envelope: Envelope,
        cancel: &CancelToken,
    ) -> Result<PublishReport> {
        let broker = self.registry.broker(envelope.kind())?;
        broker
            .publisher()
            .publish_envelope(topic, envelope, cancel)
            .await
    }
}

/// Subscriber facade over a `BrokerRegistry`.
pub struct RoutingSubscriber {
    registry: BrokerRegistry,
}

#[async_trait]
impl Subscriber for RoutingSubscriber {
    async fn subscribe_envelope(
        &self,
        binding: SubscriptionBinding,
        handler: Arc<dyn EnvelopeHandler>,
        options: SubscriptionOptions,
    ) -> Result<Arc<dyn Subscription>> {
        let broker = self.registry.broker(binding.kind)?;
        broker
            .subscriber()
            .subscribe_envelope(binding, handler, options)
            .await
    }
}
