//! Publisher interface and typed facades.

use std::sync::Arc;

use async_trait::async_trait;

use super::{PublishReport, Result};
use crate::cancel::CancelToken;
use crate::message::{Command, Envelope, Event, Message, MessageKind};

/// Publishes sealed envelopes to a broker.
///
/// This is the object-safe half; typed publishing lives in `PublisherExt`,
/// which every `Publisher` gets for free.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish an envelope.
    ///
    /// `topic` defaults to the envelope's message type. Returns once every
    /// matching subscription has been invoked; delivery failures are
    /// reported, not returned as errors.
    async fn publish_envelope(
        &self,
        topic: Option<&str>,
        envelope: Envelope,
        cancel: &CancelToken,
    ) -> Result<PublishReport>;
}

/// Typed publishing for any `Publisher`.
#[async_trait]
pub trait PublisherExt: Publisher {
    /// Publish to the message type's default topic.
    async fn publish<M: Message>(&self, message: &M) -> Result<PublishReport> {
        let envelope = Envelope::seal(message)?;
        self.publish_envelope(None, envelope, &CancelToken::never())
            .await
    }

    /// Publish to a named topic.
    async fn publish_to<M: Message>(&self, topic: &str, message: &M) -> Result<PublishReport> {
        let envelope = Envelope::seal(message)?;
        self.publish_envelope(Some(topic), envelope, &CancelToken::never())
            .await
    }
}

impl<P: Publisher + ?Sized> PublisherExt for P {}

/// Publisher restricted to events.
#[derive(Clone)]
pub struct EventPublisher {
    publisher: Arc<dyn Publisher>,
}

impl EventPublisher {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    pub async fn publish<E: Event>(&self, event: &E) -> Result<PublishReport> {
        debug_assert_eq!(E::KIND, MessageKind::Event, "{} is not an event", E::message_type());
        self.publisher.publish(event).await
    }

    pub async fn publish_to<E: Event>(&self, topic: &str, event: &E) -> Result<PublishReport> {
        debug_assert_eq!(E::KIND, MessageKind::Event, "{} is not an event", E::message_type());
        self.publisher.publish_to(topic, event).await
    }
}

/// Publisher restricted to commands.
///
/// Commands go to a queue named after the command type unless an explicit
/// queue is given.
#[derive(Clone)]
pub struct CommandSender {
    publisher: Arc<dyn Publisher>,
}

impl CommandSender {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    pub async fn send<C: Command>(&self, command: &C) -> Result<PublishReport> {
        debug_assert_eq!(C::KIND, MessageKind::Command, "{} is not a command", C::message_type());
        self.publisher.publish(command).await
    }

    pub async fn send_to<C: Command>(&self, queue: &str, command: &C) -> Result<PublishReport> {
        debug_assert_eq!(C::KIND, MessageKind::Command, "{} is not a command", C::message_type());
        self.publisher.publish_to(queue, command).await
    }
}
