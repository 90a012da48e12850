//! Subscriber and subscription interfaces.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use super::{EnvelopeHandler, MessageHandler, Result, TypedHandler};
use crate::message::{Message, MessageKind};

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionBinding {
    pub topic: String,
    pub message_type: String,
    pub kind: MessageKind,
}

impl SubscriptionBinding {
    /// Bind to the message type's default topic.
    pub fn of<M: Message>() -> Self {
        Self::on_topic::<M>(M::message_type())
    }

    /// Bind to a named topic.
    pub fn on_topic<M: Message>(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            message_type: M::message_type().to_string(),
            kind: M::KIND,
        }
    }
}

/// Per-subscription options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubscriptionOptions {
    /// Label used in logs.
    pub name: Option<String>,
    /// Start the subscription before returning it.
    pub auto_start: bool,
}

impl SubscriptionOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn started() -> Self {
        Self::default().with_auto_start()
    }

    pub fn with_auto_start(mut self) -> Self {
        self.auto_start = true;
        self
    }
}

/// Subscription lifecycle.
///
/// `Created → Started ⇄ Stopped → Disposed`. Only `Started` receives
/// deliveries; `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Created,
    Started,
    Stopped,
    Disposed,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionState::Created => "created",
            SubscriptionState::Started => "started",
            SubscriptionState::Stopped => "stopped",
            SubscriptionState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Broker-native subscription handle.
#[async_trait]
pub trait Subscription: Send + Sync {
    fn id(&self) -> Uuid;

    fn topic(&self) -> &str;

    fn message_type(&self) -> &str;

    fn state(&self) -> SubscriptionState;

    fn is_active(&self) -> bool {
        self.state() == SubscriptionState::Started
    }

    /// Begin receiving deliveries. Fails with `Disposed` once disposed.
    async fn start(&self) -> Result<()>;

    /// Stop receiving deliveries. Idempotent.
    async fn stop(&self) -> Result<()>;

    /// Stop, wait (bounded) for in-flight deliveries, release. Terminal.
    async fn dispose(&self) -> Result<()>;
}

/// Creates subscriptions on a broker.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Subscribe an erased handler. The returned subscription is inactive
    /// unless `options.auto_start` is set.
    async fn subscribe_envelope(
        &self,
        binding: SubscriptionBinding,
        handler: Arc<dyn EnvelopeHandler>,
        options: SubscriptionOptions,
    ) -> Result<Arc<dyn Subscription>>;
}

/// Typed subscribing for any `Subscriber`.
#[async_trait]
pub trait SubscriberExt: Subscriber {
    /// Subscribe `handler` to the default topic of `M`.
    async fn subscribe<M, H>(
        &self,
        handler: Arc<H>,
        options: SubscriptionOptions,
    ) -> Result<Arc<dyn Subscription>>
    where
        M: Message,
        H: MessageHandler<M> + 'static,
    {
        let handler = TypedHandler::<M, H>::new(handler).into_dyn();
        self.subscribe_envelope(SubscriptionBinding::of::<M>(), handler, options)
            .await
    }

    /// Subscribe `handler` to a named topic carrying `M`.
    async fn subscribe_to<M, H>(
        &self,
        topic: &str,
        handler: Arc<H>,
        options: SubscriptionOptions,
    ) -> Result<Arc<dyn Subscription>>
    where
        M: Message,
        H: MessageHandler<M> + 'static,
    {
        let handler = TypedHandler::<M, H>::new(handler).into_dyn();
        self.subscribe_envelope(SubscriptionBinding::on_topic::<M>(topic), handler, options)
            .await
    }
}

impl<S: Subscriber + ?Sized> SubscriberExt for S {}
