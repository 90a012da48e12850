//! Mock broker implementation for testing.
//!
//! Records traffic instead of delivering it. Used to verify routing and
//! lifecycle calls without running handlers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Broker, BrokerError, PublishReport, Result};
use crate::cancel::CancelToken;
use crate::interfaces::{
    EnvelopeHandler, Publisher, Subscriber, Subscription, SubscriptionBinding,
    SubscriptionOptions, SubscriptionState,
};
use crate::message::Envelope;

#[derive(Default)]
struct MockState {
    name: String,
    published: RwLock<Vec<(String, Envelope)>>,
    subscriptions: RwLock<Vec<SubscriptionBinding>>,
    topics: RwLock<Vec<String>>,
    fail_on_publish: AtomicBool,
    fail_on_subscribe: AtomicBool,
    connected: AtomicBool,
    connects: AtomicUsize,
    disposes: AtomicUsize,
}

/// Mock broker for testing.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<MockState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(MockState {
                name: name.into(),
                ..Default::default()
            }),
        }
    }

    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_subscribe(&self, fail: bool) {
        self.state.fail_on_subscribe.store(fail, Ordering::SeqCst);
    }

    pub async fn published_count(&self) -> usize {
        self.state.published.read().await.len()
    }

    /// Drain recorded publishes as `(topic, envelope)` pairs.
    pub async fn take_published(&self) -> Vec<(String, Envelope)> {
        std::mem::take(&mut *self.state.published.write().await)
    }

    pub async fn subscriptions(&self) -> Vec<SubscriptionBinding> {
        self.state.subscriptions.read().await.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.state.disposes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for MockBroker {
    async fn publish_envelope(
        &self,
        topic: Option<&str>,
        envelope: Envelope,
        _cancel: &CancelToken,
    ) -> Result<PublishReport> {
        if self.state.fail_on_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection("Mock publish failure".to_string()));
        }
        let topic = topic.unwrap_or(envelope.message_type()).to_string();
        let report = PublishReport::new(topic.clone(), envelope.message_id());
        self.state.published.write().await.push((topic, envelope));
        Ok(report)
    }
}

#[async_trait]
impl Subscriber for MockBroker {
    async fn subscribe_envelope(
        &self,
        binding: SubscriptionBinding,
        _handler: Arc<dyn EnvelopeHandler>,
        options: SubscriptionOptions,
    ) -> Result<Arc<dyn Subscription>> {
        if self.state.fail_on_subscribe.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection("Mock subscribe failure".to_string()));
        }
        self.state.subscriptions.write().await.push(binding.clone());

        let initial = if options.auto_start {
            SubscriptionState::Started
        } else {
            SubscriptionState::Created
        };
        Ok(Arc::new(MockSubscription {
            id: Uuid::new_v4(),
            binding,
            state: Mutex::new(initial),
        }))
    }
}

#[async_trait]
impl Broker for MockBroker {
    fn name(&self) -> &str {
        &self.state.name
    }

    async fn connect(&self) -> Result<()> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn create_topic(&self, name: &str) -> Result<()> {
        let mut topics = self.state.topics.write().await;
        if !topics.iter().any(|t| t == name) {
            topics.push(name.to_string());
        }
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        self.state.topics.write().await.retain(|t| t != name);
        Ok(())
    }

    async fn topics(&self) -> Result<Vec<String>> {
        Ok(self.state.topics.read().await.clone())
    }

    fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(self.clone())
    }

    fn subscriber(&self) -> Arc<dyn Subscriber> {
        Arc::new(self.clone())
    }

    async fn dispose(&self) -> Result<()> {
        self.state.disposes.fetch_add(1, Ordering::SeqCst);
        self.state.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Subscription returned by `MockBroker`. Tracks state only.
pub struct MockSubscription {
    id: Uuid,
    binding: SubscriptionBinding,
    state: Mutex<SubscriptionState>,
}

impl MockSubscription {
    fn transition(&self, next: SubscriptionState) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match (*state, next) {
            (SubscriptionState::Disposed, SubscriptionState::Started) => Err(BrokerError::Disposed(
                format!("Subscription '{}'", self.id),
            )),
            (SubscriptionState::Disposed, _) => Ok(()),
            _ => {
                *state = next;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Subscription for MockSubscription {
    fn id(&self) -> Uuid {
        self.id
    }

    fn topic(&self) -> &str {
        &self.binding.topic
    }

    fn message_type(&self) -> &str {
        &self.binding.message_type
    }

    fn state(&self) -> SubscriptionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn start(&self) -> Result<()> {
        self.transition(SubscriptionState::Started)
    }

    async fn stop(&self) -> Result<()> {
        self.transition(SubscriptionState::Stopped)
    }

    async fn dispose(&self) -> Result<()> {
        self.transition(SubscriptionState::Disposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::{PublisherExt, SubscriberExt};
    use crate::test_utils::{RecordingHandler, UserCreatedEvent};

    #[tokio::test]
    async fn test_mock_broker_records_publish() {
        let broker = MockBroker::new();

        broker
            .publish(&UserCreatedEvent::new("u1", "a@b.com", "A"))
            .await
            .unwrap();

        let published = broker.take_published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "UserCreatedEvent");
        assert_eq!(broker.published_count().await, 0);
    }

    #[tokio::test]
    async fn test_mock_broker_fail_on_publish() {
        let broker = MockBroker::new();
        broker.set_fail_on_publish(true);

        let result = broker
            .publish(&UserCreatedEvent::new("u1", "a@b.com", "A"))
            .await;

        assert!(matches!(result, Err(BrokerError::Connection(_))));
    }

    #[tokio::test]
    async fn test_mock_subscription_lifecycle() {
        let broker = MockBroker::new();
        let subscription = broker
            .subscribe::<UserCreatedEvent, _>(
                Arc::new(RecordingHandler::<UserCreatedEvent>::new()),
                SubscriptionOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(subscription.state(), SubscriptionState::Created);
        subscription.start().await.unwrap();
        assert!(subscription.is_active());
        subscription.dispose().await.unwrap();
        assert!(matches!(
            subscription.start().await,
            Err(BrokerError::Disposed(_))
        ));
        assert_eq!(broker.subscriptions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_broker_counts_lifecycle_calls() {
        let broker = MockBroker::named("events");
        broker.connect().await.unwrap();
        assert!(broker.is_connected());
        broker.dispose().await.unwrap();

        assert_eq!(broker.name(), "events");
        assert_eq!(broker.connect_count(), 1);
        assert_eq!(broker.dispose_count(), 1);
        assert!(!broker.is_connected());
    }
}
