//! In-memory broker for tests and local development.
//!
//! Topics are append-only queues of encoded envelopes held in a `DashMap`.
//! Publishing appends to the topic's queue, then spawns one delivery per
//! active subscription bound to that topic and waits for all of them.
//! Nothing is persisted and messages are never replayed to subscriptions
//! created later.

mod subscription;

pub use subscription::InMemorySubscription;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    Broker, BrokerError, DeliveryFailure, DeliveryObserver, InMemoryConfig, PublishReport, Result,
};
use crate::cancel::CancelToken;
use crate::interfaces::{
    DeliveryError, EnvelopeHandler, Publisher, Subscriber, Subscription, SubscriptionBinding,
    SubscriptionOptions,
};
use crate::message::Envelope;
use subscription::{DeliveryOutcome, SubscriptionCore};

/// Queue of encoded envelopes for one topic.
type TopicQueue = Arc<RwLock<Vec<Arc<[u8]>>>>;

/// Shared state behind every handle to one broker.
struct BrokerState {
    name: String,
    config: InMemoryConfig,
    topics: DashMap<String, TopicQueue>,
    /// Every subscription not yet disposed.
    subscriptions: DashMap<Uuid, Arc<SubscriptionCore>>,
    /// Started subscriptions.
    active: DashMap<Uuid, Arc<SubscriptionCore>>,
    observer: OnceLock<Arc<dyn DeliveryObserver>>,
    connected: AtomicBool,
    disposed: AtomicBool,
}

impl BrokerState {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(self.disposed_error());
        }
        Ok(())
    }

    fn disposed_error(&self) -> BrokerError {
        BrokerError::Disposed(format!("Broker '{}'", self.name))
    }

    fn queue(&self, topic: &str) -> TopicQueue {
        Arc::clone(self.topics.entry(topic.to_string()).or_default().value())
    }

    fn activate(&self, subscription: &Arc<SubscriptionCore>) -> Result<()> {
        self.ensure_live()?;
        self.active
            .insert(subscription.id(), Arc::clone(subscription));
        Ok(())
    }

    fn deactivate(&self, id: Uuid) {
        self.active.remove(&id);
    }

    fn forget(&self, id: Uuid) {
        self.active.remove(&id);
        self.subscriptions.remove(&id);
    }

    fn record(&self, report: &mut PublishReport, core: &SubscriptionCore, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => {
                report.delivered += 1;
                if let Some(observer) = self.observer.get() {
                    observer.on_delivered(core.id(), &report.topic);
                }
            }
            DeliveryOutcome::Skipped => {
                report.skipped += 1;
            }
            DeliveryOutcome::Failed(error) => {
                warn!(
                    broker = %self.name,
                    topic = %report.topic,
                    subscription = %core.label(),
                    subscription_id = %core.id(),
                    error = %error,
                    "Delivery failed"
                );
                let failure = DeliveryFailure {
                    subscription_id: core.id(),
                    topic: report.topic.clone(),
                    message_type: core.binding().message_type.clone(),
                    error,
                };
                if let Some(observer) = self.observer.get() {
                    observer.on_failure(&failure);
                }
                report.failures.push(failure);
            }
        }
    }
}

/// In-memory broker.
///
/// Cloning is cheap and every clone shares the same topics and
/// subscriptions. Two separately constructed brokers never share state,
/// even for equal topic names.
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    /// Create a broker named "memory" with default configuration.
    pub fn new() -> Self {
        Self::from_config("memory", InMemoryConfig::default())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::from_config(name, InMemoryConfig::default())
    }

    pub fn from_config(name: impl Into<String>, config: InMemoryConfig) -> Self {
        let name = name.into();
        debug!(broker = %name, "In-memory broker created");

        Self {
            state: Arc::new(BrokerState {
                name,
                config,
                topics: DashMap::new(),
                subscriptions: DashMap::new(),
                active: DashMap::new(),
                observer: OnceLock::new(),
                connected: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Report delivery results to `observer`. Only the first observer set
    /// on a broker takes effect.
    pub fn with_delivery_observer(self, observer: Arc<dyn DeliveryObserver>) -> Self {
        if self.state.observer.set(observer).is_err() {
            warn!(broker = %self.state.name, "Delivery observer already set, ignoring");
        }
        self
    }

    /// Envelopes currently queued on `topic`, oldest first.
    pub async fn messages(&self, topic: &str) -> Result<Vec<Envelope>> {
        self.state.ensure_live()?;
        let Some(queue) = self.state.topics.get(topic).map(|q| Arc::clone(q.value())) else {
            return Ok(Vec::new());
        };
        let queue = queue.read().await;
        queue
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(BrokerError::from))
            .collect()
    }

    /// Subscriptions created and not yet disposed.
    pub fn subscription_count(&self) -> usize {
        self.state.subscriptions.len()
    }

    /// Subscriptions currently started.
    pub fn active_subscription_count(&self) -> usize {
        self.state.active.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    #[tracing::instrument(
        name = "broker.publish",
        skip_all,
        fields(broker = %self.state.name, message_type = %envelope.message_type())
    )]
    async fn publish_envelope(
        &self,
        topic: Option<&str>,
        envelope: Envelope,
        cancel: &CancelToken,
    ) -> Result<PublishReport> {
        let state = &self.state;
        state.ensure_live()?;
        if cancel.is_cancelled() {
            return Err(BrokerError::Cancelled);
        }

        let topic = topic.unwrap_or(envelope.message_type()).to_string();
        let payload: Arc<[u8]> = envelope.encode()?.into();

        // A concurrent delete_topic may leave us appending to a detached queue.
        let queue = state.queue(&topic);
        queue.write().await.push(Arc::clone(&payload));

        let targets: Vec<Arc<SubscriptionCore>> = state
            .active
            .iter()
            .filter(|entry| entry.value().binding().topic == topic)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut report = PublishReport::new(topic, envelope.message_id());

        if targets.is_empty() {
            debug!(topic = %report.topic, "Published envelope (no subscribers)");
            return Ok(report);
        }

        let deliveries = targets.iter().map(|core| {
            let core = Arc::clone(core);
            let payload = Arc::clone(&payload);
            let cancel = cancel.clone();
            tokio::spawn(async move { core.deliver(payload, cancel).await })
        });
        let results = join_all(deliveries).await;

        for (core, result) in targets.iter().zip(results) {
            let outcome = result.unwrap_or_else(|e| {
                DeliveryOutcome::Failed(DeliveryError::Panicked(panic_message(e)))
            });
            state.record(&mut report, core, outcome);
        }

        debug!(
            topic = %report.topic,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Published envelope"
        );

        Ok(report)
    }
}

#[async_trait]
impl Subscriber for InMemoryBroker {
    async fn subscribe_envelope(
        &self,
        binding: SubscriptionBinding,
        handler: Arc<dyn EnvelopeHandler>,
        options: SubscriptionOptions,
    ) -> Result<Arc<dyn Subscription>> {
        self.state.ensure_live()?;

        let auto_start = options.auto_start;
        let core = Arc::new(SubscriptionCore::new(
            binding,
            handler,
            options,
            Arc::downgrade(&self.state),
            self.state.config.dispose_timeout(),
        ));
        self.state
            .subscriptions
            .insert(core.id(), Arc::clone(&core));

        debug!(
            broker = %self.state.name,
            topic = %core.binding().topic,
            message_type = %core.binding().message_type,
            subscription_id = %core.id(),
            "Subscription created"
        );

        let subscription = InMemorySubscription::new(core);
        if auto_start {
            subscription.start().await?;
        }

        Ok(Arc::new(subscription))
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    fn name(&self) -> &str {
        &self.state.name
    }

    async fn connect(&self) -> Result<()> {
        self.state.ensure_live()?;
        self.state.connected.store(true, Ordering::SeqCst);
        info!(broker = %self.state.name, "In-memory broker connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.ensure_live()?;
        self.state.connected.store(false, Ordering::SeqCst);
        info!(broker = %self.state.name, "In-memory broker disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    async fn create_topic(&self, name: &str) -> Result<()> {
        self.state.ensure_live()?;
        self.state.topics.entry(name.to_string()).or_default();
        debug!(broker = %self.state.name, topic = %name, "Topic created");
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        self.state.ensure_live()?;
        if self.state.topics.remove(name).is_some() {
            debug!(broker = %self.state.name, topic = %name, "Topic deleted");
        }
        Ok(())
    }

    async fn topics(&self) -> Result<Vec<String>> {
        self.state.ensure_live()?;
        let mut names: Vec<String> = self
            .state
            .topics
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn publisher(&self) -> Arc<dyn Publisher> {
        Arc::new(self.clone())
    }

    fn subscriber(&self) -> Arc<dyn Subscriber> {
        Arc::new(self.clone())
    }

    async fn dispose(&self) -> Result<()> {
        let state = &self.state;
        if state.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Collect first: disposing removes entries from the same map.
        let outstanding: Vec<Arc<SubscriptionCore>> = state
            .subscriptions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        // Drained together so teardown waits at most one drain timeout.
        join_all(outstanding.iter().map(|core| core.dispose())).await;

        state.active.clear();
        state.subscriptions.clear();
        state.topics.clear();
        state.connected.store(false, Ordering::SeqCst);

        info!(
            broker = %state.name,
            subscriptions = outstanding.len(),
            "In-memory broker disposed"
        );
        Ok(())
    }
}

/// Extract a readable message from a panicked delivery task.
fn panic_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "delivery task cancelled".to_string();
    }
    match error.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(_) => "delivery task failed".to_string(),
    }
}
