//! In-memory subscription lifecycle.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::BrokerState;
use crate::broker::{BrokerError, Result};
use crate::cancel::CancelToken;
use crate::interfaces::{
    DeliveryError, EnvelopeHandler, Subscription, SubscriptionBinding, SubscriptionOptions,
    SubscriptionState,
};

/// Result of one delivery attempt.
#[derive(Debug)]
pub(super) enum DeliveryOutcome {
    Delivered,
    /// The subscription left `Started` before the handler ran.
    Skipped,
    Failed(DeliveryError),
}

/// Subscription state shared between the broker and the handle returned
/// to the caller.
pub(super) struct SubscriptionCore {
    id: Uuid,
    binding: SubscriptionBinding,
    options: SubscriptionOptions,
    handler: Arc<dyn EnvelopeHandler>,
    state: RwLock<SubscriptionState>,
    /// Held shared by each running delivery; dispose takes it exclusively.
    in_flight: tokio::sync::RwLock<()>,
    broker: Weak<BrokerState>,
    drain_timeout: Duration,
}

impl SubscriptionCore {
    pub(super) fn new(
        binding: SubscriptionBinding,
        handler: Arc<dyn EnvelopeHandler>,
        options: SubscriptionOptions,
        broker: Weak<BrokerState>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            binding,
            options,
            handler,
            state: RwLock::new(SubscriptionState::Created),
            in_flight: tokio::sync::RwLock::new(()),
            broker,
            drain_timeout,
        }
    }

    pub(super) fn id(&self) -> Uuid {
        self.id
    }

    pub(super) fn binding(&self) -> &SubscriptionBinding {
        &self.binding
    }

    /// Name for logs: the configured name, else `type@topic`.
    pub(super) fn label(&self) -> String {
        match &self.options.name {
            Some(name) => name.clone(),
            None => format!("{}@{}", self.binding.message_type, self.binding.topic),
        }
    }

    pub(super) fn state(&self) -> SubscriptionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, SubscriptionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn disposed_error(&self) -> BrokerError {
        BrokerError::Disposed(format!("Subscription '{}'", self.label()))
    }

    /// Holds the state lock across the broker call; `Disposed` is final.
    pub(super) fn activate(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state_mut();
        match *state {
            SubscriptionState::Disposed => return Err(self.disposed_error()),
            SubscriptionState::Started => return Ok(()),
            SubscriptionState::Created | SubscriptionState::Stopped => {}
        }

        let broker = self.broker.upgrade().ok_or_else(|| self.disposed_error())?;
        broker.activate(self)?;
        *state = SubscriptionState::Started;
        drop(state);

        debug!(subscription = %self.label(), subscription_id = %self.id, "Subscription started");
        Ok(())
    }

    pub(super) fn deactivate(&self) {
        let mut state = self.state_mut();
        let previous = *state;
        if previous == SubscriptionState::Disposed {
            return;
        }
        *state = SubscriptionState::Stopped;
        if let Some(broker) = self.broker.upgrade() {
            broker.deactivate(self.id);
        }
        drop(state);

        if previous == SubscriptionState::Started {
            debug!(subscription = %self.label(), subscription_id = %self.id, "Subscription stopped");
        }
    }

    /// Stop, wait up to the drain timeout for running deliveries, then
    /// detach from the broker.
    pub(super) async fn dispose(&self) {
        let broker = {
            let mut state = self.state_mut();
            if std::mem::replace(&mut *state, SubscriptionState::Disposed)
                == SubscriptionState::Disposed
            {
                return;
            }
            let broker = self.broker.upgrade();
            if let Some(broker) = &broker {
                broker.deactivate(self.id);
            }
            broker
        };

        if tokio::time::timeout(self.drain_timeout, self.in_flight.write())
            .await
            .is_err()
        {
            warn!(
                subscription = %self.label(),
                subscription_id = %self.id,
                timeout_ms = self.drain_timeout.as_millis() as u64,
                "Timed out waiting for in-flight deliveries, disposing anyway"
            );
        }

        if let Some(broker) = &broker {
            broker.forget(self.id);
        }

        debug!(subscription = %self.label(), subscription_id = %self.id, "Subscription disposed");
    }

    /// Run the handler for one encoded envelope.
    pub(super) async fn deliver(&self, payload: Arc<[u8]>, cancel: CancelToken) -> DeliveryOutcome {
        let _in_flight = self.in_flight.read().await;

        if self.state() != SubscriptionState::Started {
            return DeliveryOutcome::Skipped;
        }

        match self.handler.deliver(payload, cancel).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(error) => DeliveryOutcome::Failed(error),
        }
    }
}

/// Handle to a subscription on an `InMemoryBroker`.
#[derive(Clone)]
pub struct InMemorySubscription {
    core: Arc<SubscriptionCore>,
}

impl InMemorySubscription {
    pub(super) fn new(core: Arc<SubscriptionCore>) -> Self {
        Self { core }
    }

    /// Label used in logs.
    pub fn label(&self) -> String {
        self.core.label()
    }
}

#[async_trait]
impl Subscription for InMemorySubscription {
    fn id(&self) -> Uuid {
        self.core.id()
    }

    fn topic(&self) -> &str {
        &self.core.binding().topic
    }

    fn message_type(&self) -> &str {
        &self.core.binding().message_type
    }

    fn state(&self) -> SubscriptionState {
        self.core.state()
    }

    async fn start(&self) -> Result<()> {
        self.core.activate()
    }

    async fn stop(&self) -> Result<()> {
        self.core.deactivate();
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        self.core.dispose().await;
        Ok(())
    }
}
