//! Subscribes discovered handlers at startup and tears them down at
//! shutdown.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{discover_handlers, DiscoveryError, DiscoveryOptions, HandlerRegistration, HandlerResolver};
use crate::interfaces::{Subscriber, Subscription};
use crate::registry::BrokerRegistry;

/// Background registration of discovered handlers.
pub struct AutoRegistrationService {
    subscriber: Arc<dyn Subscriber>,
    resolver: HandlerResolver,
    options: DiscoveryOptions,
    /// `Some` between a successful `start` and the next `stop`.
    subscriptions: Mutex<Option<Vec<Arc<dyn Subscription>>>>,
}

impl AutoRegistrationService {
    pub fn new(
        subscriber: Arc<dyn Subscriber>,
        resolver: HandlerResolver,
        options: DiscoveryOptions,
    ) -> Self {
        Self {
            subscriber,
            resolver,
            options,
            subscriptions: Mutex::new(None),
        }
    }

    /// Subscribe through the registry's routing subscriber.
    pub fn for_registry(
        registry: &BrokerRegistry,
        resolver: HandlerResolver,
        options: DiscoveryOptions,
    ) -> Self {
        Self::new(registry.subscriber(), resolver, options)
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Subscriptions created by `start` and not yet released by `stop`.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.as_ref().map_or(0, Vec::len)
    }

    /// Discover, instantiate, subscribe and start every handler.
    ///
    /// Returns how many subscriptions were started. With
    /// `continue_on_error` unset, the first failure stops every
    /// subscription created by this call and is returned. Calling it again
    /// before `stop` subscribes nothing and returns the running count.
    pub async fn start(&self) -> Result<usize, DiscoveryError> {
        let mut running = self.subscriptions.lock().await;
        if let Some(subscriptions) = running.as_ref() {
            warn!(
                subscriptions = subscriptions.len(),
                "Handler auto-registration already started"
            );
            return Ok(subscriptions.len());
        }

        let registrations = discover_handlers(&self.options);
        debug!(discovered = registrations.len(), "Discovered handlers");

        let mut created: Vec<Arc<dyn Subscription>> = Vec::with_capacity(registrations.len());
        let mut failed = 0usize;

        for registration in &registrations {
            match self.register(registration).await {
                Ok(subscription) => created.push(subscription),
                Err(e) if self.options.continue_on_error => {
                    failed += 1;
                    warn!(
                        handler = %registration.handler_type(),
                        message_type = %registration.message_type(),
                        error = %e,
                        "Skipping handler that failed to register"
                    );
                }
                Err(e) => {
                    error!(
                        handler = %registration.handler_type(),
                        message_type = %registration.message_type(),
                        error = %e,
                        "Handler registration failed, aborting startup"
                    );
                    release(created).await;
                    return Err(e);
                }
            }
        }

        let started = created.len();
        *running = Some(created);

        info!(
            discovered = registrations.len(),
            started,
            failed,
            "Handler auto-registration complete"
        );
        Ok(started)
    }

    async fn register(
        &self,
        registration: &HandlerRegistration,
    ) -> Result<Arc<dyn Subscription>, DiscoveryError> {
        let handler = registration.instantiate(&self.resolver)?;
        let subscribe_error = |source| DiscoveryError::Subscribe {
            handler: registration.handler_type().to_string(),
            source,
        };

        let subscription = self
            .subscriber
            .subscribe_envelope(registration.binding(), handler, self.options.subscription.clone())
            .await
            .map_err(subscribe_error)?;

        if let Err(e) = subscription.start().await {
            release(vec![subscription]).await;
            return Err(subscribe_error(e));
        }

        debug!(
            handler = %registration.handler_type(),
            message_type = %registration.message_type(),
            kind = %registration.kind(),
            subscription_id = %subscription.id(),
            "Handler subscribed"
        );
        Ok(subscription)
    }

    /// Stop and dispose every subscription created by `start`. Failures are
    /// logged, not returned.
    pub async fn stop(&self) {
        let subscriptions = self.subscriptions.lock().await.take().unwrap_or_default();
        let count = subscriptions.len();
        release(subscriptions).await;
        info!(subscriptions = count, "Handler auto-registration stopped");
    }
}

async fn release(subscriptions: Vec<Arc<dyn Subscription>>) {
    for subscription in subscriptions {
        if let Err(e) = subscription.stop().await {
            warn!(subscription_id = %subscription.id(), error = %e, "Failed to stop subscription");
        }
        if let Err(e) = subscription.dispose().await {
            warn!(subscription_id = %subscription.id(), error = %e, "Failed to dispose subscription");
        }
    }
}
