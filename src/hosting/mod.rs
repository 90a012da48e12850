//! Hosting integration.
//!
//! `MessagingBuilder` collects broker factories per category, handler
//! discovery options and handler instances, and builds a `MessagingHost`
//! that owns the registry and the auto-registration service.
//!
//! # Example
//!
//! ```ignore
//! let host = MessagingBuilder::new()
//!     .with_event_broker(InMemoryBroker::new)
//!     .with_command_broker(InMemoryBroker::new)
//!     .with_handler_discovery(DiscoveryOptions::new().with_module("app::handlers"))
//!     .with_handler_instance(Arc::new(InvoiceWriter::new(db)))
//!     .build()
//!     .await?;
//!
//! host.start().await?;
//! host.event_publisher().publish(&event).await?;
//! host.shutdown().await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::{init_broker, Broker, BrokerConfig, BrokerError};
use crate::config::{Config, ConfigError};
use crate::discovery::{AutoRegistrationService, DiscoveryError, DiscoveryOptions, HandlerResolver};
use crate::interfaces::{CommandSender, EventPublisher, Publisher, Subscriber};
use crate::message::MessageKind;
use crate::registry::BrokerRegistry;
use crate::utils::{connect_with_retry, RetryPolicy};

/// Errors building or running a `MessagingHost`.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Creates the broker for one category.
pub type BrokerFactory = Box<dyn FnOnce() -> Result<Arc<dyn Broker>, BrokerError> + Send>;

enum BrokerSource {
    Factory(BrokerFactory),
    Shared(Arc<dyn Broker>),
    Config(BrokerConfig),
}

/// Builder for a `MessagingHost`.
pub struct MessagingBuilder {
    brokers: HashMap<MessageKind, BrokerSource>,
    discovery: Option<DiscoveryOptions>,
    resolver: HandlerResolver,
    connect_retry: RetryPolicy,
}

impl Default for MessagingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessagingBuilder {
    /// Builder with no brokers and discovery disabled.
    pub fn new() -> Self {
        Self {
            brokers: HashMap::new(),
            discovery: None,
            resolver: HandlerResolver::new(),
            connect_retry: RetryPolicy::default(),
        }
    }

    /// Brokers and discovery from configuration.
    ///
    /// Categories configured with the same broker name share one broker.
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::new();
        for kind in MessageKind::ALL {
            if let Some(broker) = config.brokers.get(kind) {
                builder
                    .brokers
                    .insert(kind, BrokerSource::Config(broker.clone()));
            }
        }
        if config.discovery.enabled {
            builder.discovery = Some(DiscoveryOptions::from(&config.discovery));
        }
        builder
    }

    /// Load configuration (see `Config::load`) and build from it.
    pub fn from_config_file(path: Option<&str>) -> Result<Self, HostError> {
        let config = Config::load(path)?;
        Ok(Self::from_config(&config))
    }

    // ========================================================================
    // Brokers
    // ========================================================================

    pub fn with_event_broker<F, B>(self, factory: F) -> Self
    where
        F: FnOnce() -> B + Send + 'static,
        B: Broker + 'static,
    {
        self.with_broker_factory(MessageKind::Event, factory)
    }

    pub fn with_command_broker<F, B>(self, factory: F) -> Self
    where
        F: FnOnce() -> B + Send + 'static,
        B: Broker + 'static,
    {
        self.with_broker_factory(MessageKind::Command, factory)
    }

    pub fn with_message_broker<F, B>(self, factory: F) -> Self
    where
        F: FnOnce() -> B + Send + 'static,
        B: Broker + 'static,
    {
        self.with_broker_factory(MessageKind::Message, factory)
    }

    /// Set the broker factory for `kind`, replacing any previous source.
    pub fn with_broker_factory<F, B>(mut self, kind: MessageKind, factory: F) -> Self
    where
        F: FnOnce() -> B + Send + 'static,
        B: Broker + 'static,
    {
        let factory: BrokerFactory = Box::new(move || Ok(Arc::new(factory()) as Arc<dyn Broker>));
        self.brokers.insert(kind, BrokerSource::Factory(factory));
        self
    }

    /// Serve every category with one broker.
    pub fn with_shared_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        for kind in MessageKind::ALL {
            self.brokers
                .insert(kind, BrokerSource::Shared(Arc::clone(&broker)));
        }
        self
    }

    /// Retry policy for connecting brokers during `build`.
    pub fn with_connect_retry(mut self, policy: RetryPolicy) -> Self {
        self.connect_retry = policy;
        self
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Enable the auto-registration service.
    pub fn with_handler_discovery(mut self, options: DiscoveryOptions) -> Self {
        self.discovery = Some(options);
        self
    }

    pub fn with_resolver(mut self, resolver: HandlerResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Provide a handler instance for registrations that need one.
    pub fn with_handler_instance<H: Send + Sync + 'static>(mut self, handler: Arc<H>) -> Self {
        self.resolver.insert(handler);
        self
    }

    /// Create and connect the brokers.
    ///
    /// On failure, brokers the builder created are disposed before the
    /// error is returned. Shared brokers stay with their owner.
    pub async fn build(self) -> Result<MessagingHost, HostError> {
        let mut created: Vec<Arc<dyn Broker>> = Vec::new();
        match self.assemble(&mut created).await {
            Ok(host) => Ok(host),
            Err(error) => {
                for broker in created {
                    if let Err(e) = broker.dispose().await {
                        warn!(broker = %broker.name(), error = %e, "Failed to dispose broker after build error");
                    }
                }
                Err(error)
            }
        }
    }

    async fn assemble(self, created: &mut Vec<Arc<dyn Broker>>) -> Result<MessagingHost, HostError> {
        let mut registry = BrokerRegistry::new();
        let mut configured: HashMap<String, Arc<dyn Broker>> = HashMap::new();

        for kind in MessageKind::ALL {
            let Some(source) = self.brokers.get(&kind) else {
                continue;
            };
            let broker = match source {
                BrokerSource::Shared(broker) => Arc::clone(broker),
                BrokerSource::Factory(_) => continue,
                BrokerSource::Config(config) => {
                    let name = config.name.clone().unwrap_or_else(|| kind.to_string());
                    match configured.get(&name) {
                        Some(broker) => Arc::clone(broker),
                        None => {
                            let broker = init_broker(&name, config)?;
                            created.push(Arc::clone(&broker));
                            configured.insert(name, Arc::clone(&broker));
                            broker
                        }
                    }
                }
            };
            registry = registry.register(kind, broker);
        }

        let mut brokers = self.brokers;
        for kind in MessageKind::ALL {
            if let Some(BrokerSource::Factory(factory)) = brokers.remove(&kind) {
                let broker = factory()?;
                created.push(Arc::clone(&broker));
                registry = registry.register(kind, broker);
            }
        }

        for broker in registry.distinct_brokers() {
            connect_with_retry(broker.name(), self.connect_retry, || broker.connect()).await?;
        }

        let auto_registration = self
            .discovery
            .map(|options| AutoRegistrationService::for_registry(&registry, self.resolver, options));

        info!(
            categories = ?registry.configured_kinds(),
            discovery = auto_registration.is_some(),
            "Messaging host built"
        );

        Ok(MessagingHost {
            registry,
            auto_registration,
        })
    }
}

/// Built messaging stack: the broker registry plus the optional
/// auto-registration service.
pub struct MessagingHost {
    registry: BrokerRegistry,
    auto_registration: Option<AutoRegistrationService>,
}

impl MessagingHost {
    pub fn registry(&self) -> &BrokerRegistry {
        &self.registry
    }

    pub fn auto_registration(&self) -> Option<&AutoRegistrationService> {
        self.auto_registration.as_ref()
    }

    pub fn publisher(&self) -> Arc<dyn Publisher> {
        self.registry.publisher()
    }

    pub fn subscriber(&self) -> Arc<dyn Subscriber> {
        self.registry.subscriber()
    }

    pub fn event_publisher(&self) -> EventPublisher {
        self.registry.event_publisher()
    }

    pub fn command_sender(&self) -> CommandSender {
        self.registry.command_sender()
    }

    /// Run handler auto-registration, if enabled. Returns the number of
    /// handlers subscribed.
    pub async fn start(&self) -> Result<usize, HostError> {
        match &self.auto_registration {
            Some(service) => Ok(service.start().await?),
            None => Ok(0),
        }
    }

    /// Release auto-registered subscriptions, then dispose every broker.
    pub async fn shutdown(&self) -> Result<(), HostError> {
        if let Some(service) = &self.auto_registration {
            service.stop().await;
        }
        self.registry.dispose_all().await?;
        info!("Messaging host shut down");
        Ok(())
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests;
