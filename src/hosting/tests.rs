use super::*;
use crate::broker::{InMemoryBroker, MockBroker, PublishReport, Result as BrokerResult};
use crate::cancel::CancelToken;
use crate::config::{BrokersConfig, DiscoveryConfig};
use crate::interfaces::{HandlerError, MessageHandler};
use crate::test_utils::{CreateOrderCommand, UserCreatedEvent};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

mod handlers {
    use super::*;

    pub static WELCOMED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    pub struct WelcomeMailer;

    #[async_trait]
    impl MessageHandler<UserCreatedEvent> for WelcomeMailer {
        async fn handle(&self, _event: UserCreatedEvent, _cancel: CancelToken) -> std::result::Result<(), HandlerError> {
            WELCOMED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    crate::register_handler!(WelcomeMailer => UserCreatedEvent);
}

fn handlers_module() -> String {
    format!("{}::handlers", module_path!())
}

/// Broker whose first `failures` connects fail.
struct FlakyBroker {
    inner: MockBroker,
    failures: AtomicU32,
}

#[async_trait]
impl Broker for FlakyBroker {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn connect(&self) -> BrokerResult<()> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BrokerError::Connection("refused".to_string()));
        }
        self.inner.connect().await
    }

    async fn disconnect(&self) -> BrokerResult<()> {
        self.inner.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn create_topic(&self, name: &str) -> BrokerResult<()> {
        self.inner.create_topic(name).await
    }

    async fn delete_topic(&self, name: &str) -> BrokerResult<()> {
        self.inner.delete_topic(name).await
    }

    async fn topics(&self) -> BrokerResult<Vec<String>> {
        self.inner.topics().await
    }

    fn publisher(&self) -> Arc<dyn Publisher> {
        self.inner.publisher()
    }

    fn subscriber(&self) -> Arc<dyn Subscriber> {
        self.inner.subscriber()
    }

    async fn dispose(&self) -> BrokerResult<()> {
        self.inner.dispose().await
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

#[tokio::test]
async fn test_build_connects_configured_brokers() {
    let events = InMemoryBroker::named("events");
    let handle = events.clone();

    let host = MessagingBuilder::new()
        .with_event_broker(move || events)
        .build()
        .await
        .unwrap();

    assert!(handle.is_connected());
    assert_eq!(host.registry().configured_kinds(), vec![MessageKind::Event]);
    assert!(host.auto_registration().is_none());
    assert_eq!(host.start().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unconfigured_category_fails_at_send() {
    let host = MessagingBuilder::new()
        .with_event_broker(InMemoryBroker::new)
        .build()
        .await
        .unwrap();

    let result = host
        .command_sender()
        .send(&CreateOrderCommand::new("c1"))
        .await;

    assert!(matches!(
        result,
        Err(BrokerError::NotConfigured(MessageKind::Command))
    ));
}

#[tokio::test]
async fn test_shared_broker_serves_every_category() {
    let shared = MockBroker::named("shared");
    let host = MessagingBuilder::new()
        .with_shared_broker(Arc::new(shared.clone()))
        .build()
        .await
        .unwrap();

    assert_eq!(host.registry().configured_kinds().len(), 3);
    assert_eq!(shared.connect_count(), 1);

    host.shutdown().await.unwrap();
    assert_eq!(shared.dispose_count(), 1);
}

#[tokio::test]
async fn test_build_retries_broker_connect() {
    let flaky = FlakyBroker {
        inner: MockBroker::named("flaky"),
        failures: AtomicU32::new(2),
    };
    let inner = flaky.inner.clone();

    MessagingBuilder::new()
        .with_event_broker(move || flaky)
        .with_connect_retry(fast_retry(5))
        .build()
        .await
        .unwrap();

    assert_eq!(inner.connect_count(), 1);
    assert!(inner.is_connected());
}

#[tokio::test]
async fn test_build_fails_when_connect_exhausts_retries() {
    let flaky = FlakyBroker {
        inner: MockBroker::named("down"),
        failures: AtomicU32::new(10),
    };

    let result = MessagingBuilder::new()
        .with_event_broker(move || flaky)
        .with_connect_retry(fast_retry(2))
        .build()
        .await;

    assert!(matches!(
        result,
        Err(HostError::Broker(BrokerError::Connection(_)))
    ));
}

#[tokio::test]
async fn test_failed_build_disposes_created_brokers() {
    let events = InMemoryBroker::named("events");
    let events_handle = events.clone();
    let flaky = FlakyBroker {
        inner: MockBroker::named("down"),
        failures: AtomicU32::new(10),
    };
    let down = flaky.inner.clone();

    let result = MessagingBuilder::new()
        .with_event_broker(move || events)
        .with_command_broker(move || flaky)
        .with_connect_retry(fast_retry(2))
        .build()
        .await;

    assert!(result.is_err());
    assert!(events_handle.is_disposed());
    assert_eq!(down.dispose_count(), 1);
}

#[tokio::test]
async fn test_failed_build_leaves_shared_broker_alone() {
    let shared = InMemoryBroker::named("shared");
    let flaky = FlakyBroker {
        inner: MockBroker::named("down"),
        failures: AtomicU32::new(10),
    };
    let down = flaky.inner.clone();

    let result = MessagingBuilder::new()
        .with_shared_broker(Arc::new(shared.clone()))
        .with_command_broker(move || flaky)
        .with_connect_retry(fast_retry(2))
        .build()
        .await;

    assert!(result.is_err());
    assert!(!shared.is_disposed());
    assert_eq!(down.dispose_count(), 1);
}

#[tokio::test]
async fn test_from_config_shares_brokers_with_equal_names() {
    let named = |name: &str| BrokerConfig {
        name: Some(name.to_string()),
        ..Default::default()
    };
    let config = Config {
        brokers: BrokersConfig {
            event: Some(named("bus")),
            command: Some(named("bus")),
            message: Some(BrokerConfig::default()),
        },
        discovery: DiscoveryConfig::default(),
    };

    let host = MessagingBuilder::from_config(&config).build().await.unwrap();
    let registry = host.registry();

    assert_eq!(registry.distinct_brokers().len(), 2);
    assert_eq!(registry.broker(MessageKind::Event).unwrap().name(), "bus");
    assert_eq!(registry.broker(MessageKind::Message).unwrap().name(), "message");
    assert!(registry.broker(MessageKind::Event).unwrap().is_connected());
}

#[tokio::test]
async fn test_host_lifecycle_with_discovery() {
    let broker = InMemoryBroker::new();
    let host = MessagingBuilder::new()
        .with_shared_broker(Arc::new(broker.clone()))
        .with_handler_discovery(DiscoveryOptions::new().with_module(handlers_module()))
        .build()
        .await
        .unwrap();

    assert_eq!(host.start().await.unwrap(), 1);

    let report: PublishReport = host
        .event_publisher()
        .publish(&UserCreatedEvent::new("u1", "a@b.com", "A"))
        .await
        .unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(handlers::WELCOMED.load(Ordering::SeqCst), 1);

    host.shutdown().await.unwrap();
    assert!(broker.is_disposed());
    assert_eq!(host.auto_registration().unwrap().subscription_count().await, 0);
}

#[tokio::test]
async fn test_from_config_enables_discovery() {
    let config = Config {
        discovery: DiscoveryConfig {
            enabled: true,
            modules: vec![handlers_module()],
            ..Default::default()
        },
        ..Config::in_memory()
    };

    let host = MessagingBuilder::from_config(&config).build().await.unwrap();
    assert_eq!(host.registry().distinct_brokers().len(), 1);

    let service = host.auto_registration().unwrap();
    assert_eq!(service.options().modules, vec![handlers_module()]);
    assert!(service.options().continue_on_error);
}

#[test]
fn test_handler_instance_feeds_resolver() {
    let builder = MessagingBuilder::new().with_handler_instance(Arc::new(handlers::WelcomeMailer));
    assert!(builder.resolver.contains::<handlers::WelcomeMailer>());
}
