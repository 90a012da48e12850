//! BrokerRegistry interface step definitions.

use std::fmt;
use std::sync::Arc;

use cucumber::{given, then, when, World};
use switchyard::broker::{Broker, BrokerError, InMemoryBroker, PublishReport};
use switchyard::test_utils::{
    settle, AuditMessage, CreateOrderCommand, RecordingHandler, UserCreatedEvent,
};
use switchyard::{BrokerRegistry, MessageKind, PublisherExt, SubscriberExt, SubscriptionOptions};

/// Test context for BrokerRegistry scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct RegistryWorld {
    registry: BrokerRegistry,
    brokers: Vec<InMemoryBroker>,
    events: Arc<RecordingHandler<UserCreatedEvent>>,
    commands: Arc<RecordingHandler<CreateOrderCommand>>,
    last_report: Option<PublishReport>,
    last_error: Option<BrokerError>,
}

impl fmt::Debug for RegistryWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryWorld")
            .field("configured", &self.registry.configured_kinds())
            .field("last_report", &self.last_report)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl RegistryWorld {
    fn new() -> Self {
        Self {
            registry: BrokerRegistry::new(),
            brokers: Vec::new(),
            events: Arc::new(RecordingHandler::new()),
            commands: Arc::new(RecordingHandler::new()),
            last_report: None,
            last_error: None,
        }
    }

    fn record(&mut self, result: Result<PublishReport, BrokerError>) {
        self.last_report = None;
        self.last_error = None;
        match result {
            Ok(report) => self.last_report = Some(report),
            Err(e) => self.last_error = Some(e),
        }
    }
}

fn parse_kind(kind: &str) -> MessageKind {
    match kind {
        "event" => MessageKind::Event,
        "command" => MessageKind::Command,
        "message" => MessageKind::Message,
        other => panic!("Unknown message category: {other}"),
    }
}

// --- Given steps ---

#[given(expr = "an in-memory broker serving {word} messages")]
async fn given_broker_for(world: &mut RegistryWorld, kind: String) {
    let broker = InMemoryBroker::named(format!("{kind}-broker"));
    world.brokers.push(broker.clone());
    world.registry = world
        .registry
        .clone()
        .register(parse_kind(&kind), Arc::new(broker));
}

#[given("one in-memory broker serving every category")]
async fn given_shared_broker(world: &mut RegistryWorld) {
    let broker = InMemoryBroker::named("shared");
    world.brokers.push(broker.clone());
    let shared: Arc<dyn Broker> = Arc::new(broker);
    world.registry = BrokerRegistry::new()
        .with_event_broker(Arc::clone(&shared))
        .with_command_broker(Arc::clone(&shared))
        .with_message_broker(shared);
}

#[given("a started subscriber for user events through the registry")]
async fn given_event_subscriber(world: &mut RegistryWorld) {
    world
        .registry
        .subscriber()
        .subscribe::<UserCreatedEvent, _>(
            Arc::clone(&world.events),
            SubscriptionOptions::started(),
        )
        .await
        .expect("Subscribe failed");
}

#[given("a started subscriber for order commands through the registry")]
async fn given_command_subscriber(world: &mut RegistryWorld) {
    world
        .registry
        .subscriber()
        .subscribe::<CreateOrderCommand, _>(
            Arc::clone(&world.commands),
            SubscriptionOptions::started(),
        )
        .await
        .expect("Subscribe failed");
}

// --- When steps ---

#[when(expr = "I publish a user created event for {string}")]
async fn when_publish_event(world: &mut RegistryWorld, user_id: String) {
    let event = UserCreatedEvent::new(&user_id, &format!("{user_id}@example.com"), &user_id);
    let result = world.registry.event_publisher().publish(&event).await;
    world.record(result);
    settle().await;
}

#[when(expr = "I send a create order command for {string}")]
async fn when_send_command(world: &mut RegistryWorld, customer_id: String) {
    let command = CreateOrderCommand::new(&customer_id);
    let result = world.registry.command_sender().send(&command).await;
    world.record(result);
    settle().await;
}

#[when(expr = "I publish an audit message {string}")]
async fn when_publish_message(world: &mut RegistryWorld, line: String) {
    let result = world
        .registry
        .publisher()
        .publish(&AuditMessage::new(&line))
        .await;
    world.record(result);
}

#[when("every broker is disposed")]
async fn when_dispose_all(world: &mut RegistryWorld) {
    world.registry.dispose_all().await.expect("Dispose failed");
}

// --- Then steps ---

#[then(expr = "the operation fails because no {word} broker is configured")]
async fn then_not_configured(world: &mut RegistryWorld, kind: String) {
    let error = world.last_error.as_ref().expect("Expected an error");
    assert!(
        matches!(error, BrokerError::NotConfigured(k) if *k == parse_kind(&kind)),
        "unexpected error: {error:?}"
    );
    assert_eq!(error.to_string(), format!("No {kind} broker configured"));
}

#[then("the operation succeeds")]
async fn then_succeeds(world: &mut RegistryWorld) {
    assert!(world.last_error.is_none(), "unexpected error: {:?}", world.last_error);
    assert!(world.last_report.is_some());
}

#[then(expr = "the event subscriber received {int} event(s)")]
async fn then_events_received(world: &mut RegistryWorld, expected: usize) {
    assert_eq!(world.events.count().await, expected);
}

#[then(expr = "the command subscriber received {int} command(s)")]
async fn then_commands_received(world: &mut RegistryWorld, expected: usize) {
    assert_eq!(world.commands.count().await, expected);
}

#[then(expr = "the registry holds {int} distinct broker(s)")]
async fn then_distinct_brokers(world: &mut RegistryWorld, expected: usize) {
    assert_eq!(world.registry.distinct_brokers().len(), expected);
}

#[then("every broker is disposed")]
async fn then_all_disposed(world: &mut RegistryWorld) {
    assert!(!world.brokers.is_empty());
    assert!(world.brokers.iter().all(|b| b.is_disposed()));
}
