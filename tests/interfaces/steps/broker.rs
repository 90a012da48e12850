//! Broker interface step definitions.

use std::fmt;
use std::sync::Arc;

use cucumber::{given, then, when, World};
use switchyard::broker::{Broker, BrokerError, InMemoryBroker, PublishReport};
use switchyard::test_utils::{settle, RecordingHandler, UserCreatedEvent};
use switchyard::{PublisherExt, SubscriberExt, Subscription, SubscriptionOptions};

/// Test context for Broker scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct BrokerWorld {
    broker: InMemoryBroker,
    recorder: Arc<RecordingHandler<UserCreatedEvent>>,
    subscription: Option<Arc<dyn Subscription>>,
    last_report: Option<PublishReport>,
    last_error: Option<BrokerError>,
}

impl fmt::Debug for BrokerWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerWorld")
            .field("broker", &self.broker.name())
            .field("subscription", &self.subscription.as_ref().map(|s| s.state()))
            .field("last_report", &self.last_report)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl BrokerWorld {
    fn new() -> Self {
        Self {
            broker: InMemoryBroker::new(),
            recorder: Arc::new(RecordingHandler::new()),
            subscription: None,
            last_report: None,
            last_error: None,
        }
    }

    fn subscription(&self) -> &Arc<dyn Subscription> {
        self.subscription
            .as_ref()
            .expect("No subscription created")
    }

    async fn subscribe(&mut self, topic: Option<&str>, options: SubscriptionOptions) {
        let handler = Arc::clone(&self.recorder);
        let subscription = match topic {
            Some(topic) => {
                self.broker
                    .subscribe_to::<UserCreatedEvent, _>(topic, handler, options)
                    .await
            }
            None => {
                self.broker
                    .subscribe::<UserCreatedEvent, _>(handler, options)
                    .await
            }
        };
        self.subscription = Some(subscription.expect("Subscribe failed"));
    }

    async fn publish(&mut self, user_id: &str, topic: Option<&str>) {
        let event = UserCreatedEvent::new(user_id, &format!("{user_id}@example.com"), user_id);
        let result = match topic {
            Some(topic) => self.broker.publish_to(topic, &event).await,
            None => self.broker.publish(&event).await,
        };
        match result {
            Ok(report) => self.last_report = Some(report),
            Err(e) => self.last_error = Some(e),
        }
    }
}

// --- Background ---

#[given("an in-memory broker")]
async fn given_in_memory_broker(world: &mut BrokerWorld) {
    world.broker.connect().await.expect("Connect failed");
}

// --- Given steps ---

#[given("a subscriber for user events")]
async fn given_subscriber(world: &mut BrokerWorld) {
    world.subscribe(None, SubscriptionOptions::default()).await;
}

#[given("a started subscriber for user events")]
async fn given_started_subscriber(world: &mut BrokerWorld) {
    world.subscribe(None, SubscriptionOptions::started()).await;
}

#[given(expr = "a started subscriber for user events on topic {string}")]
async fn given_started_subscriber_on_topic(world: &mut BrokerWorld, topic: String) {
    world.subscribe(Some(&topic), SubscriptionOptions::started()).await;
}

#[given(expr = "a user created event for {string} was published")]
async fn given_event_published(world: &mut BrokerWorld, user_id: String) {
    world.publish(&user_id, None).await;
}

#[given(expr = "the topic {string} was created")]
async fn given_topic_created(world: &mut BrokerWorld, topic: String) {
    world
        .broker
        .create_topic(&topic)
        .await
        .expect("Create topic failed");
}

// --- When steps ---

#[when("the subscription is started")]
async fn when_subscription_started(world: &mut BrokerWorld) {
    world
        .subscription()
        .start()
        .await
        .expect("Start failed");
}

#[when("the subscription is stopped")]
async fn when_subscription_stopped(world: &mut BrokerWorld) {
    world.subscription().stop().await.expect("Stop failed");
}

#[when("the subscription is disposed")]
async fn when_subscription_disposed(world: &mut BrokerWorld) {
    world
        .subscription()
        .dispose()
        .await
        .expect("Dispose failed");
}

#[when("a subscriber for user events is started")]
async fn when_subscriber_started(world: &mut BrokerWorld) {
    world.subscribe(None, SubscriptionOptions::started()).await;
}

#[when(expr = "I publish a user created event for {string}")]
async fn when_publish(world: &mut BrokerWorld, user_id: String) {
    world.publish(&user_id, None).await;
    settle().await;
}

#[when(expr = "I publish a user created event for {string} to topic {string}")]
async fn when_publish_to(world: &mut BrokerWorld, user_id: String, topic: String) {
    world.publish(&user_id, Some(&topic)).await;
    settle().await;
}

#[when(expr = "the topic {string} is deleted")]
async fn when_topic_deleted(world: &mut BrokerWorld, topic: String) {
    world
        .broker
        .delete_topic(&topic)
        .await
        .expect("Delete topic failed");
}

#[when("the broker is disposed")]
async fn when_broker_disposed(world: &mut BrokerWorld) {
    world.broker.dispose().await.expect("Dispose failed");
}

// --- Then steps ---

#[then(expr = "the subscriber received {int} event(s)")]
async fn then_received(world: &mut BrokerWorld, expected: usize) {
    assert_eq!(world.recorder.count().await, expected);
}

#[then(expr = "the last event is for user {string}")]
async fn then_last_event_for(world: &mut BrokerWorld, user_id: String) {
    let received = world.recorder.received();
    let received = received.read().await;
    let last = received.last().expect("No events received");
    assert_eq!(last.user_id, user_id);
}

#[then(expr = "the publish report shows {int} deliveries")]
async fn then_report_deliveries(world: &mut BrokerWorld, expected: usize) {
    let report = world.last_report.as_ref().expect("No publish report");
    assert_eq!(report.delivered, expected);
    assert!(report.is_clean());
}

#[then(expr = "the subscription state is {string}")]
async fn then_subscription_state(world: &mut BrokerWorld, expected: String) {
    assert_eq!(world.subscription().state().to_string(), expected);
}

#[then("starting the subscription fails")]
async fn then_start_fails(world: &mut BrokerWorld) {
    let result = world.subscription().start().await;
    assert!(matches!(result, Err(BrokerError::Disposed(_))));
}

#[then(expr = "the broker lists topics {string}")]
async fn then_lists_topics(world: &mut BrokerWorld, expected: String) {
    let topics = world.broker.topics().await.expect("List topics failed");
    let expected: Vec<String> = expected
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    assert_eq!(topics, expected);
}

#[then(expr = "the topic {string} holds {int} message(s)")]
async fn then_topic_holds(world: &mut BrokerWorld, topic: String, expected: usize) {
    let messages = world.broker.messages(&topic).await.expect("Read failed");
    assert_eq!(messages.len(), expected);
}

#[then("publishing fails because the broker is disposed")]
async fn then_publish_fails_disposed(world: &mut BrokerWorld) {
    world.last_error = None;
    world.publish("late", None).await;
    assert!(matches!(world.last_error, Some(BrokerError::Disposed(_))));
}
