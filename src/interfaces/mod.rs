//! Abstract interfaces for switchyard components.
//!
//! These traits define the contracts for:
//! - Message handlers (application code)
//! - Publishers and subscribers (broker-facing facades)
//! - Subscriptions (broker-native handles with a start/stop lifecycle)
//! - Brokers (pluggable transports)
//! - Delivery reporting

pub mod broker;
pub mod delivery;
pub mod handler;
pub mod publisher;
pub mod subscriber;

pub use broker::{Broker, BrokerError, Result};
pub use delivery::{DeliveryError, DeliveryFailure, DeliveryObserver, PublishReport};
pub use handler::{EnvelopeHandler, HandlerError, MessageHandler, TypedHandler};
pub use publisher::{CommandSender, EventPublisher, Publisher, PublisherExt};
pub use subscriber::{
    Subscriber, SubscriberExt, Subscription, SubscriptionBinding, SubscriptionOptions,
    SubscriptionState,
};
