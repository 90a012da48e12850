//! Switchyard - messaging abstractions
//!
//! Contracts for messages, events, commands and their handlers, plus a
//! broker registry that routes each message category to a pluggable
//! broker. Ships an in-memory broker for tests and local development.

pub mod broker;
pub mod cancel;
pub mod config;
pub mod discovery;
pub mod hosting;
pub mod interfaces;
pub mod message;
pub mod registry;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Used by `register_handler!`.
#[doc(hidden)]
pub use inventory;

pub use broker::{Broker, BrokerError, PublishReport};
#[cfg(feature = "memory")]
pub use broker::InMemoryBroker;
pub use cancel::{CancelSource, CancelToken};
pub use discovery::{AutoRegistrationService, DiscoveryOptions, HandlerRegistration, HandlerResolver};
pub use hosting::{HostError, MessagingBuilder, MessagingHost};
pub use interfaces::{
    HandlerError, MessageHandler, Publisher, PublisherExt, Subscriber, SubscriberExt,
    Subscription, SubscriptionOptions, SubscriptionState,
};
pub use message::{Command, Envelope, Event, Message, MessageKind};
pub use registry::BrokerRegistry;
