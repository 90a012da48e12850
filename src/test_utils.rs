//! Test utilities: sample messages and handlers.
//!
//! Available to unit tests and, behind the `test-utils` feature, to
//! integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cancel::CancelToken;
use crate::interfaces::{HandlerError, MessageHandler};
use crate::message::{
    Command, CommandHeader, Event, EventHeader, Message, MessageHeader, MessageKind,
};

/// Sample event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCreatedEvent {
    pub header: EventHeader,
    pub user_id: String,
    pub email: String,
    pub name: String,
}

impl UserCreatedEvent {
    pub fn new(user_id: &str, email: &str, name: &str) -> Self {
        Self {
            header: EventHeader::new("users"),
            user_id: user_id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
        }
    }
}

impl Message for UserCreatedEvent {
    const KIND: MessageKind = MessageKind::Event;

    fn message_type() -> &'static str {
        "UserCreatedEvent"
    }

    fn header(&self) -> &MessageHeader {
        self.header.message()
    }
}

impl Event for UserCreatedEvent {
    fn event_header(&self) -> &EventHeader {
        &self.header
    }
}

/// Second sample event, used by discovery tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub header: EventHeader,
    pub order_id: String,
    pub total_cents: u64,
}

impl OrderCreatedEvent {
    pub fn new(order_id: &str, total_cents: u64) -> Self {
        Self {
            header: EventHeader::new("orders"),
            order_id: order_id.to_string(),
            total_cents,
        }
    }
}

impl Message for OrderCreatedEvent {
    const KIND: MessageKind = MessageKind::Event;

    fn message_type() -> &'static str {
        "OrderCreatedEvent"
    }

    fn header(&self) -> &MessageHeader {
        self.header.message()
    }
}

impl Event for OrderCreatedEvent {
    fn event_header(&self) -> &EventHeader {
        &self.header
    }
}

/// Sample command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderCommand {
    pub header: CommandHeader,
    pub customer_id: String,
}

impl CreateOrderCommand {
    pub fn new(customer_id: &str) -> Self {
        Self {
            header: CommandHeader::new("orders", "create"),
            customer_id: customer_id.to_string(),
        }
    }
}

impl Message for CreateOrderCommand {
    const KIND: MessageKind = MessageKind::Command;

    fn message_type() -> &'static str {
        "CreateOrderCommand"
    }

    fn header(&self) -> &MessageHeader {
        self.header.message()
    }
}

impl Command for CreateOrderCommand {
    fn command_header(&self) -> &CommandHeader {
        &self.header
    }
}

/// Sample generic message (neither event nor command).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditMessage {
    pub header: MessageHeader,
    pub line: String,
}

impl AuditMessage {
    pub fn new(line: &str) -> Self {
        Self {
            header: MessageHeader::new(),
            line: line.to_string(),
        }
    }
}

impl Message for AuditMessage {
    const KIND: MessageKind = MessageKind::Message;

    fn message_type() -> &'static str {
        "AuditMessage"
    }

    fn header(&self) -> &MessageHeader {
        &self.header
    }
}

/// Handler that records every message it receives.
pub struct RecordingHandler<M> {
    received: Arc<RwLock<Vec<M>>>,
}

impl<M> RecordingHandler<M> {
    pub fn new() -> Self {
        Self {
            received: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Shared handle to the received list.
    pub fn received(&self) -> Arc<RwLock<Vec<M>>> {
        Arc::clone(&self.received)
    }

    pub async fn count(&self) -> usize {
        self.received.read().await.len()
    }
}

impl<M> Default for RecordingHandler<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Message> MessageHandler<M> for RecordingHandler<M> {
    async fn handle(&self, message: M, _cancel: CancelToken) -> Result<(), HandlerError> {
        self.received.write().await.push(message);
        Ok(())
    }
}

/// Handler that fails every call and counts attempts.
#[derive(Default)]
pub struct FailingHandler {
    calls: Arc<AtomicUsize>,
}

impl FailingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl<M: Message> MessageHandler<M> for FailingHandler {
    async fn handle(&self, _message: M, _cancel: CancelToken) -> Result<(), HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("handler rejected message".into())
    }
}

/// Let spawned work settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
