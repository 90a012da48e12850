//! Message model.
//!
//! Every payload that crosses a broker is a [`Message`]. Messages fall into
//! one of three categories ([`MessageKind`]), declared per type through
//! `Message::KIND`. Events and commands carry extra header fields:
//!
//! - [`EventHeader`]: source system and schema version
//! - [`CommandHeader`]: target system and requested action
//!
//! Headers are immutable once the message is built; the only way to set a
//! field is through the consuming `with_*` builders.

mod envelope;

pub use envelope::{Envelope, EnvelopeError};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message category used for broker routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Fan-out notification that something happened.
    Event,
    /// Request for a target system to perform an action.
    Command,
    /// Anything else.
    Message,
}

impl MessageKind {
    /// All categories, in routing-check order.
    pub const ALL: [MessageKind; 3] = [
        MessageKind::Event,
        MessageKind::Command,
        MessageKind::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Event => "event",
            MessageKind::Command => "command",
            MessageKind::Message => "message",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity, timestamp and correlation shared by every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    id: Uuid,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl MessageHeader {
    /// Fresh header with a random id and the current time.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            correlation_id: None,
        }
    }

    /// Link this message to a related one.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}

impl Default for MessageHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Header for events: base header plus source system and schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    #[serde(flatten)]
    message: MessageHeader,
    source: String,
    schema_version: u32,
}

impl EventHeader {
    /// Header for an event raised by `source`, schema version 1.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            message: MessageHeader::new(),
            source: source.into(),
            schema_version: 1,
        }
    }

    pub fn with_schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.message = self.message.with_correlation_id(correlation_id);
        self
    }

    pub fn message(&self) -> &MessageHeader {
        &self.message
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

/// Header for commands: base header plus target system and action name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandHeader {
    #[serde(flatten)]
    message: MessageHeader,
    target: String,
    action: String,
}

impl CommandHeader {
    pub fn new(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            message: MessageHeader::new(),
            target: target.into(),
            action: action.into(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.message = self.message.with_correlation_id(correlation_id);
        self
    }

    pub fn message(&self) -> &MessageHeader {
        &self.message
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

/// A typed message that can travel through a broker.
///
/// `message_type()` is the declared type name. It doubles as the default
/// topic for both publishing and subscribing, and is checked on delivery so
/// a subscription only ever instantiates the type it was declared for.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Routing category of this type.
    const KIND: MessageKind;

    /// Declared type name (default topic).
    fn message_type() -> &'static str;

    fn header(&self) -> &MessageHeader;

    fn kind(&self) -> MessageKind {
        Self::KIND
    }

    fn id(&self) -> Uuid {
        self.header().id()
    }

    fn correlation_id(&self) -> Option<&str> {
        self.header().correlation_id()
    }
}

/// An event message.
pub trait Event: Message {
    fn event_header(&self) -> &EventHeader;

    fn source(&self) -> &str {
        self.event_header().source()
    }

    fn schema_version(&self) -> u32 {
        self.event_header().schema_version()
    }
}

/// A command message.
pub trait Command: Message {
    fn command_header(&self) -> &CommandHeader;

    fn target(&self) -> &str {
        self.command_header().target()
    }

    fn action(&self) -> &str {
        self.command_header().action()
    }
}
