//! Envelope: a sealed message plus per-delivery context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Message, MessageKind};

/// Errors opening or decoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Envelope carries '{actual}', expected '{expected}'")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid envelope payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// A message paired with auxiliary context for a single publish.
///
/// The envelope has its own identity and timestamp, distinct from the
/// message it carries. It is not persisted beyond the operation that built
/// it; the in-memory broker stores its JSON encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    id: Uuid,
    created_at: DateTime<Utc>,
    message_type: String,
    kind: MessageKind,
    message_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    context: BTreeMap<String, String>,
    payload: serde_json::Value,
}

impl Envelope {
    /// Serialize `message` into a new envelope.
    pub fn seal<M: Message>(message: &M) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            message_type: M::message_type().to_string(),
            kind: M::KIND,
            message_id: message.id(),
            correlation_id: message.correlation_id().map(str::to_string),
            context: BTreeMap::new(),
            payload: serde_json::to_value(message)?,
        })
    }

    /// Attach a context entry (caller identity, trace id, ...).
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Deserialize the payload as `M`.
    ///
    /// Fails with `TypeMismatch` when the envelope was sealed from a
    /// different message type, even if the JSON would happen to fit.
    pub fn open<M: Message>(&self) -> Result<M, EnvelopeError> {
        if self.message_type != M::message_type() {
            return Err(EnvelopeError::TypeMismatch {
                expected: M::message_type().to_string(),
                actual: self.message_type.clone(),
            });
        }
        Ok(M::deserialize(&self.payload)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}
