//! Message handler interface.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::DeliveryError;
use crate::cancel::CancelToken;
use crate::message::{Envelope, Message};

/// Error returned by application handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Application-side handler for one message type.
///
/// A single type may implement this trait for several message types; the
/// subscription decides which one it is bound to.
///
/// # Example
///
/// ```ignore
/// struct WelcomeMailer { outbox: RwLock<Vec<String>> }
///
/// #[async_trait]
/// impl MessageHandler<UserCreatedEvent> for WelcomeMailer {
///     async fn handle(&self, event: UserCreatedEvent, _cancel: CancelToken) -> Result<(), HandlerError> {
///         self.outbox.write().await.push(event.email);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler<M: Message>: Send + Sync {
    async fn handle(&self, message: M, cancel: CancelToken) -> Result<(), HandlerError>;
}

/// Type-erased handler brokers deliver to.
///
/// Receives the encoded envelope exactly as the broker stored it.
pub trait EnvelopeHandler: Send + Sync {
    /// Declared message type this handler decodes.
    fn message_type(&self) -> &str;

    fn deliver(
        &self,
        payload: Arc<[u8]>,
        cancel: CancelToken,
    ) -> BoxFuture<'static, Result<(), DeliveryError>>;
}

/// Adapts a typed `MessageHandler<M>` into an `EnvelopeHandler`.
pub struct TypedHandler<M, H> {
    handler: Arc<H>,
    _message: PhantomData<fn() -> M>,
}

impl<M, H> TypedHandler<M, H>
where
    M: Message,
    H: MessageHandler<M> + 'static,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            _message: PhantomData,
        }
    }

    pub fn into_dyn(self) -> Arc<dyn EnvelopeHandler> {
        Arc::new(self)
    }
}

impl<M, H> EnvelopeHandler for TypedHandler<M, H>
where
    M: Message,
    H: MessageHandler<M> + 'static,
{
    fn message_type(&self) -> &str {
        M::message_type()
    }

    fn deliver(
        &self,
        payload: Arc<[u8]>,
        cancel: CancelToken,
    ) -> BoxFuture<'static, Result<(), DeliveryError>> {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            let envelope = Envelope::decode(&payload)?;
            let message = envelope.open::<M>()?;
            handler
                .handle(message, cancel)
                .await
                .map_err(|e| DeliveryError::Handler(e.to_string()))
        })
    }
}
