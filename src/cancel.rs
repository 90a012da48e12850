//! Cancellation signal passed to handlers and publish calls.
//!
//! A `CancelSource` owns a watch channel; every `CancelToken` cloned from it
//! observes the same flag. `CancelToken::never()` is a token with no source.

use tokio::sync::watch;

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelSource {
    cancel: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self { cancel }
    }

    /// Token observing this source.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: Some(self.cancel.subscribe()),
        }
    }

    /// Signal cancellation to every token.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self { receiver: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is signalled. Never resolves for
    /// `never()` tokens or when the source is dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(receiver) = &self.receiver else {
            return futures::future::pending().await;
        };
        let mut receiver = receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}
