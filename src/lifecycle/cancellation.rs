//! Cooperative cancellation shared by the accept loop and request tasks.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::watch;

use crate::error::HandlerError;

/// A cloneable cancellation signal.
///
/// Signals form a tree: a child created with [`CancellationSignal::child`]
/// observes its own cancellation and that of every ancestor, while cancelling
/// the child leaves the parent untouched. The accept loop owns a child of the
/// caller's signal so a fatal transport error can stop it without cancelling
/// in-flight requests.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    inner: Arc<SignalInner>,
}

#[derive(Debug)]
struct SignalInner {
    tx: watch::Sender<bool>,
    parent: Option<CancellationSignal>,
}

impl CancellationSignal {
    /// Create a new root signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SignalInner { tx, parent: None }),
        }
    }

    /// Create a child signal that is cancelled together with `self`.
    pub fn child(&self) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SignalInner {
                tx,
                parent: Some(self.clone()),
            }),
        }
    }

    /// Trigger cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.tx.send_replace(true);
    }

    /// Returns true if this signal or any ancestor was cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.tx.borrow()
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(CancellationSignal::is_cancelled)
    }

    /// Resolves once this signal or any ancestor is cancelled.
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut rx = self.inner.tx.subscribe();
            match &self.inner.parent {
                Some(parent) => {
                    tokio::select! {
                        _ = rx.wait_for(|cancelled| *cancelled) => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => {
                    // The sender lives as long as `self`, so this only returns on cancel.
                    let _ = rx.wait_for(|cancelled| *cancelled).await;
                }
            }
        })
    }

    /// Run `fut` until it completes or the signal fires, whichever is first.
    ///
    /// Cancellation wins ties so that work already cancelled never resumes.
    pub async fn guard<F>(&self, fut: F) -> Result<F::Output, HandlerError>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(HandlerError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(HandlerError::Cancelled),
            output = fut => Ok(output),
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}
