//! Controller contract and per-request lifecycle.

use std::ops::{Deref, DerefMut};

use crate::error::HandlerError;
use crate::http::HttpContext;
use crate::lifecycle::CancellationSignal;
use crate::routing::RouteMatch;

/// What a controller instance gets to see of its request.
#[derive(Debug, Clone)]
pub struct ControllerScope {
    pub context: HttpContext,
    pub route: RouteMatch,
    pub cancel: CancellationSignal,
}

/// A type whose methods are exposed as routes by a `WebApiModule`.
///
/// A fresh instance is built for every request and never shared.
pub trait Controller: Send + Sync + 'static {
    /// Receive the request scope before any hook runs.
    fn attach(&mut self, scope: ControllerScope);

    /// Runs after [`attach`](Self::attach) and before parameters are bound.
    /// An error aborts the request.
    fn on_before_handler(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Release resources. Called exactly once per instance, whether the
    /// handler succeeded, failed, panicked or was cancelled.
    fn dispose(&mut self) {}
}

/// Owns a controller for one request and disposes it exactly once.
pub(crate) struct ControllerGuard<C: Controller> {
    controller: C,
    disposed: bool,
}

impl<C: Controller> ControllerGuard<C> {
    pub(crate) fn new(controller: C) -> Self {
        Self {
            controller,
            disposed: false,
        }
    }

    /// Dispose now instead of on drop.
    pub(crate) fn finish(mut self) {
        self.dispose_once();
    }

    fn dispose_once(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.controller.dispose();
        }
    }
}

impl<C: Controller> Deref for ControllerGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.controller
    }
}

impl<C: Controller> DerefMut for ControllerGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.controller
    }
}

impl<C: Controller> Drop for ControllerGuard<C> {
    fn drop(&mut self) {
        self.dispose_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counted(Arc<AtomicUsize>);

    impl Controller for Counted {
        fn attach(&mut self, _scope: ControllerScope) {}

        fn dispose(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn finish_then_drop_disposes_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let guard = ControllerGuard::new(Counted(Arc::clone(&count)));
        guard.finish();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unwinding_disposes() {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let result = std::panic::catch_unwind(move || {
            let _guard = ControllerGuard::new(Counted(inner));
            panic!("handler blew up");
        });
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
