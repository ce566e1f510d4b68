//! Passthrough module backed by a closure.

use std::future::Future;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::HandlerError;
use crate::http::HttpContext;
use crate::lifecycle::CancellationSignal;
use crate::modules::Module;

type SyncFn = dyn Fn(&HttpContext, &str) -> Result<bool, HandlerError> + Send + Sync;
type AsyncFn =
    dyn Fn(HttpContext, String) -> BoxFuture<'static, Result<bool, HandlerError>> + Send + Sync;

enum Action {
    Sync(Box<SyncFn>),
    Async(Box<AsyncFn>),
}

/// Runs a closure for every request under its base path.
///
/// The closure decides whether the request was handled; returning `false`
/// passes it on to the next module.
pub struct ActionModule {
    name: String,
    action: Action,
    terminal: bool,
}

impl ActionModule {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&HttpContext, &str) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            action: Action::Sync(Box::new(action)),
            terminal: false,
        }
    }

    /// Closure returning a future; awaited under the request's cancellation.
    pub fn from_async<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(HttpContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, HandlerError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Action::Async(Box::new(
                move |ctx: HttpContext, path: String| -> BoxFuture<'static, Result<bool, HandlerError>> {
                    Box::pin(action(ctx, path))
                },
            )),
            terminal: false,
        }
    }

    /// Mark as terminal.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

#[async_trait]
impl Module for ActionModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_final_handler(&self) -> bool {
        self.terminal
    }

    async fn try_handle(
        &self,
        ctx: &HttpContext,
        path: &str,
        cancel: &CancellationSignal,
    ) -> Result<bool, HandlerError> {
        match &self.action {
            Action::Sync(action) => action(ctx, path),
            Action::Async(action) => cancel.guard(action(ctx.clone(), path.to_string())).await?,
        }
    }
}
