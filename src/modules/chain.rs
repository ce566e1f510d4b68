//! Ordered, lockable module collection.

use axum::http::StatusCode;

use crate::error::{ConfigurationError, HandlerError};
use crate::http::HttpContext;
use crate::lifecycle::CancellationSignal;
use crate::modules::Module;
use crate::routing::{normalize_base_path, relative_path};

struct Entry {
    base_path: String,
    module: Box<dyn Module>,
}

/// Modules in registration order, each under a base path.
#[derive(Default)]
pub struct ModuleChain {
    entries: Vec<Entry>,
    locked: bool,
}

impl ModuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `module` under `base_path`.
    pub fn register<M: Module>(&mut self, base_path: &str, module: M) -> Result<(), ConfigurationError> {
        self.register_boxed(base_path, Box::new(module))
    }

    pub fn register_boxed(
        &mut self,
        base_path: &str,
        module: Box<dyn Module>,
    ) -> Result<(), ConfigurationError> {
        if self.locked {
            return Err(ConfigurationError::Locked);
        }
        let base_path = normalize_base_path(base_path)?;
        tracing::debug!(module = module.name(), base_path = %base_path, "Module registered");
        self.entries.push(Entry { base_path, module });
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(base path, module name)` in dispatch order.
    pub fn modules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.base_path.as_str(), e.module.name()))
    }

    /// Run every module's locking hook and refuse further registrations.
    /// Idempotent.
    pub fn lock(&mut self) -> Result<(), ConfigurationError> {
        if self.locked {
            return Ok(());
        }
        for entry in &mut self.entries {
            entry.module.on_configuration_locking()?;
        }
        self.locked = true;
        Ok(())
    }

    /// Start every module in registration order.
    pub async fn start(&self, cancel: &CancellationSignal) -> Result<(), ConfigurationError> {
        for entry in &self.entries {
            entry.module.start(cancel).await?;
        }
        Ok(())
    }

    /// Offer the request to each module in turn.
    ///
    /// `path` is the path as seen by this chain; nested chains receive the
    /// path relative to their group's base.
    ///
    /// A 405 from a non-terminal module is held back while later modules
    /// get their turn. It is returned only if none of them handles the
    /// request.
    pub async fn dispatch(
        &self,
        ctx: &HttpContext,
        path: &str,
        cancel: &CancellationSignal,
    ) -> Result<bool, HandlerError> {
        let mut method_not_allowed: Option<HandlerError> = None;
        for entry in &self.entries {
            let Some(relative) = relative_path(&entry.base_path, path) else {
                continue;
            };
            if cancel.is_cancelled() {
                return Err(HandlerError::Cancelled);
            }

            let handled = match entry.module.try_handle(ctx, relative, cancel).await {
                Ok(handled) => handled,
                Err(HandlerError::Http(e))
                    if e.status() == StatusCode::METHOD_NOT_ALLOWED && !entry.module.is_final_handler() =>
                {
                    tracing::debug!(
                        request_id = %ctx.id(),
                        module = entry.module.name(),
                        "Method not allowed, trying later modules"
                    );
                    if method_not_allowed.is_none() {
                        method_not_allowed = Some(HandlerError::Http(e));
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };
            if handled {
                tracing::debug!(
                    request_id = %ctx.id(),
                    module = entry.module.name(),
                    base_path = %entry.base_path,
                    "Request handled"
                );
                return Ok(true);
            }
            if entry.module.is_final_handler() {
                tracing::debug!(
                    request_id = %ctx.id(),
                    module = entry.module.name(),
                    base_path = %entry.base_path,
                    "Terminal module declined request"
                );
                return method_not_allowed.map_or(Ok(false), Err);
            }
        }
        method_not_allowed.map_or(Ok(false), Err)
    }
}

impl std::fmt::Debug for ModuleChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleChain")
            .field("modules", &self.modules().collect::<Vec<_>>())
            .field("locked", &self.locked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use crate::modules::{ActionModule, RoutingModule};
    use axum::http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ctx(path: &str) -> HttpContext {
        HttpContext::detached(HttpRequest::new(Method::GET, path.parse().unwrap()))
    }

    fn counting(result: bool, hits: &Arc<AtomicUsize>) -> ActionModule {
        let hits = Arc::clone(hits);
        ActionModule::new("counting", move |_ctx, _path| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(result)
        })
    }

    #[tokio::test]
    async fn terminal_module_stops_the_chain() {
        let a_hits = Arc::new(AtomicUsize::new(0));
        let b_hits = Arc::new(AtomicUsize::new(0));
        let mut chain = ModuleChain::new();
        chain
            .register("/x", counting(false, &a_hits).terminal())
            .unwrap();
        chain.register("/x", counting(true, &b_hits)).unwrap();

        let cancel = CancellationSignal::new();
        let handled = chain.dispatch(&ctx("/x"), "/x", &cancel).await.unwrap();

        assert!(!handled);
        assert_eq!(a_hits.load(Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn modules_outside_base_path_are_skipped() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut chain = ModuleChain::new();
        chain.register("/api", counting(true, &hits)).unwrap();

        let cancel = CancellationSignal::new();
        assert!(!chain.dispatch(&ctx("/apix"), "/apix", &cancel).await.unwrap());
        assert!(chain.dispatch(&ctx("/api/v1"), "/api/v1", &cancel).await.unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_handler_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut chain = ModuleChain::new();
        chain.register("/", counting(false, &first)).unwrap();
        chain.register("/", counting(true, &second)).unwrap();
        chain.register("/", counting(true, &first)).unwrap();

        let cancel = CancellationSignal::new();
        assert!(chain.dispatch(&ctx("/"), "/", &cancel).await.unwrap());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    fn ping(verb: &str) -> RoutingModule {
        let mut module = RoutingModule::new(format!("ping-{verb}"));
        let body = verb.to_string();
        let handler = move |ctx: &HttpContext, _: &crate::routing::RouteMatch| {
            ctx.response().write_text(&body, "text/plain");
            Ok(true)
        };
        match verb {
            "post" => module.post("/ping", handler).unwrap(),
            _ => module.get("/ping", handler).unwrap(),
        };
        module
    }

    #[tokio::test]
    async fn method_not_allowed_lets_later_modules_try() {
        let mut chain = ModuleChain::new();
        chain.register("/", ping("post")).unwrap();
        chain.register("/", ping("get")).unwrap();

        let cancel = CancellationSignal::new();
        let ctx = ctx("/ping");
        assert!(chain.dispatch(&ctx, "/ping", &cancel).await.unwrap());
        assert_eq!(ctx.response().body(), b"get");
    }

    #[tokio::test]
    async fn method_not_allowed_surfaces_when_nobody_handles() {
        let mut chain = ModuleChain::new();
        chain.register("/", ping("post")).unwrap();
        chain.register("/", ActionModule::new("declines", |_ctx, _path| Ok(false))).unwrap();

        let cancel = CancellationSignal::new();
        let err = chain.dispatch(&ctx("/ping"), "/ping", &cancel).await.unwrap_err();
        let HandlerError::Http(e) = err else {
            panic!("expected 405, got {err:?}");
        };
        assert_eq!(e.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(e.headers()[axum::http::header::ALLOW], "POST");
    }

    #[tokio::test]
    async fn terminal_method_not_allowed_stops_the_chain() {
        let mut chain = ModuleChain::new();
        chain.register("/", ping("post").terminal()).unwrap();
        chain.register("/", ping("get")).unwrap();

        let cancel = CancellationSignal::new();
        let err = chain.dispatch(&ctx("/ping"), "/ping", &cancel).await.unwrap_err();
        assert!(matches!(err, HandlerError::Http(e) if e.status() == StatusCode::METHOD_NOT_ALLOWED));
    }

    #[test]
    fn locked_chain_refuses_modules() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut chain = ModuleChain::new();
        chain.lock().unwrap();
        let err = chain.register("/", counting(true, &hits)).unwrap_err();
        assert!(matches!(err, ConfigurationError::Locked));
    }

    #[test]
    fn invalid_base_path_is_rejected() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut chain = ModuleChain::new();
        let err = chain.register("api", counting(true, &hits)).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidBasePath(_)));
    }
}
