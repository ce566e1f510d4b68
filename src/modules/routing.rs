//! Route-table module for plain closures.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::{ConfigurationError, HandlerError};
use crate::http::{HttpContext, HttpException};
use crate::lifecycle::CancellationSignal;
use crate::modules::Module;
use crate::routing::{HttpVerb, Resolution, RouteMatch, RouteMatcher, RouteResolver};

type RouteFn = dyn Fn(HttpContext, RouteMatch) -> BoxFuture<'static, Result<bool, HandlerError>>
    + Send
    + Sync;

/// Dispatches on (verb, pattern) to closures that receive the route values.
///
/// Candidates are tried most specific first; a handler returning `false`
/// lets the next matching route try.
pub struct RoutingModule {
    name: String,
    routes: RouteResolver<Arc<RouteFn>>,
    terminal: bool,
}

impl RoutingModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: RouteResolver::new(),
            terminal: false,
        }
    }

    /// Mark as terminal.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Add an async route.
    pub fn route<F, Fut>(
        &mut self,
        verb: HttpVerb,
        pattern: &str,
        handler: F,
    ) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(HttpContext, RouteMatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, HandlerError>> + Send + 'static,
    {
        let matcher = Arc::new(RouteMatcher::parse(pattern)?);
        let handler: Arc<RouteFn> = Arc::new(
            move |ctx: HttpContext, route: RouteMatch| -> BoxFuture<'static, Result<bool, HandlerError>> {
                Box::pin(handler(ctx, route))
            },
        );
        self.routes.add(verb, matcher, handler)?;
        Ok(self)
    }

    /// Add a route whose handler does not suspend.
    pub fn route_sync<F>(
        &mut self,
        verb: HttpVerb,
        pattern: &str,
        handler: F,
    ) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(&HttpContext, &RouteMatch) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        self.route(verb, pattern, move |ctx, route| {
            let result = handler(&ctx, &route);
            async move { result }
        })
    }

    pub fn get<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(&HttpContext, &RouteMatch) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        self.route_sync(HttpVerb::Get, pattern, handler)
    }

    pub fn post<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(&HttpContext, &RouteMatch) -> Result<bool, HandlerError> + Send + Sync + 'static,
    {
        self.route_sync(HttpVerb::Post, pattern, handler)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[async_trait]
impl Module for RoutingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_final_handler(&self) -> bool {
        self.terminal
    }

    fn on_configuration_locking(&mut self) -> Result<(), ConfigurationError> {
        self.routes.seal();
        Ok(())
    }

    async fn try_handle(
        &self,
        ctx: &HttpContext,
        path: &str,
        cancel: &CancellationSignal,
    ) -> Result<bool, HandlerError> {
        match self.routes.resolve(ctx.request().method(), path) {
            Resolution::Matched(candidates) => {
                for (entry, route) in candidates {
                    let handled = cancel.guard((entry.handler)(ctx.clone(), route)).await??;
                    if handled {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Resolution::MethodNotAllowed(allowed) => {
                Err(HttpException::method_not_allowed(&allowed).into())
            }
            Resolution::NotFound => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use axum::http::{header, Method, StatusCode};

    fn ctx(method: Method, path: &str) -> HttpContext {
        HttpContext::detached(HttpRequest::new(method, path.parse().unwrap()))
    }

    fn module() -> RoutingModule {
        let mut module = RoutingModule::new("items");
        module
            .get("/items/{id:[0-9]+}", |ctx, route| {
                let id = route.by_name("id").unwrap_or_default().to_string();
                ctx.response().write_text(&id, "text/plain");
                Ok(true)
            })
            .unwrap()
            .post("/items", |_ctx, _route| Ok(true))
            .unwrap();
        module.on_configuration_locking().unwrap();
        module
    }

    #[tokio::test]
    async fn passes_route_values() {
        let ctx = ctx(Method::GET, "/items/42");
        let handled = module()
            .try_handle(&ctx, "/items/42", &CancellationSignal::new())
            .await
            .unwrap();
        assert!(handled);
        assert_eq!(ctx.response().body(), b"42");
    }

    #[tokio::test]
    async fn wrong_verb_raises_405() {
        let ctx = ctx(Method::DELETE, "/items");
        let err = module()
            .try_handle(&ctx, "/items", &CancellationSignal::new())
            .await
            .unwrap_err();
        match err {
            HandlerError::Http(e) => {
                assert_eq!(e.status(), StatusCode::METHOD_NOT_ALLOWED);
                assert_eq!(e.headers()[header::ALLOW], "POST");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_path_is_not_handled() {
        let ctx = ctx(Method::GET, "/items/abc");
        let handled = module()
            .try_handle(&ctx, "/items/abc", &CancellationSignal::new())
            .await
            .unwrap();
        assert!(!handled);
    }

    #[test]
    fn duplicate_route_is_a_configuration_error() {
        let mut module = RoutingModule::new("dup");
        module.get("/a", |_, _| Ok(true)).unwrap();
        let err = module.get("/a", |_, _| Ok(true)).err().unwrap();
        assert!(matches!(err, ConfigurationError::DuplicateRoute { .. }));
    }
}
