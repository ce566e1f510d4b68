//! Controller-dispatch module.

use std::any::{type_name, TypeId};
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ConfigurationError, HandlerError};
use crate::http::{HttpContext, HttpException};
use crate::lifecycle::CancellationSignal;
use crate::modules::Module;
use crate::routing::{HttpVerb, Resolution, RouteMatcher, RouteResolver};
use crate::webapi::action::{Action, ActionValue, ResultKind};
use crate::webapi::compiler::{compile, CompileInput, CompiledHandler, ControllerFactory};
use crate::webapi::controller::Controller;
use crate::webapi::conversion::ConversionRegistry;
use crate::webapi::params::ParamList;
use crate::webapi::providers::{DynamicDataProvider, ProviderRegistry, RequestDataProvider};
use crate::webapi::serializer::{JsonSerializer, ResponseSerializer};

struct CompiledRoute {
    controller: &'static str,
    method: String,
    parameters: Vec<String>,
    kind: ResultKind,
    handler: CompiledHandler,
}

/// Description of a registered controller route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub verb: HttpVerb,
    pub pattern: String,
    pub controller: &'static str,
    pub method: String,
    pub parameters: Vec<String>,
    pub kind: ResultKind,
}

/// Routes requests to compiled controller methods.
///
/// Providers and converters must be registered before the routes that use
/// them, since each route is compiled when it is added.
pub struct WebApiModule {
    name: String,
    routes: RouteResolver<CompiledRoute>,
    controllers: HashSet<TypeId>,
    providers: ProviderRegistry,
    conversions: ConversionRegistry,
    serializer: Arc<dyn ResponseSerializer>,
    terminal: bool,
}

impl WebApiModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: RouteResolver::new(),
            controllers: HashSet::new(),
            providers: ProviderRegistry::new(),
            conversions: ConversionRegistry::default(),
            serializer: Arc::new(JsonSerializer::default()),
            terminal: false,
        }
    }

    /// Replace the response serializer.
    ///
    /// Every route of a module shares one serializer, so this is refused
    /// once a controller has been registered.
    pub fn with_serializer<S: ResponseSerializer>(mut self, serializer: S) -> Result<Self, ConfigurationError> {
        if !self.controllers.is_empty() || !self.routes.is_empty() {
            return Err(ConfigurationError::Module {
                module: self.name,
                reason: "serializer must be set before controllers are registered".to_string(),
            });
        }
        self.serializer = Arc::new(serializer);
        Ok(self)
    }

    /// Mark as terminal.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn conversions_mut(&mut self) -> &mut ConversionRegistry {
        &mut self.conversions
    }

    pub fn providers_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.providers
    }

    /// Register a typed provider for `T` parameters of controller `C`.
    pub fn provide<C, T, P>(&mut self, provider: P) -> &mut Self
    where
        C: Controller,
        T: Send + 'static,
        P: RequestDataProvider<C, T>,
    {
        self.providers.register::<C, T, P>(provider);
        self
    }

    pub fn provide_dynamic<C, P>(&mut self, provider: P) -> &mut Self
    where
        C: Controller,
        P: DynamicDataProvider<C>,
    {
        self.providers.register_dynamic::<C, P>(provider);
        self
    }

    /// Start registering routes for controller `C`.
    ///
    /// Each controller type may be registered once per module.
    pub fn controller<C, F>(&mut self, factory: F) -> Result<ControllerRoutes<'_, C>, ConfigurationError>
    where
        C: Controller,
        F: Fn() -> C + Send + Sync + 'static,
    {
        if self.routes.is_sealed() {
            return Err(ConfigurationError::Locked);
        }
        if !self.controllers.insert(TypeId::of::<C>()) {
            return Err(ConfigurationError::InvalidControllerType {
                controller: type_name::<C>(),
                reason: "already registered in this module",
            });
        }
        Ok(ControllerRoutes {
            module: self,
            factory: Arc::new(factory),
        })
    }

    /// Registered routes in dispatch order (after locking) or registration
    /// order (before).
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.routes
            .entries()
            .iter()
            .map(|entry| RouteInfo {
                verb: entry.verb,
                pattern: entry.matcher.pattern().to_string(),
                controller: entry.handler.controller,
                method: entry.handler.method.clone(),
                parameters: entry.handler.parameters.clone(),
                kind: entry.handler.kind,
            })
            .collect()
    }
}

/// Route registration for one controller type.
pub struct ControllerRoutes<'m, C> {
    module: &'m mut WebApiModule,
    factory: ControllerFactory<C>,
}

impl<C: Controller> ControllerRoutes<'_, C> {
    /// Bind `action` to `verb` + `pattern`. `method` names the action in
    /// logs and errors.
    pub fn route<P, A, T>(
        &mut self,
        verb: HttpVerb,
        pattern: &str,
        method: &str,
        params: P,
        action: A,
    ) -> Result<&mut Self, ConfigurationError>
    where
        P: ParamList<C>,
        A: Action<C, P::Args, T>,
        T: ActionValue,
    {
        let matcher = Arc::new(RouteMatcher::parse(pattern)?);
        let parameters = params.names();
        let input = CompileInput {
            controller: type_name::<C>(),
            method,
            matcher: &matcher,
            providers: &self.module.providers,
            conversions: &self.module.conversions,
            serializer: Arc::clone(&self.module.serializer),
            factory: Arc::clone(&self.factory),
        };
        let (handler, kind) = compile(input, params, action)?;

        self.module.routes.add(
            verb,
            Arc::clone(&matcher),
            CompiledRoute {
                controller: type_name::<C>(),
                method: method.to_string(),
                parameters,
                kind,
                handler,
            },
        )?;
        tracing::debug!(
            module = %self.module.name,
            controller = type_name::<C>(),
            method,
            verb = %verb,
            pattern,
            kind = %kind,
            "Controller route compiled"
        );
        Ok(self)
    }

    pub fn get<P, A, T>(&mut self, pattern: &str, method: &str, params: P, action: A) -> Result<&mut Self, ConfigurationError>
    where
        P: ParamList<C>,
        A: Action<C, P::Args, T>,
        T: ActionValue,
    {
        self.route(HttpVerb::Get, pattern, method, params, action)
    }

    pub fn post<P, A, T>(&mut self, pattern: &str, method: &str, params: P, action: A) -> Result<&mut Self, ConfigurationError>
    where
        P: ParamList<C>,
        A: Action<C, P::Args, T>,
        T: ActionValue,
    {
        self.route(HttpVerb::Post, pattern, method, params, action)
    }

    pub fn put<P, A, T>(&mut self, pattern: &str, method: &str, params: P, action: A) -> Result<&mut Self, ConfigurationError>
    where
        P: ParamList<C>,
        A: Action<C, P::Args, T>,
        T: ActionValue,
    {
        self.route(HttpVerb::Put, pattern, method, params, action)
    }

    pub fn delete<P, A, T>(&mut self, pattern: &str, method: &str, params: P, action: A) -> Result<&mut Self, ConfigurationError>
    where
        P: ParamList<C>,
        A: Action<C, P::Args, T>,
        T: ActionValue,
    {
        self.route(HttpVerb::Delete, pattern, method, params, action)
    }
}

#[async_trait]
impl Module for WebApiModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_final_handler(&self) -> bool {
        self.terminal
    }

    fn on_configuration_locking(&mut self) -> Result<(), ConfigurationError> {
        self.routes.seal();
        tracing::debug!(module = %self.name, routes = self.routes.len(), "Route table sealed");
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
                    let handled = (entry.handler.handler)(ctx.clone(), route, cancel.clone()).await?;
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
