//! Turns one controller method into a reusable dispatch function.
//!
//! # Data Flow
//! ```text
//! Registration (once per route):
//!     ParamList::compile → bindings (providers, converters, defaults resolved)
//!     Action::ASYNC + ActionValue::KIND → ResultKind
//!
//! Request (per call of the CompiledHandler):
//!     factory() → ControllerGuard
//!     → attach(scope) → on_before_handler()
//!     → bind arguments (suspends on providers)
//!     → invoke (suspends if async)
//!     → dispose (exactly once; also on error, panic or cancel)
//!     → Outcome: handled flag | serialize then handled | handled
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::{ConfigurationError, HandlerError};
use crate::http::HttpContext;
use crate::lifecycle::CancellationSignal;
use crate::routing::{RouteMatch, RouteMatcher};
use crate::webapi::action::{Action, ActionValue, Outcome, ResultKind};
use crate::webapi::controller::{Controller, ControllerGuard, ControllerScope};
use crate::webapi::conversion::ConversionRegistry;
use crate::webapi::params::{BindingContext, ParamList};
use crate::webapi::providers::ProviderRegistry;
use crate::webapi::serializer::ResponseSerializer;

/// Dispatch function produced for one route.
pub type CompiledHandler = Arc<
    dyn Fn(HttpContext, RouteMatch, CancellationSignal) -> BoxFuture<'static, Result<bool, HandlerError>>
        + Send
        + Sync,
>;

/// Builds a fresh controller for each request.
pub type ControllerFactory<C> = Arc<dyn Fn() -> C + Send + Sync>;

/// Everything compilation needs besides the method itself.
pub struct CompileInput<'r, C> {
    pub controller: &'static str,
    pub method: &'r str,
    pub matcher: &'r RouteMatcher,
    pub providers: &'r ProviderRegistry,
    pub conversions: &'r ConversionRegistry,
    pub serializer: Arc<dyn ResponseSerializer>,
    pub factory: ControllerFactory<C>,
}

/// Compile `action` with arguments described by `params`.
pub fn compile<C, P, A, T>(
    input: CompileInput<'_, C>,
    params: P,
    action: A,
) -> Result<(CompiledHandler, ResultKind), ConfigurationError>
where
    C: Controller,
    P: ParamList<C>,
    A: Action<C, P::Args, T>,
    T: ActionValue,
{
    let cx = BindingContext {
        controller: input.controller,
        method: input.method,
        matcher: input.matcher,
        providers: input.providers,
        conversions: input.conversions,
        _controller: PhantomData,
    };
    let plan = Arc::new(params.compile(&cx)?);
    let action = Arc::new(action);
    let factory = input.factory;
    let serializer = input.serializer;
    let kind = ResultKind::new(A::ASYNC, T::KIND);

    let handler: CompiledHandler = Arc::new(
        move |ctx: HttpContext,
              route: RouteMatch,
              cancel: CancellationSignal|
              -> BoxFuture<'static, Result<bool, HandlerError>> {
            let plan = Arc::clone(&plan);
            let action = Arc::clone(&action);
            let factory = Arc::clone(&factory);
            let serializer = Arc::clone(&serializer);
            Box::pin(async move {
                let mut controller = ControllerGuard::new(factory());
                controller.attach(ControllerScope {
                    context: ctx.clone(),
                    route: route.clone(),
                    cancel: cancel.clone(),
                });
                controller.on_before_handler()?;

                let args = cancel
                    .guard(P::bind(&plan, &controller, &ctx, &route))
                    .await??;
                let value = cancel
                    .guard(action.invoke(&mut controller, args))
                    .await??;
                controller.finish();

                match value.into_outcome()? {
                    Outcome::Handled(handled) => Ok(handled),
                    Outcome::Serialize(value) => {
                        cancel
                            .guard(serializer.serialize(&ctx, value, &cancel))
                            .await??;
                        Ok(true)
                    }
                    Outcome::Completed => Ok(true),
                }
            })
        },
    );

    Ok((handler, kind))
}
