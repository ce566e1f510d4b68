//! Parameter declarations and their compiled bindings.
//!
//! # Responsibilities
//! - Describe where each controller-method argument comes from ([`Param`])
//! - Resolve every declaration into a [`Binding`] once, at registration
//! - Produce argument tuples per request from route values, providers,
//!   the query string or the body
//!
//! # Design Decisions
//! - Precedence: injection marker, then route parameter of the same name,
//!   then declared default, then the type's zero value
//! - Missing providers and converters fail registration, never a request
//! - Arguments are bound strictly in declaration order

use std::any::type_name;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::error::{ConfigurationError, HandlerError};
use crate::http::{HttpContext, HttpException};
use crate::routing::{RouteMatch, RouteMatcher};
use crate::webapi::conversion::{apply, ConversionRegistry, Converter};
use crate::webapi::providers::{ProviderRegistry, ResolvedProvider};
use crate::webapi::Controller;

type Fallback<T> = Arc<dyn Fn() -> T + Send + Sync>;
type BodyDecoder<T> = Arc<dyn Fn(&[u8]) -> Result<T, serde_json::Error> + Send + Sync>;

enum Source<T> {
    /// Route parameter with the same name, else the fallback.
    Auto,
    Inject { provider: Option<String> },
    Query { key: String },
    Body { decode: BodyDecoder<T> },
}

/// Declaration of one controller-method argument of type `T`.
pub struct Param<T> {
    name: Cow<'static, str>,
    source: Source<T>,
    fallback: Option<Fallback<T>>,
}

impl<T: Send + 'static> Param<T> {
    /// Bound from the route parameter `name`; registration fails if the
    /// route has no such parameter.
    pub fn required(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            source: Source::Auto,
            fallback: None,
        }
    }

    /// Injected by the first registered provider producing `T` for the
    /// controller.
    pub fn injected(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            source: Source::Inject { provider: None },
            fallback: None,
        }
    }

    /// Injected by the provider registered under `provider`.
    pub fn inject_from(name: impl Into<Cow<'static, str>>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Source::Inject {
                provider: Some(provider.into()),
            },
            fallback: None,
        }
    }

    /// Query-string value `key`, converted like a route value. A missing
    /// key is a 400 unless a default is set.
    pub fn query(key: impl Into<Cow<'static, str>>) -> Self {
        let name = key.into();
        Self {
            source: Source::Query {
                key: name.to_string(),
            },
            name,
            fallback: None,
        }
    }

    /// Value used when the route (or query) does not supply one.
    pub fn with_default(mut self, value: T) -> Self
    where
        T: Clone + Sync,
    {
        self.fallback = Some(Arc::new(move || value.clone()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve this declaration for one route.
    pub(crate) fn compile<C: Controller>(
        self,
        cx: &BindingContext<'_, C>,
    ) -> Result<Binding<C, T>, ConfigurationError> {
        self.resolve(cx).map(|kind| Binding { kind })
    }

    fn resolve<C: Controller>(self, cx: &BindingContext<'_, C>) -> Result<BindingKind<C, T>, ConfigurationError> {
        let name = self.name.into_owned();
        match self.source {
            Source::Inject { provider } => match cx.providers.resolve::<C, T>(provider.as_deref()) {
                Some(ResolvedProvider::Typed(provider)) => Ok(BindingKind::Inject { name, provider }),
                Some(ResolvedProvider::Dynamic(provider)) => {
                    Ok(BindingKind::InjectDynamic { name, provider })
                }
                None => {
                    let reason = match provider {
                        Some(p) => format!("no provider named '{p}' produces {}", type_name::<T>()),
                        None => format!("no registered provider produces {}", type_name::<T>()),
                    };
                    Err(cx.no_binding(&name, reason))
                }
            },
            Source::Query { key } => {
                let converter = cx.converter::<T>(&name)?;
                Ok(BindingKind::Query {
                    name,
                    key,
                    converter,
                    fallback: self.fallback,
                })
            }
            Source::Body { decode } => Ok(BindingKind::Body { name, decode }),
            Source::Auto => {
                if let Some(index) = cx.matcher.position_of(&name) {
                    let converter = cx.converter::<T>(&name)?;
                    Ok(BindingKind::Route {
                        name,
                        index,
                        converter,
                    })
                } else if let Some(fallback) = self.fallback {
                    Ok(BindingKind::Value(fallback))
                } else {
                    let reason = format!(
                        "route '{}' has no parameter of that name and no default is declared",
                        cx.matcher.pattern()
                    );
                    Err(cx.no_binding(&name, reason))
                }
            }
        }
    }
}

impl<T: Default + Send + 'static> Param<T> {
    /// Route parameter `name`, or `T::default()` when the route has none.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        let fallback: Fallback<T> = Arc::new(T::default);
        Self {
            name: name.into(),
            source: Source::Auto,
            fallback: Some(fallback),
        }
    }
}

impl<T: DeserializeOwned + Send + 'static> Param<T> {
    /// Request body decoded as JSON; a malformed body is a 400.
    pub fn json_body(name: impl Into<Cow<'static, str>>) -> Self {
        let decode: BodyDecoder<T> = Arc::new(|bytes| serde_json::from_slice(bytes));
        Self {
            name: name.into(),
            source: Source::Body { decode },
            fallback: None,
        }
    }
}

/// Registration-time view used while compiling parameters.
pub struct BindingContext<'r, C> {
    pub(crate) controller: &'static str,
    pub(crate) method: &'r str,
    pub(crate) matcher: &'r RouteMatcher,
    pub(crate) providers: &'r ProviderRegistry,
    pub(crate) conversions: &'r ConversionRegistry,
    pub(crate) _controller: PhantomData<fn() -> C>,
}

impl<C> BindingContext<'_, C> {
    fn converter<T: 'static>(&self, parameter: &str) -> Result<Converter<T>, ConfigurationError> {
        self.conversions
            .get::<T>()
            .ok_or_else(|| ConfigurationError::MissingConverter {
                parameter: parameter.to_string(),
                type_name: type_name::<T>(),
            })
    }

    fn no_binding(&self, parameter: &str, reason: String) -> ConfigurationError {
        ConfigurationError::NoEligibleBinding {
            controller: self.controller,
            method: self.method.to_string(),
            parameter: parameter.to_string(),
            reason,
        }
    }
}

/// How one argument is produced at request time.
pub struct Binding<C, T> {
    kind: BindingKind<C, T>,
}

enum BindingKind<C, T> {
    Inject {
        name: String,
        provider: Arc<dyn crate::webapi::RequestDataProvider<C, T>>,
    },
    InjectDynamic {
        name: String,
        provider: Arc<dyn crate::webapi::DynamicDataProvider<C>>,
    },
    Route {
        name: String,
        index: usize,
        converter: Converter<T>,
    },
    Query {
        name: String,
        key: String,
        converter: Converter<T>,
        fallback: Option<Fallback<T>>,
    },
    Body {
        name: String,
        decode: BodyDecoder<T>,
    },
    Value(Fallback<T>),
}

impl<C: Controller, T: Send + 'static> Binding<C, T> {
    pub(crate) async fn bind(
        &self,
        controller: &C,
        ctx: &HttpContext,
        route: &RouteMatch,
    ) -> Result<T, HandlerError> {
        match &self.kind {
            BindingKind::Inject { name, provider } => provider.provide(controller, name).await,
            BindingKind::InjectDynamic { name, provider } => {
                let value = provider
                    .provide(controller, std::any::TypeId::of::<T>(), name)
                    .await?;
                value.downcast::<T>().map(|v| *v).map_err(|_| {
                    HandlerError::Unhandled(anyhow::anyhow!(
                        "provider returned a value that is not {} for parameter '{name}'",
                        type_name::<T>()
                    ))
                })
            }
            BindingKind::Route {
                name,
                index,
                converter,
            } => {
                let raw = route.get(*index).ok_or_else(|| {
                    HandlerError::Unhandled(anyhow::anyhow!(
                        "route match has no value at position {index} for parameter '{name}'"
                    ))
                })?;
                Ok(apply(converter, name, raw)?)
            }
            BindingKind::Query {
                name,
                key,
                converter,
                fallback,
            } => match (ctx.request().query_value(key), fallback) {
                (Some(raw), _) => Ok(apply(converter, name, &raw)?),
                (None, Some(fallback)) => Ok(fallback()),
                (None, None) => Err(HttpException::bad_request(format!(
                    "missing query parameter '{key}'"
                ))
                .into()),
            },
            BindingKind::Body { name, decode } => decode(ctx.request().body()).map_err(|e| {
                HttpException::bad_request(format!("invalid body for parameter '{name}': {e}"))
                    .into()
            }),
            BindingKind::Value(fallback) => Ok(fallback()),
        }
    }
}

/// A tuple of [`Param`]s matching a controller method's arguments.
pub trait ParamList<C: Controller>: Send + 'static {
    /// The argument tuple passed to the method.
    type Args: Send + 'static;
    /// Compiled bindings, one per argument.
    type Plan: Send + Sync + 'static;

    fn names(&self) -> Vec<String>;

    fn compile(self, cx: &BindingContext<'_, C>) -> Result<Self::Plan, ConfigurationError>;

    fn bind<'a>(
        plan: &'a Self::Plan,
        controller: &'a C,
        ctx: &'a HttpContext,
        route: &'a RouteMatch,
    ) -> BoxFuture<'a, Result<Self::Args, HandlerError>>;
}

macro_rules! impl_param_list {
    ($(($T:ident, $p:ident)),*) => {
        impl<C: Controller, $($T: Send + 'static),*> ParamList<C> for ($(Param<$T>,)*) {
            type Args = ($($T,)*);
            type Plan = ($(Binding<C, $T>,)*);

            fn names(&self) -> Vec<String> {
                let ($($p,)*) = self;
                vec![$($p.name().to_string()),*]
            }

            #[allow(unused_variables)]
            fn compile(self, cx: &BindingContext<'_, C>) -> Result<Self::Plan, ConfigurationError> {
                let ($($p,)*) = self;
                Ok(($($p.compile(cx)?,)*))
            }

            #[allow(unused_variables)]
            fn bind<'a>(
                plan: &'a Self::Plan,
                controller: &'a C,
                ctx: &'a HttpContext,
                route: &'a RouteMatch,
            ) -> BoxFuture<'a, Result<Self::Args, HandlerError>> {
                Box::pin(async move {
                    let ($($p,)*) = plan;
                    Ok(($($p.bind(controller, ctx, route).await?,)*))
                })
            }
        }
    };
}

impl_param_list!();
impl_param_list!((A, a));
impl_param_list!((A, a), (B, b));
impl_param_list!((A, a), (B, b), (D, d));
impl_param_list!((A, a), (B, b), (D, d), (E, e));
impl_param_list!((A, a), (B, b), (D, d), (E, e), (F, f));
impl_param_list!((A, a), (B, b), (D, d), (E, e), (F, f), (G, g));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use crate::webapi::ControllerScope;
    use axum::http::{Method, StatusCode};

    struct Noop;
    impl Controller for Noop {
        fn attach(&mut self, _scope: ControllerScope) {}
    }

    struct Fixture {
        matcher: RouteMatcher,
        providers: ProviderRegistry,
        conversions: ConversionRegistry,
    }

    impl Fixture {
        fn new(pattern: &str) -> Self {
            Self {
                matcher: RouteMatcher::parse(pattern).unwrap(),
                providers: ProviderRegistry::new(),
                conversions: ConversionRegistry::default(),
            }
        }

        fn cx(&self) -> BindingContext<'_, Noop> {
            BindingContext {
                controller: "Noop",
                method: "act",
                matcher: &self.matcher,
                providers: &self.providers,
                conversions: &self.conversions,
                _controller: PhantomData,
            }
        }
    }

    fn ctx(uri: &str) -> HttpContext {
        HttpContext::detached(HttpRequest::new(Method::POST, uri.parse().unwrap()))
    }

    #[tokio::test]
    async fn route_value_beats_default() {
        let fixture = Fixture::new("/items/{id}");
        let plan = (Param::<u32>::named("id"), Param::<u32>::named("page").with_default(1))
            .compile(&fixture.cx())
            .unwrap();
        let route = fixture.matcher.try_match("/items/9").unwrap();

        let args = <(Param<u32>, Param<u32>) as ParamList<Noop>>::bind(&plan, &Noop, &ctx("/items/9"), &route)
            .await
            .unwrap();
        assert_eq!(args, (9, 1));
    }

    #[tokio::test]
    async fn zero_value_when_nothing_else_applies() {
        let fixture = Fixture::new("/x");
        let plan = (Param::<String>::named("missing"),).compile(&fixture.cx()).unwrap();
        let args = <(Param<String>,) as ParamList<Noop>>::bind(&plan, &Noop, &ctx("/x"), &RouteMatch::empty())
            .await
            .unwrap();
        assert_eq!(args.0, "");
    }

    #[tokio::test]
    async fn conversion_failure_names_parameter() {
        let fixture = Fixture::new("/items/{id}");
        let plan = (Param::<u32>::named("id"),).compile(&fixture.cx()).unwrap();
        let route = fixture.matcher.try_match("/items/abc").unwrap();

        let err = <(Param<u32>,) as ParamList<Noop>>::bind(&plan, &Noop, &ctx("/items/abc"), &route)
            .await
            .unwrap_err();
        match err {
            HandlerError::Binding(e) => assert_eq!(e.parameter, "id"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_and_body_sources() {
        let fixture = Fixture::new("/search");
        let plan = (Param::<u16>::query("page"), Param::<serde_json::Value>::json_body("filter"))
            .compile(&fixture.cx())
            .unwrap();
        let request = HttpRequest::new(Method::POST, "/search?page=3".parse().unwrap())
            .with_body(r#"{"tag":"rust"}"#);
        let ctx = HttpContext::detached(request);

        let (page, filter) =
            <(Param<u16>, Param<serde_json::Value>) as ParamList<Noop>>::bind(&plan, &Noop, &ctx, &RouteMatch::empty())
                .await
                .unwrap();
        assert_eq!(page, 3);
        assert_eq!(filter["tag"], "rust");
    }

    #[tokio::test]
    async fn missing_query_is_bad_request() {
        let fixture = Fixture::new("/search");
        let plan = (Param::<u16>::query("page"),).compile(&fixture.cx()).unwrap();
        let err = <(Param<u16>,) as ParamList<Noop>>::bind(&plan, &Noop, &ctx("/search"), &RouteMatch::empty())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn injection_without_provider_fails_registration() {
        let fixture = Fixture::new("/x");
        let err = (Param::<u64>::injected("user_id"),)
            .compile(&fixture.cx())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigurationError::NoEligibleBinding { .. }));
    }

    #[test]
    fn required_parameter_needs_route_value() {
        let fixture = Fixture::new("/x");
        let err = (Param::<u64>::required("id"),).compile(&fixture.cx()).err().unwrap();
        assert!(matches!(err, ConfigurationError::NoEligibleBinding { .. }));
    }

    #[test]
    fn missing_converter_fails_registration() {
        #[derive(Default)]
        struct Opaque;
        let fixture = Fixture::new("/x/{thing}");
        let err = (Param::<Opaque>::named("thing"),).compile(&fixture.cx()).err().unwrap();
        assert!(matches!(err, ConfigurationError::MissingConverter { .. }));
    }
}
