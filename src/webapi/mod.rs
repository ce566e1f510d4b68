//! Controller dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     WebApiModule::controller(factory)
//!     → ControllerRoutes::route(verb, pattern, method, params, action)
//!     → compiler.rs (params.rs bindings + action.rs result kind)
//!     → RouteResolver entry holding a CompiledHandler
//!
//! Request:
//!     module.rs (resolve verb + path)
//!     → CompiledHandler(ctx, route match, cancel)
//!     → serializer.rs for object results
//! ```
//!
//! # Design Decisions
//! - Everything type-dependent is decided at registration
//! - One controller instance per request, never shared
//! - Providers and converters are looked up once per parameter

pub mod action;
pub mod compiler;
pub mod controller;
pub mod conversion;
pub mod module;
pub mod params;
pub mod providers;
pub mod serializer;

pub use action::{Action, ActionValue, AsyncAction, Json, Outcome, ResultKind, SyncAction, ValueKind};
pub use compiler::{compile, CompileInput, CompiledHandler, ControllerFactory};
pub use controller::{Controller, ControllerScope};
pub use conversion::{ConversionRegistry, Converter};
pub use module::{ControllerRoutes, RouteInfo, WebApiModule};
pub use params::{BindingContext, Param, ParamList};
pub use providers::{DynamicDataProvider, ProviderRegistry, RequestDataProvider};
pub use serializer::{JsonSerializer, ResponseSerializer, TextSerializer};
