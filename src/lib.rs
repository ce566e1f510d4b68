//! Embeddable HTTP server core.
//!
//! Requests flow from a [`net::Listener`] through the [`http::WebServer`]
//! dispatch loop into an ordered [`modules::ModuleChain`]. Controller
//! methods registered on a [`webapi::WebApiModule`] are compiled into
//! dispatch functions when they are registered.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod modules;
pub mod net;
pub mod observability;
pub mod routing;
pub mod session;
pub mod webapi;

pub use config::ServerConfig;
pub use error::{BindingConversionError, ConfigurationError, HandlerError};
pub use http::{HttpContext, HttpException, ServerError, WebServer};
pub use lifecycle::{CancellationSignal, ServerState};
pub use modules::{Module, ModuleChain};
