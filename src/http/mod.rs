//! HTTP request handling subsystem.
//!
//! # Data Flow
//! ```text
//! IncomingRequest (from net::Listener)
//!     → server.rs (WebServer: accept loop, one task per request)
//!     → context.rs (HttpContext: request, response, session, cancellation)
//!     → module chain (modules::ModuleChain)
//!     → exception.rs (classified / unhandled failure bodies)
//!     → response.rs (buffered response, handed back through the Responder)
//! ```
//!
//! # Design Decisions
//! - Responses are buffered; the transport sends them once the chain is done
//! - Every request is finalized exactly once, whatever failed

pub mod context;
pub mod exception;
pub mod request;
pub mod response;
pub mod server;

pub use context::{HttpContext, ResponseSnapshot};
pub use exception::{
    DefaultUnhandledExceptionHandler, HttpException, HttpExceptionHandler, JsonExceptionHandler,
    PlainTextExceptionHandler, UnhandledExceptionHandler,
};
pub use request::HttpRequest;
pub use response::HttpResponse;
pub use server::{ServerError, WebServer};
