//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! HttpContext::session() (first call only)
//!     → proxy.rs (SessionProxy caches the handle for the request)
//!     → manager.rs (cookie lookup, or create + Set-Cookie)
//!     → session.rs (shared, internally synchronized key/value store)
//! ```
//!
//! # Design Decisions
//! - The session is the only state shared across requests of one client
//! - Lazy: requests that never read the session never create one

pub mod manager;
pub mod proxy;
#[allow(clippy::module_inception)]
pub mod session;

pub use manager::{LocalSessionManager, SessionManager};
pub use proxy::SessionProxy;
pub use session::Session;
