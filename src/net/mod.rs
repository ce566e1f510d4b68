//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (Axum serve, request ID, timeout, body limit)
//!     → bounded queue of IncomingRequest
//!     → dispatch loop (http::server)
//!     → connection.rs (RequestTracker guard per spawned request)
//!     → Responder hands the response back to the connection
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each request tracked for graceful shutdown
//! - The dispatch loop sees a `Listener` trait, not sockets

pub mod connection;
pub mod listener;

pub use connection::{RequestGuard, RequestTracker};
pub use listener::{
    ChannelListener, ChannelSender, HttpListener, IncomingRequest, Listener, ListenerError,
    Responder,
};
