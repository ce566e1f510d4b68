//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (before the server starts):
//!     pattern string
//!     → matcher.rs (parse into RouteMatcher, reject malformed patterns)
//!     → router.rs (RouteResolver: reject duplicates, order by specificity)
//!
//! Request:
//!     raw path relative to the module base (base_path.rs)
//!     → router.rs (candidate routes for the verb)
//!     → Matched(route values) | MethodNotAllowed | NotFound
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Regex only for constrained or mixed segments
//! - Deterministic: same input always matches same route
//! - Not-found and method-not-allowed are distinct outcomes

pub mod base_path;
pub mod matcher;
pub mod router;
pub mod verb;

pub use base_path::{normalize_base_path, relative_path};
pub use matcher::{RouteMatch, RouteMatcher, RoutePatternError};
pub use router::{Resolution, RouteEntry, RouteResolver};
pub use verb::HttpVerb;
