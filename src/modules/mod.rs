//! Module subsystem.
//!
//! # Data Flow
//! ```text
//! HttpContext + raw path
//!     → chain.rs (ModuleChain: registration order, base-path prefix)
//!     → Module::try_handle(ctx, relative path, cancel)
//!          action.rs   (ActionModule: closure passthrough)
//!          group.rs    (ModuleGroup: nested chain)
//!          routing.rs  (RoutingModule: pattern + verb → closure)
//!          webapi      (WebApiModule: compiled controller methods)
//!     → handled? / terminal? → stop or try the next module
//! ```
//!
//! # Design Decisions
//! - One trait, a closed set of variants, composed by ownership
//! - The chain is locked before the server listens and read-only afterwards

pub mod action;
pub mod chain;
pub mod group;
pub mod routing;

use async_trait::async_trait;

use crate::error::{ConfigurationError, HandlerError};
use crate::http::HttpContext;
use crate::lifecycle::CancellationSignal;

pub use action::ActionModule;
pub use chain::ModuleChain;
pub use group::ModuleGroup;
pub use routing::RoutingModule;

/// A unit of request-handling logic mounted under a base path.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// A terminal module owns its path space: no later module is tried
    /// after it runs, whether or not it handled the request.
    fn is_final_handler(&self) -> bool {
        false
    }

    /// Called once while the server leaves `Created`. Last chance to
    /// validate and freeze internal tables.
    fn on_configuration_locking(&mut self) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Called once after locking, before the first request.
    async fn start(&self, _cancel: &CancellationSignal) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Try to answer the request. `path` is relative to the module's base
    /// path and always starts with `/`.
    async fn try_handle(
        &self,
        ctx: &HttpContext,
        path: &str,
        cancel: &CancellationSignal,
    ) -> Result<bool, HandlerError>;
}
