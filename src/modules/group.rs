//! Nested module chains.

use async_trait::async_trait;

use crate::error::{ConfigurationError, HandlerError};
use crate::http::HttpContext;
use crate::lifecycle::CancellationSignal;
use crate::modules::{Module, ModuleChain};

/// A sub-chain mounted under its own base path.
///
/// Children see paths relative to the group, so a child registered at
/// `/users` inside a group mounted at `/api` answers `/api/users`.
pub struct ModuleGroup {
    name: String,
    chain: ModuleChain,
    terminal: bool,
}

impl ModuleGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: ModuleChain::new(),
            terminal: false,
        }
    }

    pub fn register<M: Module>(&mut self, base_path: &str, module: M) -> Result<(), ConfigurationError> {
        self.chain.register(base_path, module)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<M: Module>(mut self, base_path: &str, module: M) -> Result<Self, ConfigurationError> {
        self.chain.register(base_path, module)?;
        Ok(self)
    }

    /// Mark as terminal.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn chain(&self) -> &ModuleChain {
        &self.chain
    }
}

#[async_trait]
impl Module for ModuleGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_final_handler(&self) -> bool {
        self.terminal
    }

    fn on_configuration_locking(&mut self) -> Result<(), ConfigurationError> {
        self.chain.lock()
    }

    async fn start(&self, cancel: &CancellationSignal) -> Result<(), ConfigurationError> {
        self.chain.start(cancel).await
    }

    async fn try_handle(
        &self,
        ctx: &HttpContext,
        path: &str,
        cancel: &CancellationSignal,
    ) -> Result<bool, HandlerError> {
        self.chain.dispatch(ctx, path, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpRequest;
    use crate::modules::ActionModule;
    use axum::http::Method;

    fn echo_path() -> ActionModule {
        ActionModule::new("echo", |ctx, path| {
            ctx.response().write_text(path, "text/plain");
            Ok(true)
        })
    }

    #[tokio::test]
    async fn nested_base_paths_concatenate() {
        let group = ModuleGroup::new("api").with("/users", echo_path()).unwrap();
        let mut chain = ModuleChain::new();
        chain.register("/api", group).unwrap();
        chain.lock().unwrap();

        let ctx = HttpContext::detached(HttpRequest::new(Method::GET, "/api/users/7".parse().unwrap()));
        let cancel = CancellationSignal::new();
        assert!(chain.dispatch(&ctx, "/api/users/7", &cancel).await.unwrap());
        assert_eq!(ctx.response().body(), b"/7");

        assert!(!chain.dispatch(&ctx, "/users/7", &cancel).await.unwrap());
    }

    #[test]
    fn locking_the_parent_locks_children() {
        let mut chain = ModuleChain::new();
        chain.register("/g", ModuleGroup::new("g")).unwrap();
        chain.lock().unwrap();
        assert!(chain.is_locked());
    }
}
