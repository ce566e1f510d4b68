//! Dispatch loop and server lifecycle.
//!
//! # Responsibilities
//! - Walk the lifecycle: Created → Loading → Listening → Stopped
//! - Lock the module chain before the first request
//! - Accept requests from a `Listener` and spawn one task per request
//! - Sort request failures into tiers and answer each accordingly
//! - Always finalize: close the context, log, record metrics, respond
//!
//! # Failure tiers
//! 1. Cancelled: logged at debug, no response is written
//! 2. Classified (`HttpException`, binding errors): status from the error,
//!    body from the `HttpExceptionHandler`
//! 3. Unhandled (any other error, or a panic): 500, caching disabled,
//!    body from the `UnhandledExceptionHandler`
//! 4. Transport: logged, and the accept loop stops
//!
//! Failures while writing an error response are logged, never propagated.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::error::{ConfigurationError, HandlerError};
use crate::http::exception::{
    DefaultUnhandledExceptionHandler, HttpException, HttpExceptionHandler,
    PlainTextExceptionHandler, UnhandledExceptionHandler,
};
use crate::http::HttpContext;
use crate::lifecycle::{CancellationSignal, ServerState, StateMachine};
use crate::modules::{Module, ModuleChain};
use crate::net::{IncomingRequest, Listener, ListenerError, RequestTracker, Responder};
use crate::observability::metrics::{self, FailureTier};
use crate::session::{LocalSessionManager, SessionManager, SessionProxy};

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Errors that end [`WebServer::run`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server already started (state: {0})")]
    AlreadyStarted(ServerState),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Embeddable HTTP server: a module chain behind a dispatch loop.
pub struct WebServer {
    modules: Arc<ModuleChain>,
    state: StateMachine,
    session_manager: Option<Arc<dyn SessionManager>>,
    exception_handler: Arc<dyn HttpExceptionHandler>,
    unhandled_handler: Arc<dyn UnhandledExceptionHandler>,
    tracker: RequestTracker,
    shutdown_grace: Duration,
}

impl WebServer {
    /// Server with no modules, no session store and plain-text error bodies.
    pub fn new() -> Self {
        Self {
            modules: Arc::new(ModuleChain::new()),
            state: StateMachine::new(),
            session_manager: None,
            exception_handler: Arc::new(PlainTextExceptionHandler),
            unhandled_handler: Arc::new(DefaultUnhandledExceptionHandler::default()),
            tracker: RequestTracker::new(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Server configured from the `session` and `errors` sections.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut server = Self::new();
        if config.session.enabled {
            server.session_manager = Some(Arc::new(LocalSessionManager::from_config(&config.session)));
        }
        server.unhandled_handler = Arc::new(DefaultUnhandledExceptionHandler {
            include_details: config.errors.include_details,
        });
        server
    }

    pub fn state(&self) -> ServerState {
        self.state.current()
    }

    /// Observe state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Number of request tasks still running.
    pub fn active_requests(&self) -> usize {
        self.tracker.active_count()
    }

    fn ensure_configurable(&self) -> Result<(), ConfigurationError> {
        if self.state.current().is_locked() {
            Err(ConfigurationError::Locked)
        } else {
            Ok(())
        }
    }

    /// Mutable access to the module chain while the server is `Created`.
    pub fn modules_mut(&mut self) -> Result<&mut ModuleChain, ConfigurationError> {
        self.ensure_configurable()?;
        Arc::get_mut(&mut self.modules).ok_or(ConfigurationError::Locked)
    }

    /// Append a module under `base_path`.
    pub fn register<M: Module>(&mut self, base_path: &str, module: M) -> Result<&mut Self, ConfigurationError> {
        self.modules_mut()?.register(base_path, module)?;
        Ok(self)
    }

    pub fn set_session_manager(&mut self, manager: Arc<dyn SessionManager>) -> Result<&mut Self, ConfigurationError> {
        self.ensure_configurable()?;
        self.session_manager = Some(manager);
        Ok(self)
    }

    pub fn clear_session_manager(&mut self) -> Result<&mut Self, ConfigurationError> {
        self.ensure_configurable()?;
        self.session_manager = None;
        Ok(self)
    }

    pub fn set_exception_handler<H: HttpExceptionHandler + 'static>(
        &mut self,
        handler: H,
    ) -> Result<&mut Self, ConfigurationError> {
        self.ensure_configurable()?;
        self.exception_handler = Arc::new(handler);
        Ok(self)
    }

    pub fn set_unhandled_exception_handler<H: UnhandledExceptionHandler + 'static>(
        &mut self,
        handler: H,
    ) -> Result<&mut Self, ConfigurationError> {
        self.ensure_configurable()?;
        self.unhandled_handler = Arc::new(handler);
        Ok(self)
    }

    /// How long shutdown waits for in-flight requests.
    pub fn set_shutdown_grace(&mut self, grace: Duration) -> Result<&mut Self, ConfigurationError> {
        self.ensure_configurable()?;
        self.shutdown_grace = grace;
        Ok(self)
    }

    /// Run until `cancel` fires or the listener fails fatally.
    ///
    /// A server runs once; a second call returns
    /// [`ServerError::AlreadyStarted`].
    pub async fn run<L: Listener>(&mut self, mut listener: L, cancel: CancellationSignal) -> Result<(), ServerError> {
        let current = self.state.current();
        if current != ServerState::Created {
            return Err(ServerError::AlreadyStarted(current));
        }

        self.state.advance(ServerState::Loading);
        if let Err(e) = self.load(&cancel).await {
            self.state.advance(ServerState::Stopped);
            return Err(e.into());
        }

        let loop_signal = cancel.child();
        let dispatcher = Arc::new(Dispatcher {
            modules: Arc::clone(&self.modules),
            session_manager: self.session_manager.clone(),
            exception_handler: Arc::clone(&self.exception_handler),
            unhandled_handler: Arc::clone(&self.unhandled_handler),
            request_root: cancel.clone(),
            loop_signal: loop_signal.clone(),
        });
        if let Some(manager) = &self.session_manager {
            tokio::spawn(sweep_sessions(Arc::clone(manager), loop_signal.clone()));
        }

        self.state.advance(ServerState::Listening);
        if let Some(addr) = listener.local_addr() {
            tracing::info!(address = %addr, modules = self.modules.len(), "Accepting requests");
        }

        let mut fatal = None;
        loop {
            tokio::select! {
                biased;
                _ = loop_signal.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(incoming) => {
                        let guard = self.tracker.track();
                        let dispatcher = Arc::clone(&dispatcher);
                        tokio::spawn(async move {
                            dispatcher.handle(incoming).await;
                            drop(guard);
                        });
                    }
                    Err(e) if e.is_fatal() => {
                        tracing::error!(error = %e, "Listener failed; stopping accept loop");
                        metrics::record_failure(FailureTier::Transport);
                        loop_signal.cancel();
                        fatal = Some(e);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept request");
                    }
                },
            }
        }
        loop_signal.cancel();
        drop(listener);

        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active_requests = active, "Draining in-flight requests");
        }
        let remaining = self.tracker.drain(self.shutdown_grace).await;
        if remaining > 0 {
            tracing::warn!(remaining_requests = remaining, "Shutdown grace period elapsed");
        }

        self.state.advance(ServerState::Stopped);
        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Lock configuration and start modules.
    async fn load(&mut self, cancel: &CancellationSignal) -> Result<(), ConfigurationError> {
        Arc::get_mut(&mut self.modules)
            .ok_or(ConfigurationError::Locked)?
            .lock()?;
        self.modules.start(cancel).await
    }
}

impl Default for WebServer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WebServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebServer")
            .field("state", &self.state.current())
            .field("modules", &self.modules)
            .field("sessions", &self.session_manager.is_some())
            .finish()
    }
}

async fn sweep_sessions(manager: Arc<dyn SessionManager>, stop: CancellationSignal) {
    let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {
                let purged = manager.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Expired sessions removed");
                }
            }
        }
    }
}

/// Per-request work shared by every spawned task.
struct Dispatcher {
    modules: Arc<ModuleChain>,
    session_manager: Option<Arc<dyn SessionManager>>,
    exception_handler: Arc<dyn HttpExceptionHandler>,
    unhandled_handler: Arc<dyn UnhandledExceptionHandler>,
    /// Parent of every request's signal.
    request_root: CancellationSignal,
    /// Cancelled on a transport failure to stop accepting.
    loop_signal: CancellationSignal,
}

impl Dispatcher {
    async fn handle(&self, incoming: IncomingRequest) {
        let IncomingRequest { request, responder } = incoming;
        let cancel = self.request_root.child();
        let session = match &self.session_manager {
            Some(manager) => SessionProxy::new(Arc::clone(manager)),
            None => SessionProxy::detached(),
        };
        let ctx = HttpContext::new(request, session, cancel.clone());
        let method = ctx.request().method().clone();
        let path = ctx.request_path().to_string();
        let span = tracing::info_span!(
            "request",
            request_id = %ctx.id(),
            method = %method,
            path = %path
        );

        async {
            let result = AssertUnwindSafe(self.run_chain(&ctx, &path, &cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panic_error(panic)));

            if let Err(error) = result {
                let recovered = AssertUnwindSafe(self.handle_failure(&ctx, &path, error, &cancel))
                    .catch_unwind()
                    .await;
                if recovered.is_err() {
                    tracing::error!("Error handler panicked");
                    ctx.response().set_status(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }

            self.finalize(&ctx, &method, responder);
        }
        .instrument(span)
        .await
    }

    async fn run_chain(&self, ctx: &HttpContext, path: &str, cancel: &CancellationSignal) -> Result<(), HandlerError> {
        if self.modules.dispatch(ctx, path, cancel).await? {
            return Ok(());
        }
        tracing::debug!("No module handled the request");
        self.write_classified(ctx, &HttpException::not_found()).await;
        Ok(())
    }

    async fn handle_failure(&self, ctx: &HttpContext, path: &str, error: HandlerError, cancel: &CancellationSignal) {
        match error {
            HandlerError::Cancelled => {
                tracing::debug!("Request cancelled");
                metrics::record_failure(FailureTier::Cancelled);
                ctx.abandon();
            }
            HandlerError::Http(exception) => {
                tracing::warn!(status = exception.status().as_u16(), error = %exception, "Request failed");
                metrics::record_failure(FailureTier::Classified);
                self.write_classified(ctx, &exception).await;
            }
            HandlerError::Binding(e) => {
                tracing::warn!(error = %e, "Request parameter binding failed");
                metrics::record_failure(FailureTier::Classified);
                self.write_classified(ctx, &HttpException::bad_request(e.to_string()))
                    .await;
            }
            HandlerError::Transport(e) => {
                tracing::error!(error = %e, "Transport failure; stopping accept loop");
                metrics::record_failure(FailureTier::Transport);
                self.loop_signal.cancel();
                ctx.abandon();
            }
            HandlerError::Unhandled(e) => {
                tracing::error!(error = %format!("{e:#}"), "Unhandled error");
                metrics::record_failure(FailureTier::Unhandled);
                {
                    let mut response = ctx.response();
                    response.clear_body();
                    response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                    response.disable_caching();
                }
                if let Err(secondary) = self.unhandled_handler.handle(ctx, path, &e, cancel).await {
                    tracing::error!(error = %secondary, "Unhandled exception handler failed");
                }
            }
        }
    }

    /// Status and headers from `exception`, body from the exception handler.
    async fn write_classified(&self, ctx: &HttpContext, exception: &HttpException) {
        exception.prepare_response(&mut ctx.response());
        if let Err(secondary) = self.exception_handler.write(ctx, exception).await {
            tracing::warn!(error = %secondary, "Failed to write error response");
        }
    }

    fn finalize(&self, ctx: &HttpContext, method: &Method, responder: Responder) {
        let Some((response, snapshot)) = ctx.close() else {
            tracing::debug!(elapsed_ms = ctx.elapsed().as_millis() as u64, "Request closed without response");
            return;
        };
        tracing::info!(
            status = snapshot.status.as_u16(),
            bytes = snapshot.body_bytes,
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            "Request completed"
        );
        metrics::record_request(method.as_str(), snapshot.status.as_u16(), snapshot.elapsed);
        if !responder.send(response) {
            tracing::debug!("Client went away before the response was sent");
        }
    }
}

fn panic_error(panic: Box<dyn Any + Send>) -> HandlerError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    HandlerError::Unhandled(anyhow::anyhow!("request handler panicked: {message}"))
}
