//! Transports that feed the dispatch loop.
//!
//! # Responsibilities
//! - Bind the configured address and serve HTTP/1.1 and HTTP/2 via Axum
//! - Buffer each request body and hand the request to the dispatch loop
//! - Carry the finished response back to the waiting connection
//! - Report transport failures as transient or fatal
//!
//! # Design Decisions
//! - The accept queue is a bounded channel; a full queue applies backpressure
//!   to connection tasks instead of growing without limit
//! - A request whose responder is dropped without a response is answered
//!   by the transport with 503; the dispatch loop never writes it

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::HttpRequest;
use crate::lifecycle::CancellationSignal;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to accept a single connection; the listener keeps running.
    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    /// The transport stopped producing requests.
    #[error("transport closed: {0}")]
    Closed(String),

    /// The HTTP server task failed with an I/O error.
    #[error("HTTP server task failed: {0}")]
    Serve(#[source] std::io::Error),
}

impl ListenerError {
    /// Fatal errors stop the accept loop; others are logged and skipped.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ListenerError::Accept(_))
    }
}

/// Sends the finished response back to the transport.
#[derive(Debug)]
pub struct Responder {
    tx: oneshot::Sender<Response>,
}

impl Responder {
    pub fn channel() -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Deliver the response. Returns false if the client went away.
    pub fn send(self, response: Response) -> bool {
        self.tx.send(response).is_ok()
    }
}

/// A request accepted by a transport, waiting to be dispatched.
#[derive(Debug)]
pub struct IncomingRequest {
    pub request: HttpRequest,
    pub responder: Responder,
}

/// Source of incoming requests for the dispatch loop.
#[async_trait]
pub trait Listener: Send {
    /// Wait for the next request.
    async fn accept(&mut self) -> Result<IncomingRequest, ListenerError>;

    /// Local address, for transports bound to a socket.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

#[derive(Clone)]
struct ForwardState {
    tx: mpsc::Sender<IncomingRequest>,
    max_body_bytes: usize,
}

/// Axum-backed TCP transport.
pub struct HttpListener {
    rx: mpsc::Receiver<IncomingRequest>,
    local_addr: SocketAddr,
    server: Option<JoinHandle<std::io::Result<()>>>,
    shutdown: CancellationSignal,
}

impl HttpListener {
    /// Bind to the configured address.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ListenerError> {
        let addr = &config.listener.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        Self::from_tcp(listener, config)
    }

    /// Serve on an already bound socket.
    pub fn from_tcp(listener: TcpListener, config: &ServerConfig) -> Result<Self, ListenerError> {
        let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
            addr: config.listener.bind_address.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel(config.listener.max_pending_requests.max(1));
        let state = ForwardState {
            tx,
            max_body_bytes: config.limits.max_body_bytes,
        };
        let app = Self::build_router(config, state)
            .into_make_service_with_connect_info::<SocketAddr>();

        let shutdown = CancellationSignal::new();
        let stop = shutdown.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        });

        tracing::info!(
            address = %local_addr,
            max_pending_requests = config.listener.max_pending_requests,
            "Listener bound"
        );

        Ok(Self {
            rx,
            local_addr,
            server: Some(server),
            shutdown,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: ForwardState) -> Router {
        Router::new()
            .fallback(forward)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.limits.request_timeout_secs,
                    ))),
            )
    }
}

#[async_trait]
impl Listener for HttpListener {
    async fn accept(&mut self) -> Result<IncomingRequest, ListenerError> {
        if let Some(incoming) = self.rx.recv().await {
            return Ok(incoming);
        }
        match self.server.take() {
            Some(server) => Err(server_exit_error(server.await)),
            None => Err(ListenerError::Closed("HTTP server task exited".to_string())),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}

impl Drop for HttpListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if self.server.as_ref().is_some_and(JoinHandle::is_finished) {
            tracing::debug!(address = %self.local_addr, "HTTP server task already finished");
        }
    }
}

/// Why the request channel closed, from the server task's exit.
fn server_exit_error(exit: Result<std::io::Result<()>, JoinError>) -> ListenerError {
    match exit {
        Ok(Err(e)) => ListenerError::Serve(e),
        Ok(Ok(())) => ListenerError::Closed("HTTP server task exited".to_string()),
        Err(e) if e.is_panic() => ListenerError::Closed("HTTP server task panicked".to_string()),
        Err(e) => ListenerError::Closed(format!("HTTP server task stopped: {e}")),
    }
}

/// Fallback handler: buffer the request and wait for the dispatch loop.
async fn forward(
    State(state): State<ForwardState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(peer_addr = %remote, error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let (responder, response) = Responder::channel();
    let incoming = IncomingRequest {
        request: HttpRequest::from_parts(parts, body, Some(remote)),
        responder,
    };
    if state.tx.send(incoming).await.is_err() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
    }

    match response.await {
        Ok(response) => response,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

type ChannelItem = Result<IncomingRequest, ListenerError>;

/// In-memory transport, used to drive the dispatch loop without sockets.
pub struct ChannelListener {
    rx: mpsc::Receiver<ChannelItem>,
}

/// Producer side of a [`ChannelListener`].
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<ChannelItem>,
}

impl ChannelListener {
    pub fn new(capacity: usize) -> (ChannelSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (ChannelSender { tx }, Self { rx })
    }
}

#[async_trait]
impl Listener for ChannelListener {
    async fn accept(&mut self) -> Result<IncomingRequest, ListenerError> {
        match self.rx.recv().await {
            Some(item) => item,
            None => Err(ListenerError::Closed("all senders dropped".to_string())),
        }
    }
}

impl ChannelSender {
    /// Queue a request; the receiver yields its response, or an error if
    /// the request was abandoned.
    pub async fn send(
        &self,
        request: HttpRequest,
    ) -> Result<oneshot::Receiver<Response>, ListenerError> {
        let (responder, response) = Responder::channel();
        self.tx
            .send(Ok(IncomingRequest { request, responder }))
            .await
            .map_err(|_| ListenerError::Closed("listener dropped".to_string()))?;
        Ok(response)
    }

    /// Inject a transport failure.
    pub async fn fail(&self, error: ListenerError) -> Result<(), ListenerError> {
        self.tx
            .send(Err(error))
            .await
            .map_err(|_| ListenerError::Closed("listener dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn only_accept_errors_are_transient() {
        let accept = ListenerError::Accept(std::io::Error::other("reset"));
        assert!(!accept.is_fatal());
        assert!(ListenerError::Closed("gone".into()).is_fatal());
    }

    #[tokio::test]
    async fn channel_listener_round_trip() {
        let (sender, mut listener) = ChannelListener::new(4);
        let response = sender
            .send(HttpRequest::new(Method::GET, "/x".parse().unwrap()))
            .await
            .unwrap();

        let incoming = listener.accept().await.unwrap();
        assert_eq!(incoming.request.path(), "/x");
        assert!(incoming.responder.send(StatusCode::NO_CONTENT.into_response()));
        assert_eq!(response.await.unwrap().status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn server_failure_is_reported_with_its_cause() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let server = tokio::spawn(async { Err(std::io::Error::other("accept loop died")) });
        let mut listener = HttpListener {
            rx,
            local_addr: "127.0.0.1:0".parse().unwrap(),
            server: Some(server),
            shutdown: CancellationSignal::new(),
        };

        let err = listener.accept().await.unwrap_err();
        assert!(err.is_fatal());
        let ListenerError::Serve(source) = &err else {
            panic!("expected a serve error, got {err:?}");
        };
        assert_eq!(source.to_string(), "accept loop died");

        let err = listener.accept().await.unwrap_err();
        assert!(matches!(err, ListenerError::Closed(_)));
    }

    #[tokio::test]
    async fn server_exit_without_error_is_closed() {
        let clean = tokio::spawn(async { Ok::<(), std::io::Error>(()) }).await;
        assert!(matches!(server_exit_error(clean), ListenerError::Closed(_)));

        let panicked: JoinHandle<std::io::Result<()>> = tokio::spawn(async { panic!("boom") });
        match server_exit_error(panicked.await) {
            ListenerError::Closed(reason) => assert!(reason.contains("panicked")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_senders_close_the_listener() {
        let (sender, mut listener) = ChannelListener::new(1);
        drop(sender);
        let err = listener.accept().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
