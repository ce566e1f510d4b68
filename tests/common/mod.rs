//! Shared helpers for driving a `WebServer` in integration tests.

#![allow(dead_code)]

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::Response;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use modhttp::http::HttpRequest;
use modhttp::net::{ChannelListener, ChannelSender};
use modhttp::{CancellationSignal, ServerError, ServerState, WebServer};

/// A server running on an in-memory listener.
pub struct TestServer {
    pub sender: ChannelSender,
    pub cancel: CancellationSignal,
    pub state: watch::Receiver<ServerState>,
    pub handle: JoinHandle<(WebServer, Result<(), ServerError>)>,
}

impl TestServer {
    /// Start `server` and wait until it is accepting requests.
    pub async fn start(mut server: WebServer) -> Self {
        let (sender, listener) = ChannelListener::new(16);
        let cancel = CancellationSignal::new();
        let mut state = server.state_receiver();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = server.run(listener, run_cancel).await;
            (server, result)
        });
        wait_for_state(&mut state, ServerState::Listening).await;
        Self {
            sender,
            cancel,
            state,
            handle,
        }
    }

    /// Send a request and wait for its response.
    pub async fn send(&self, request: HttpRequest) -> Response {
        let rx = self.sender.send(request).await.expect("listener is running");
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("response within 5s")
            .expect("request was not abandoned")
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(request(Method::GET, uri)).await
    }

    /// Cancel the root signal and wait for `run` to return.
    pub async fn stop(self) -> (WebServer, Result<(), ServerError>) {
        self.cancel.cancel();
        self.join().await
    }

    pub async fn join(self) -> (WebServer, Result<(), ServerError>) {
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server stops within 5s")
            .expect("server task did not panic")
    }
}

pub async fn wait_for_state(state: &mut watch::Receiver<ServerState>, target: ServerState) {
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s >= target))
        .await
        .expect("state reached within 5s")
        .expect("state channel open");
}

pub fn request(method: Method, uri: &str) -> HttpRequest {
    HttpRequest::new(method, uri.parse().expect("valid uri"))
}

pub fn with_header(request: HttpRequest, name: &'static str, value: &str) -> HttpRequest {
    request.with_header(
        HeaderName::from_static(name),
        HeaderValue::from_str(value).expect("valid header value"),
    )
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
