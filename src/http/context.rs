//! Per-request context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::http::{Method, StatusCode};
use axum::response::Response;
use uuid::Uuid;

use crate::http::{HttpRequest, HttpResponse};
use crate::lifecycle::CancellationSignal;
use crate::session::{Session, SessionProxy};

/// Handle to one in-flight request.
///
/// Clones are cheap and refer to the same request, response and session.
/// Created by the dispatch loop and closed exactly once when the response
/// is handed back to the transport.
#[derive(Clone)]
pub struct HttpContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: String,
    request: HttpRequest,
    path: String,
    response: Mutex<HttpResponse>,
    session: SessionProxy,
    cancel: CancellationSignal,
    started: Instant,
    closed: AtomicBool,
}

/// Status and size of a response at close time, for logging.
#[derive(Debug, Clone, Copy)]
pub struct ResponseSnapshot {
    pub status: StatusCode,
    pub body_bytes: usize,
    pub elapsed: Duration,
}

impl HttpContext {
    pub fn new(request: HttpRequest, session: SessionProxy, cancel: CancellationSignal) -> Self {
        let id = request
            .request_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let path = request.path().to_string();
        Self {
            inner: Arc::new(ContextInner {
                id,
                request,
                path,
                response: Mutex::new(HttpResponse::new()),
                session,
                cancel,
                started: Instant::now(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// A context without a session store or parent signal.
    pub fn detached(request: HttpRequest) -> Self {
        Self::new(request, SessionProxy::detached(), CancellationSignal::new())
    }

    /// Request ID, taken from `x-request-id` or generated.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn request(&self) -> &HttpRequest {
        &self.inner.request
    }

    /// Raw request path, used for routing. Route matching decodes each
    /// segment on its own so an encoded `/` never splits a segment.
    pub fn request_path(&self) -> &str {
        &self.inner.path
    }

    /// Lock the response for writing.
    ///
    /// Do not hold the guard across an `.await` or while calling
    /// [`session`](Self::session).
    pub fn response(&self) -> MutexGuard<'_, HttpResponse> {
        self.inner
            .response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Session for this client, resolved on first call.
    pub fn session(&self) -> Session {
        self.inner
            .session
            .get(&self.inner.request, &self.inner.response)
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.inner.cancel
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the context and build the transport response.
    ///
    /// Returns `None` if the context was already closed or abandoned.
    pub(crate) fn close(&self) -> Option<(Response, ResponseSnapshot)> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let head_only = *self.inner.request.method() == Method::HEAD;
        let mut response = self.response();
        let snapshot = ResponseSnapshot {
            status: response.status(),
            body_bytes: response.body().len(),
            elapsed: self.elapsed(),
        };
        Some((response.take(head_only), snapshot))
    }

    /// Close the context without producing a response.
    pub(crate) fn abandon(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for HttpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContext")
            .field("id", &self.inner.id)
            .field("method", self.inner.request.method())
            .field("path", &self.inner.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}
