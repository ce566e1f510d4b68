//! Lazy per-request session handle.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::http::{HttpRequest, HttpResponse};
use crate::session::{Session, SessionManager};

/// Resolves the request's session on first access and caches it.
///
/// Requests that never touch their session never hit the store and never
/// receive a session cookie.
pub struct SessionProxy {
    manager: Option<Arc<dyn SessionManager>>,
    session: OnceLock<Session>,
}

impl SessionProxy {
    pub fn new(manager: Arc<dyn SessionManager>) -> Self {
        Self {
            manager: Some(manager),
            session: OnceLock::new(),
        }
    }

    /// A proxy with no backing store; yields a detached session.
    pub fn detached() -> Self {
        Self {
            manager: None,
            session: OnceLock::new(),
        }
    }

    /// The session, resolved through the manager on first call.
    ///
    /// Locks `response` while resolving, so callers must not hold its guard.
    pub fn get(&self, request: &HttpRequest, response: &Mutex<HttpResponse>) -> Session {
        self.session
            .get_or_init(|| match &self.manager {
                Some(manager) => {
                    let mut response = response.lock().unwrap_or_else(PoisonError::into_inner);
                    manager.resolve(request, &mut response)
                }
                None => Session::detached(),
            })
            .clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.session.get().is_some()
    }
}

impl std::fmt::Debug for SessionProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProxy")
            .field("managed", &self.manager.is_some())
            .field("session", &self.session.get().map(Session::id))
            .finish()
    }
}
