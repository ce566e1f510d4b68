//! Session stores.
//!
//! # Responsibilities
//! - Find the session named by the request's cookie, or create one
//! - Issue the session cookie on creation
//! - Expire idle sessions
//!
//! # Design Decisions
//! - Resolution is synchronous; the store is an in-memory map
//! - Ids are random v4 UUIDs, never derived from client input

use std::time::Duration;

use axum::http::{header, HeaderValue};
use dashmap::DashMap;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::http::{HttpRequest, HttpResponse};
use crate::session::Session;

/// Backing store consulted by [`SessionProxy`](crate::session::SessionProxy).
pub trait SessionManager: Send + Sync {
    /// Return the session for `request`, creating one if needed.
    ///
    /// May add headers (e.g. `Set-Cookie`) to `response`.
    fn resolve(&self, request: &HttpRequest, response: &mut HttpResponse) -> Session;

    /// Drop expired sessions. Returns how many were removed.
    fn purge_expired(&self) -> usize {
        0
    }
}

/// In-memory, cookie-keyed session store.
#[derive(Debug)]
pub struct LocalSessionManager {
    sessions: DashMap<String, Session>,
    cookie_name: String,
    duration: Duration,
}

impl LocalSessionManager {
    pub fn new(cookie_name: impl Into<String>, duration: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            cookie_name: cookie_name.into(),
            duration,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.cookie_name.clone(),
            Duration::from_secs(config.duration_secs),
        )
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn lookup(&self, id: &str) -> Option<Session> {
        let session = self.sessions.get(id)?.value().clone();
        if session.idle_for() > self.duration {
            self.sessions.remove(id);
            return None;
        }
        Some(session)
    }

    fn create(&self, response: &mut HttpResponse) -> Session {
        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone());
        self.sessions.insert(id.clone(), session.clone());

        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.cookie_name,
            id,
            self.duration.as_secs()
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, cookie_name = %self.cookie_name, "Session cookie not representable as a header");
            }
        }
        tracing::debug!(session_id = %id, "Session created");
        session
    }
}

impl SessionManager for LocalSessionManager {
    fn resolve(&self, request: &HttpRequest, response: &mut HttpResponse) -> Session {
        let existing = request
            .cookie(&self.cookie_name)
            .and_then(|id| self.lookup(&id));
        let session = match existing {
            Some(session) => session,
            None => self.create(response),
        };
        session.touch();
        session
    }

    fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.idle_for() <= self.duration);
        before.saturating_sub(self.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn request_with_cookie(cookie: Option<&str>) -> HttpRequest {
        let request = HttpRequest::new(Method::GET, "/".parse().unwrap());
        match cookie {
            Some(c) => request.with_header(header::COOKIE, HeaderValue::from_str(c).unwrap()),
            None => request,
        }
    }

    #[test]
    fn new_client_gets_cookie() {
        let manager = LocalSessionManager::new("sid", Duration::from_secs(60));
        let mut response = HttpResponse::new();
        let session = manager.resolve(&request_with_cookie(None), &mut response);

        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!("sid={}", session.id())));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn returning_client_reuses_session() {
        let manager = LocalSessionManager::new("sid", Duration::from_secs(60));
        let mut response = HttpResponse::new();
        let first = manager.resolve(&request_with_cookie(None), &mut response);
        first.set("n", serde_json::Value::from(1));

        let mut response = HttpResponse::new();
        let cookie = format!("sid={}", first.id());
        let second = manager.resolve(&request_with_cookie(Some(&cookie)), &mut response);

        assert_eq!(second.id(), first.id());
        assert_eq!(second.get("n"), Some(serde_json::Value::from(1)));
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[test]
    fn unknown_cookie_starts_fresh_session() {
        let manager = LocalSessionManager::new("sid", Duration::from_secs(60));
        let mut response = HttpResponse::new();
        let session = manager.resolve(&request_with_cookie(Some("sid=forged")), &mut response);
        assert_ne!(session.id(), "forged");
    }

    #[test]
    fn purge_removes_idle_sessions() {
        let manager = LocalSessionManager::new("sid", Duration::ZERO);
        let mut response = HttpResponse::new();
        manager.resolve(&request_with_cookie(None), &mut response);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(manager.purge_expired(), 1);
        assert!(manager.is_empty());
    }
}
