//! HTTP verbs accepted by route registrations.

use axum::http::Method;

/// Verb a route answers to. [`HttpVerb::Any`] accepts every method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVerb {
    Any,
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpVerb {
    /// Map a request method to a verb. Methods without a verb (CONNECT,
    /// TRACE, extensions) only match [`HttpVerb::Any`].
    pub fn from_method(method: &Method) -> Option<Self> {
        Some(match *method {
            Method::GET => HttpVerb::Get,
            Method::HEAD => HttpVerb::Head,
            Method::POST => HttpVerb::Post,
            Method::PUT => HttpVerb::Put,
            Method::PATCH => HttpVerb::Patch,
            Method::DELETE => HttpVerb::Delete,
            Method::OPTIONS => HttpVerb::Options,
            _ => return None,
        })
    }

    /// Returns true if a route registered for `self` answers `method`.
    ///
    /// HEAD requests fall back to GET routes.
    pub fn accepts(self, method: &Method) -> bool {
        match self {
            HttpVerb::Any => true,
            HttpVerb::Get => *method == Method::GET || *method == Method::HEAD,
            verb => HttpVerb::from_method(method) == Some(verb),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpVerb::Any => "ANY",
            HttpVerb::Get => "GET",
            HttpVerb::Head => "HEAD",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Delete => "DELETE",
            HttpVerb::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
