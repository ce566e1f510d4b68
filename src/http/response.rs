//! Buffered response under construction.
//!
//! # Responsibilities
//! - Collect status, headers and body written by modules
//! - Reset cleanly when an error response replaces partial output
//! - Convert into the transport's response type on close
//!
//! # Design Decisions
//! - The body is buffered; nothing reaches the client before finalization
//! - HEAD responses keep their headers and drop the body

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

/// Response being built for one request.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn set_content_type(&mut self, content_type: &'static str) {
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    /// Append raw bytes to the body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Replace the body with `text` and set its content type.
    pub fn write_text(&mut self, text: &str, content_type: &'static str) {
        self.body.clear();
        self.body.extend_from_slice(text.as_bytes());
        self.set_content_type(content_type);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Drop the body and the headers that describe it.
    pub fn clear_body(&mut self) {
        self.body.clear();
        self.headers.remove(header::CONTENT_TYPE);
        self.headers.remove(header::CONTENT_LENGTH);
    }

    /// Mark the response as not cacheable.
    pub fn disable_caching(&mut self) {
        self.headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
        );
        self.headers
            .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        self.headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }

    /// Move the buffered state out into a transport response.
    pub(crate) fn take(&mut self, head_only: bool) -> Response {
        let body = std::mem::take(&mut self.body);
        let mut response = if head_only {
            Response::new(Body::empty())
        } else {
            Response::new(Body::from(body))
        };
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.headers);
        response
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}
