//! Classified HTTP errors and the writers that turn errors into responses.
//!
//! # Responsibilities
//! - [`HttpException`]: an error that carries its own status code
//! - [`HttpExceptionHandler`]: writes the body for a classified error
//! - [`UnhandledExceptionHandler`]: writes the body for a 500
//!
//! # Design Decisions
//! - Handlers are pluggable per server; defaults answer in plain text
//! - Writers only touch the buffered response, so a failing writer leaves
//!   the status intact

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::{json, Value};

use crate::error::HandlerError;
use crate::http::{HttpContext, HttpResponse};
use crate::lifecycle::CancellationSignal;
use crate::routing::HttpVerb;

/// An error with an explicit HTTP status.
#[derive(Debug, Clone)]
pub struct HttpException {
    status: StatusCode,
    message: Option<String>,
    data: Option<Value>,
    headers: HeaderMap,
}

impl HttpException {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: None,
            data: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// 405 with an `Allow` header listing `allowed`.
    pub fn method_not_allowed(allowed: &[HttpVerb]) -> Self {
        let mut verbs: Vec<&str> = allowed
            .iter()
            .flat_map(|verb| match verb {
                HttpVerb::Get => vec!["GET", "HEAD"],
                other => vec![other.as_str()],
            })
            .collect();
        verbs.dedup();
        let exception = Self::new(StatusCode::METHOD_NOT_ALLOWED);
        match HeaderValue::from_str(&verbs.join(", ")) {
            Ok(value) => exception.with_header(header::ALLOW, value),
            Err(_) => exception,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST).with_message(message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN)
    }

    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Redirect to `location` (302, or 301 when `permanent`).
    pub fn redirect(location: &str, permanent: bool) -> Self {
        let status = if permanent {
            StatusCode::MOVED_PERMANENTLY
        } else {
            StatusCode::FOUND
        };
        let exception = Self::new(status);
        match HeaderValue::from_str(location) {
            Ok(value) => exception.with_header(header::LOCATION, value),
            Err(_) => exception,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Replace whatever was written so far with this error's status and headers.
    pub fn prepare_response(&self, response: &mut HttpResponse) {
        response.clear_body();
        response.set_status(self.status);
        for (name, value) in &self.headers {
            response.set_header(name.clone(), value.clone());
        }
    }

    fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("Error")
    }
}

impl std::fmt::Display for HttpException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.reason())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpException {}

/// Writes the body of a classified error response.
#[async_trait]
pub trait HttpExceptionHandler: Send + Sync {
    async fn write(&self, ctx: &HttpContext, exception: &HttpException) -> Result<(), HandlerError>;
}

/// `text/plain` body: the message, or the status line when there is none.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExceptionHandler;

#[async_trait]
impl HttpExceptionHandler for PlainTextExceptionHandler {
    async fn write(&self, ctx: &HttpContext, exception: &HttpException) -> Result<(), HandlerError> {
        let text = match exception.message() {
            Some(message) => message.to_string(),
            None => format!("{} {}", exception.status().as_u16(), exception.reason()),
        };
        ctx.response().write_text(&text, "text/plain; charset=utf-8");
        Ok(())
    }
}

/// `application/json` body with status, reason, message and data.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExceptionHandler;

#[async_trait]
impl HttpExceptionHandler for JsonExceptionHandler {
    async fn write(&self, ctx: &HttpContext, exception: &HttpException) -> Result<(), HandlerError> {
        let body = json!({
            "status": exception.status().as_u16(),
            "error": exception.reason(),
            "message": exception.message(),
            "data": exception.data(),
        });
        let text = serde_json::to_string(&body).map_err(HandlerError::unhandled)?;
        ctx.response().write_text(&text, "application/json");
        Ok(())
    }
}

/// Lets the host customize the body of a 500 response.
///
/// Called after the status is forced to 500 and caching is disabled.
#[async_trait]
pub trait UnhandledExceptionHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &HttpContext,
        path: &str,
        error: &anyhow::Error,
        cancel: &CancellationSignal,
    ) -> Result<(), HandlerError>;
}

/// Plain-text 500 body, optionally with the error chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultUnhandledExceptionHandler {
    pub include_details: bool,
}

#[async_trait]
impl UnhandledExceptionHandler for DefaultUnhandledExceptionHandler {
    async fn handle(
        &self,
        ctx: &HttpContext,
        _path: &str,
        error: &anyhow::Error,
        _cancel: &CancellationSignal,
    ) -> Result<(), HandlerError> {
        let text = if self.include_details {
            format!("500 Internal Server Error\n\n{error:#}")
        } else {
            "500 Internal Server Error".to_string()
        };
        ctx.response().write_text(&text, "text/plain; charset=utf-8");
        Ok(())
    }
}
