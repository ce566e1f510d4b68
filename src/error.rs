//! Error types shared across the dispatch pipeline.
//!
//! Configuration errors are raised while modules and controllers are being
//! registered, so a misconfigured server never reaches `Listening`.
//! [`HandlerError`] is the only error that travels through request handling;
//! the dispatch loop sorts it into failure tiers.

use axum::http::StatusCode;

use crate::http::HttpException;
use crate::net::ListenerError;
use crate::routing::RoutePatternError;

/// Errors raised while configuring modules, routes and controllers.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("configuration is locked; the server has already started")]
    Locked,

    #[error("invalid base path '{0}': must start with '/'")]
    InvalidBasePath(String),

    #[error(transparent)]
    RoutePattern(#[from] RoutePatternError),

    #[error("duplicate route {verb} {pattern}")]
    DuplicateRoute { verb: String, pattern: String },

    #[error("invalid controller type {controller}: {reason}")]
    InvalidControllerType {
        controller: &'static str,
        reason: &'static str,
    },

    #[error("no eligible binding for parameter '{parameter}' of {controller}::{method}: {reason}")]
    NoEligibleBinding {
        controller: &'static str,
        method: String,
        parameter: String,
        reason: String,
    },

    #[error("no string conversion registered for {type_name} (parameter '{parameter}')")]
    MissingConverter {
        parameter: String,
        type_name: &'static str,
    },

    #[error("module '{module}' refused configuration: {reason}")]
    Module { module: String, reason: String },
}

/// A route or query value could not be converted to the declared parameter type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cannot convert '{value}' to {target} for parameter '{parameter}': {reason}")]
pub struct BindingConversionError {
    pub parameter: String,
    pub value: String,
    pub target: &'static str,
    pub reason: String,
}

/// Errors produced while handling a single request.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The request's cancellation signal fired.
    #[error("request cancelled")]
    Cancelled,

    /// A classified protocol error with an explicit status code.
    #[error(transparent)]
    Http(#[from] HttpException),

    #[error(transparent)]
    Binding(#[from] BindingConversionError),

    /// The transport failed in a way that affects the accept mechanism itself.
    #[error("transport failure: {0}")]
    Transport(#[from] ListenerError),

    /// Anything else raised by application code.
    #[error(transparent)]
    Unhandled(#[from] anyhow::Error),
}

impl HandlerError {
    /// Wrap an arbitrary application error.
    pub fn unhandled<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unhandled(anyhow::Error::new(error))
    }

    /// Status code implied by the error, if it is a classified one.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            HandlerError::Http(e) => Some(e.status()),
            HandlerError::Binding(_) => Some(StatusCode::BAD_REQUEST),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_errors_map_to_bad_request() {
        let err = HandlerError::from(BindingConversionError {
            parameter: "id".into(),
            value: "abc".into(),
            target: "u32",
            reason: "invalid digit found in string".into(),
        });
        assert_eq!(err.status_code(), Some(StatusCode::BAD_REQUEST));
        assert!(err.to_string().contains("parameter 'id'"));
    }

    #[test]
    fn unhandled_errors_carry_no_status() {
        let err = HandlerError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.status_code(), None);
    }
}
