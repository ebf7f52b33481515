//! Gateway error types.
//!
//! Every failure is converted into a client response at the dispatcher
//! boundary. Upstream status codes never pass through here; only failures
//! produced by the gateway itself do.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failures produced while serving a proxied request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The route's target could not be combined with the request path into a URI.
    #[error("invalid target URL: {0}")]
    InvalidTargetUrl(String),

    /// The route's token bucket is empty.
    #[error("too many requests")]
    RateLimited,

    /// The route's circuit breaker refused the call.
    #[error("circuit breaker is open")]
    BreakerOpen,

    /// Connecting to or talking to the backend failed before a response arrived.
    #[error("upstream transport failure: {0}")]
    TransportFailure(String),

    /// The response body broke off after the status line was already sent.
    #[error("response copy failed: {0}")]
    ResponseCopyFailure(String),
}

/// Field-less mirror of [`GatewayError`] used in outcomes and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTargetUrl,
    RateLimited,
    BreakerOpen,
    TransportFailure,
    ResponseCopyFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidTargetUrl => "invalid_target_url",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::BreakerOpen => "breaker_open",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::ResponseCopyFailure => "response_copy_failure",
        }
    }
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidTargetUrl(_) => ErrorKind::InvalidTargetUrl,
            GatewayError::RateLimited => ErrorKind::RateLimited,
            GatewayError::BreakerOpen => ErrorKind::BreakerOpen,
            GatewayError::TransportFailure(_) => ErrorKind::TransportFailure,
            GatewayError::ResponseCopyFailure(_) => ErrorKind::ResponseCopyFailure,
        }
    }

    /// Status code returned to the client for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidTargetUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::BreakerOpen
            | GatewayError::TransportFailure(_)
            | GatewayError::ResponseCopyFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = match &self {
            GatewayError::RateLimited => ErrorBody {
                error: "Too many requests",
                msg: None,
            },
            GatewayError::InvalidTargetUrl(_) => ErrorBody {
                error: "Invalid target URL",
                msg: None,
            },
            other => ErrorBody {
                error: "Service unavailable",
                msg: Some(other.to_string()),
            },
        };
        (self.status_code(), Json(body)).into_response()
    }
}
