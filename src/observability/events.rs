//! Logical observability events.
//!
//! One [`Event`] is produced per terminal request outcome and one per
//! breaker transition. How events leave the process is up to the sink.

use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

use crate::error::{ErrorKind, GatewayError};
use crate::resilience::circuit_breaker::{CircuitState, StateChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        })
    }
}

/// What happened to one proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProxyOutcome {
    /// The request got past the limiter and the breaker.
    pub accepted: bool,
    /// Status sent to the client, if any was sent.
    pub status_code: Option<u16>,
    pub error_kind: Option<ErrorKind>,
    /// Response body bytes delivered to the client.
    pub bytes_copied: u64,
}

impl ProxyOutcome {
    /// The gateway answered on the backend's behalf.
    pub fn rejected(error: &GatewayError) -> Self {
        Self {
            accepted: !matches!(error, GatewayError::RateLimited | GatewayError::BreakerOpen),
            status_code: Some(error.status_code().as_u16()),
            error_kind: Some(error.kind()),
            bytes_copied: 0,
        }
    }

    /// The upstream response was streamed to the client.
    pub fn forwarded(status: u16, bytes_copied: u64, copy_error: bool) -> Self {
        Self {
            accepted: true,
            status_code: Some(status),
            error_kind: copy_error.then_some(ErrorKind::ResponseCopyFailure),
            bytes_copied,
        }
    }

    pub fn level(&self) -> Level {
        match self.error_kind {
            None => Level::Info,
            Some(ErrorKind::RateLimited) | Some(ErrorKind::BreakerOpen) => Level::Warn,
            Some(_) => Level::Error,
        }
    }

    /// Human-readable summary used as the event message.
    pub fn message(&self) -> &'static str {
        match self.error_kind {
            None => "Proxy request successful",
            Some(ErrorKind::RateLimited) => "Too many requests",
            Some(ErrorKind::InvalidTargetUrl) => "Invalid target URL",
            Some(ErrorKind::BreakerOpen) | Some(ErrorKind::TransportFailure) => "Service unavailable",
            Some(ErrorKind::ResponseCopyFailure) => "Error copying response body",
        }
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        self.error_kind.map(|kind| kind.as_str()).unwrap_or("success")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDetail {
    Request {
        route: String,
        method: String,
        outcome: ProxyOutcome,
    },
    StateChange {
        breaker: String,
        #[serde(serialize_with = "serialize_state")]
        from: CircuitState,
        #[serde(serialize_with = "serialize_state")]
        to: CircuitState,
    },
}

fn serialize_state<S: serde::Serializer>(state: &CircuitState, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(state.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub timestamp: SystemTime,
    pub level: Level,
    pub path: String,
    pub message: String,
    pub detail: EventDetail,
}

impl Event {
    pub fn request(route: &str, method: &str, path: &str, outcome: ProxyOutcome) -> Self {
        Self {
            timestamp: SystemTime::now(),
            level: outcome.level(),
            path: path.to_string(),
            message: outcome.message().to_string(),
            detail: EventDetail::Request {
                route: route.to_string(),
                method: method.to_string(),
                outcome,
            },
        }
    }

    pub fn state_change(change: &StateChange) -> Self {
        Self {
            timestamp: SystemTime::now(),
            level: if change.to == CircuitState::Open { Level::Warn } else { Level::Info },
            path: change.name.clone(),
            message: format!(
                "Circuit breaker for {} changed state from {} to {}",
                change.name, change.from, change.to
            ),
            detail: EventDetail::StateChange {
                breaker: change.name.clone(),
                from: change.from,
                to: change.to,
            },
        }
    }

    /// The outcome carried by a request event.
    pub fn outcome(&self) -> Option<&ProxyOutcome> {
        match &self.detail {
            EventDetail::Request { outcome, .. } => Some(outcome),
            EventDetail::StateChange { .. } => None,
        }
    }
}
