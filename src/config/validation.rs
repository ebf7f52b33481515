//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Route prefixes are well formed and do not overlap
//! - Targets are absolute http URLs
//! - Limits and timeouts are in range
//!
//! Returns every problem found, not just the first.

use axum::http::Method;
use std::fmt;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::routing::matcher::PathPrefixMatcher;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::new("routes", "at least one route is required"));
    }

    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        let prefix = &route.prefix;

        if !prefix.starts_with('/') || prefix.len() < 2 {
            errors.push(ValidationError::new(
                format!("{}.prefix", field),
                format!("'{}' must start with '/' and name a segment", prefix),
            ));
        } else if prefix.ends_with('/') {
            errors.push(ValidationError::new(
                format!("{}.prefix", field),
                format!("'{}' must not end with '/'", prefix),
            ));
        } else if prefix.contains('*') || prefix.contains('{') || prefix.contains('}') {
            errors.push(ValidationError::new(
                format!("{}.prefix", field),
                format!("'{}' contains wildcard characters", prefix),
            ));
        }

        if config.observability.metrics_enabled && PathPrefixMatcher::new(prefix.as_str()).matches("/metrics") {
            errors.push(ValidationError::new(
                format!("{}.prefix", field),
                format!("'{}' shadows the /metrics endpoint", prefix),
            ));
        }

        match Url::parse(&route.target) {
            Ok(url) if url.scheme() == "http" && url.has_host() => {}
            Ok(url) => errors.push(ValidationError::new(
                format!("{}.target", field),
                format!("unsupported target '{}' (scheme {})", route.target, url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                format!("{}.target", field),
                format!("'{}' is not a URL: {}", route.target, e),
            )),
        }

        for (j, other) in config.routes.iter().enumerate().skip(i + 1) {
            let a = PathPrefixMatcher::new(prefix.as_str());
            let b = PathPrefixMatcher::new(other.prefix.as_str());
            if a.overlaps(&b) {
                errors.push(ValidationError::new(
                    format!("routes[{}].prefix", j),
                    format!("'{}' overlaps '{}'", other.prefix, prefix),
                ));
            }
        }
    }

    let limits = &config.rate_limit;
    if !(limits.capacity >= 1.0) {
        errors.push(ValidationError::new("rate_limit.capacity", "must be at least 1"));
    }
    if !(limits.refill_per_second > 0.0) {
        errors.push(ValidationError::new("rate_limit.refill_per_second", "must be positive"));
    }
    for method in &limits.exempt_methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "rate_limit.exempt_methods",
                format!("'{}' is not an HTTP method", method),
            ));
        }
    }

    let breaker = &config.circuit_breaker;
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if breaker.open_timeout_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.open_timeout_ms", "must be positive"));
    }
    if breaker.half_open_max_requests == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.half_open_max_requests",
            "must be at least 1",
        ));
    }

    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be positive"));
    }
    if config.observability.event_buffer == 0 {
        errors.push(ValidationError::new("observability.event_buffer", "must be positive"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
