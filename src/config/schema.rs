//! Configuration schema definitions.
//!
//! Every section has defaults so an empty file (or no file) yields the
//! two-route `/account` + `/loans` gateway.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Static prefix → backend mapping. Read once at startup.
    pub routes: Vec<RouteConfig>,

    /// Token bucket applied to each route.
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker applied to each route.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Outbound request settings.
    pub upstream: UpstreamConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            routes: vec![
                RouteConfig::new("/account", "http://accounts:8080"),
                RouteConfig::new("/loans", "http://loans:8080"),
            ],
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            upstream: UpstreamConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One route: every request under `prefix` goes to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path prefix, e.g. "/account". No trailing slash.
    pub prefix: String,

    /// Backend base URL, e.g. "http://accounts:8080".
    pub target: String,
}

impl RouteConfig {
    pub fn new(prefix: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            target: target.into(),
        }
    }
}

/// Per-route token bucket settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket size (maximum burst).
    pub capacity: f64,

    /// Tokens added per second.
    pub refill_per_second: f64,

    /// Methods that are never rejected. They still draw a token when one is
    /// available, e.g. `["POST"]`.
    pub exempt_methods: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 20.0,
            refill_per_second: 10.0,
            exempt_methods: Vec::new(),
        }
    }
}

/// Per-route circuit breaker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Trip once consecutive failures exceed this.
    pub failure_threshold: u32,

    /// Time spent open before trials are admitted, in milliseconds.
    pub open_timeout_ms: u64,

    /// Trial quota in half-open state.
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_ms: 5_000,
            half_open_max_requests: 5,
        }
    }
}

/// How upstream response headers with several values are copied back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HeaderCopyMode {
    /// Every value is copied.
    #[default]
    All,
    /// Only the first value of each header name.
    FirstValue,
}

/// Outbound request settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Deadline for receiving the upstream response head, in seconds.
    pub timeout_secs: u64,

    /// Response header copy policy.
    pub response_headers: HeaderCopyMode,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            response_headers: HeaderCopyMode::All,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Serve Prometheus metrics on `/metrics`.
    pub metrics_enabled: bool,

    /// Capacity of the event buffer; events beyond it are dropped.
    pub event_buffer: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            event_buffer: 1024,
        }
    }
}
