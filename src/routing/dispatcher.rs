//! Per-route request pipeline.
//!
//! ```text
//! count request
//!     → limiter.allow()            (429 unless the method is exempt)
//!     → resolve target URI         (500 on a bad target)
//!     → breaker permit             (503 when open)
//!     → forward                    (503 on transport failure)
//!     → stream upstream response   (status and body unchanged)
//!     → breaker outcome            (once the body has ended)
//! ```
//!
//! The breaker call spans the whole exchange: a body that fails mid-stream
//! or misses the deadline counts as a failure, a delivered body as a
//! success, and a body the client abandons counts as neither.
//!
//! Exactly one request event is emitted per call. For forwarded responses it
//! is emitted once the body has been streamed (or abandoned) so it can carry
//! the byte count.

use axum::{
    body::Body,
    http::{Method, Request, Response},
    response::IntoResponse,
};
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::{GatewayConfig, HeaderCopyMode};
use crate::error::GatewayError;
use crate::http::forward::ProxyExecutor;
use crate::http::response::{stream_upstream, CopyEnd, CopyReport};
use crate::observability::events::{Event, ProxyOutcome};
use crate::observability::sink::EventSink;
use crate::routing::router::Route;

/// Applies limiter, breaker and forwarding to requests for a route.
#[derive(Clone)]
pub struct RouteDispatcher {
    executor: ProxyExecutor,
    sink: Arc<dyn EventSink>,
    header_mode: HeaderCopyMode,
    exempt_methods: Vec<Method>,
}

impl RouteDispatcher {
    pub fn new(executor: ProxyExecutor, sink: Arc<dyn EventSink>) -> Self {
        Self {
            executor,
            sink,
            header_mode: HeaderCopyMode::default(),
            exempt_methods: Vec::new(),
        }
    }

    pub fn from_config(config: &GatewayConfig, sink: Arc<dyn EventSink>) -> Self {
        let exempt_methods = config
            .rate_limit
            .exempt_methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
            .collect();

        Self::new(ProxyExecutor::new(&config.upstream), sink)
            .with_header_mode(config.upstream.response_headers)
            .with_exempt_methods(exempt_methods)
    }

    pub fn with_header_mode(mut self, mode: HeaderCopyMode) -> Self {
        self.header_mode = mode;
        self
    }

    /// Methods that are never rejected by the rate limiter.
    pub fn with_exempt_methods(mut self, methods: Vec<Method>) -> Self {
        self.exempt_methods = methods;
        self
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Run one request through `route`'s pipeline.
    pub async fn dispatch(&self, route: &Route, request: Request<Body>) -> Response<Body> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        self.sink.record_request(route.prefix(), method.as_str());

        // An exempt method still takes a token when one is available.
        if !route.limiter.allow() {
            if self.exempt_methods.contains(&method) {
                tracing::debug!(route = %route.prefix(), method = %method, "Rate limit bypassed for exempt method");
            } else {
                return self.reject(route, &method, &path, GatewayError::RateLimited);
            }
        }

        let remainder = route.matcher.remainder(&path).unwrap_or_default();
        let uri = match ProxyExecutor::resolve(&route.target, remainder, request.uri().query()) {
            Ok(uri) => uri,
            Err(e) => return self.reject(route, &method, &path, e),
        };
        tracing::debug!(route = %route.prefix(), method = %method, upstream = %uri, "Forwarding request");

        let Some(permit) = route.breaker.try_acquire() else {
            return self.reject(route, &method, &path, GatewayError::BreakerOpen);
        };

        // One deadline covers the response head and the body.
        let deadline = Instant::now() + self.executor.timeout();
        let upstream = match self.executor.forward_until(request, uri, deadline).await {
            Ok(upstream) => upstream,
            Err(e) => {
                permit.finish(false);
                return self.reject(route, &method, &path, e);
            }
        };

        let status = upstream.status().as_u16();
        let sink = self.sink.clone();
        let prefix = route.prefix().to_string();
        stream_upstream(upstream, self.header_mode, deadline, move |report: CopyReport| {
            let failed = match &report.end {
                CopyEnd::Complete => {
                    permit.finish(true);
                    false
                }
                CopyEnd::Failed(error) => {
                    tracing::error!(route = %prefix, path = %path, error = %error, "Upstream body failed mid-stream");
                    permit.finish(false);
                    true
                }
                CopyEnd::Abandoned => {
                    tracing::debug!(route = %prefix, path = %path, "Client went away before the body ended");
                    drop(permit);
                    false
                }
            };
            let outcome = ProxyOutcome::forwarded(status, report.bytes_copied, failed);
            sink.emit(Event::request(&prefix, method.as_str(), &path, outcome));
        })
    }

    fn reject(&self, route: &Route, method: &Method, path: &str, error: GatewayError) -> Response<Body> {
        let outcome = ProxyOutcome::rejected(&error);
        self.sink.emit(Event::request(route.prefix(), method.as_str(), path, outcome));
        error.into_response()
    }
}
