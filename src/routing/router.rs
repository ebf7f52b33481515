//! Route table.
//!
//! # Responsibilities
//! - Own one [`Route`] per configured prefix, each with its own limiter and
//!   breaker
//! - Look up the route for a request path
//!
//! # Design Decisions
//! - Built once at startup, immutable afterwards; routes are shared via `Arc`
//! - No lock spans more than one route: each limiter and breaker serializes
//!   only its own state
//! - Longest prefix wins, although validated configs never overlap

use std::sync::Arc;

use crate::config::{GatewayConfig, RouteConfig};
use crate::observability::events::Event;
use crate::observability::metrics;
use crate::observability::sink::EventSink;
use crate::resilience::circuit_breaker::{BreakerSettings, CircuitBreaker, StateChange, StateChangeHook};
use crate::routing::matcher::PathPrefixMatcher;
use crate::security::rate_limit::TokenBucketLimiter;

/// A prefix, the backend it maps to, and the protection in front of it.
#[derive(Debug)]
pub struct Route {
    pub matcher: PathPrefixMatcher,
    pub target: String,
    pub limiter: TokenBucketLimiter,
    /// Shared with in-flight response bodies, which report their outcome
    /// once streaming ends.
    pub breaker: Arc<CircuitBreaker>,
}

impl Route {
    pub fn new(
        prefix: impl Into<String>,
        target: impl Into<String>,
        limiter: TokenBucketLimiter,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            matcher: PathPrefixMatcher::new(prefix),
            target: target.into(),
            limiter,
            breaker: Arc::new(breaker),
        }
    }

    pub fn prefix(&self) -> &str {
        self.matcher.prefix()
    }
}

/// Immutable set of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        let mut routes: Vec<Arc<Route>> = routes.into_iter().map(Arc::new).collect();
        routes.sort_by(|a, b| b.prefix().len().cmp(&a.prefix().len()));
        Self { routes }
    }

    /// Build every configured route. Breaker transitions are reported to `sink`.
    pub fn from_config(config: &GatewayConfig, sink: Arc<dyn EventSink>) -> Self {
        let routes = config
            .routes
            .iter()
            .map(|route| build_route(route, config, sink.clone()))
            .collect();
        Self::new(routes)
    }

    /// Find the route for `path` and the remainder after its prefix.
    pub fn find<'a>(&self, path: &'a str) -> Option<(&Arc<Route>, &'a str)> {
        self.routes
            .iter()
            .find_map(|route| route.matcher.remainder(path).map(|rest| (route, rest)))
    }

    /// Look up a route by its exact prefix.
    pub fn get(&self, prefix: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|route| route.prefix() == prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn build_route(route: &RouteConfig, config: &GatewayConfig, sink: Arc<dyn EventSink>) -> Route {
    let matcher = PathPrefixMatcher::new(route.prefix.as_str());
    let hook: StateChangeHook = Arc::new(move |change: &StateChange| {
        metrics::record_breaker_state(&change.name, change.to);
        sink.emit(Event::state_change(change));
    });
    let breaker = CircuitBreaker::new(matcher.prefix(), BreakerSettings::from(&config.circuit_breaker))
        .with_state_change_hook(hook);
    metrics::record_breaker_state(matcher.prefix(), breaker.state());

    tracing::info!(
        prefix = %matcher.prefix(),
        target = %route.target,
        capacity = config.rate_limit.capacity,
        refill_per_second = config.rate_limit.refill_per_second,
        "Route registered"
    );

    Route {
        matcher,
        target: route.target.clone(),
        limiter: TokenBucketLimiter::from_config(&config.rate_limit),
        breaker: Arc::new(breaker),
    }
}
