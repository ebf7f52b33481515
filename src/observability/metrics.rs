//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): inbound requests by route path and method
//! - `gateway_outcomes_total` (counter): terminal outcomes by route and outcome
//! - `gateway_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_events_dropped_total` (counter): events shed by a full buffer
//!
//! Recording without an installed recorder is a no-op, so tests and embedders
//! that skip [`init_metrics`] pay nothing.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::resilience::circuit_breaker::CircuitState;

/// Install the global Prometheus recorder and return a handle for `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!("http_requests_total", "Total number of HTTP requests made.");
    describe_counter!("gateway_outcomes_total", "Terminal request outcomes by route.");
    describe_gauge!("gateway_breaker_state", "Circuit breaker state (0 closed, 1 half-open, 2 open).");
    describe_counter!("gateway_events_dropped_total", "Observability events dropped by a full buffer.");

    Ok(handle)
}

pub fn record_request(path: &str, method: &str) {
    counter!(
        "http_requests_total",
        "path" => path.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

pub fn record_outcome(route: &str, outcome: &'static str) {
    counter!(
        "gateway_outcomes_total",
        "route" => route.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_breaker_state(route: &str, state: CircuitState) {
    gauge!("gateway_breaker_state", "route" => route.to_string()).set(state.as_gauge());
}

pub fn record_dropped_event() {
    counter!("gateway_events_dropped_total").increment(1);
}
