//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Register every route as `<prefix>`, `<prefix>/` and `<prefix>/{*rest}`,
//!   each handler capturing its own `Route`
//! - Serve `/metrics` when a Prometheus handle is supplied
//! - Answer unmatched paths with a JSON 404
//! - Wire up middleware (request ID, tracing)
//! - Serve until the shutdown signal fires

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::lifecycle::ShutdownSignal;
use crate::observability::sink::EventSink;
use crate::routing::{RouteDispatcher, RouteTable};

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    routes: Arc<RouteTable>,
}

impl GatewayServer {
    /// Build routes and dispatcher from `config`.
    pub fn new(config: &GatewayConfig, sink: Arc<dyn EventSink>, metrics: Option<PrometheusHandle>) -> Self {
        let routes = Arc::new(RouteTable::from_config(config, sink.clone()));
        let dispatcher = Arc::new(RouteDispatcher::from_config(config, sink));
        Self::from_parts(routes, dispatcher, metrics)
    }

    /// Serve an already built route table.
    pub fn from_parts(
        routes: Arc<RouteTable>,
        dispatcher: Arc<RouteDispatcher>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let router = build_router(&routes, dispatcher, metrics);
        Self { router, routes }
    }

    /// The axum router, for serving elsewhere or for tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.routes.len(), "Gateway listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.recv())
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

fn build_router(routes: &RouteTable, dispatcher: Arc<RouteDispatcher>, metrics: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new();

    for route in routes.iter() {
        let prefix = route.prefix().to_string();
        let handler = {
            let route = route.clone();
            let dispatcher = dispatcher.clone();
            move |request: Request<Body>| async move { dispatcher.dispatch(&route, request).await }
        };
        router = router
            .route(&prefix, any(handler.clone()))
            .route(&format!("{}/", prefix), any(handler.clone()))
            .route(&format!("{}/{{*rest}}", prefix), any(handler));
    }

    if let Some(handle) = metrics {
        router = router.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    router.fallback(not_found).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "Not found" })))
}
