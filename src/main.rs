//! Resilient HTTP gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                   GATEWAY                    │
//!   Client Request       │  ┌────────┐   ┌────────────┐   ┌──────────┐  │
//!   ─────────────────────┼─▶│ server │──▶│ rate limit │──▶│ circuit  │──┼──▶ Backend
//!                        │  │ (axum) │   │  (bucket)  │   │ breaker  │  │
//!                        │  └────────┘   └────────────┘   └──────────┘  │
//!   Client Response      │       ▲                              │       │
//!   ◀────────────────────┼───────┴────── streamed body ◀────────┘       │
//!                        │                                              │
//!                        │  config · observability · lifecycle          │
//!                        └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use resilient_gateway::config::{load_config, GatewayConfig};
use resilient_gateway::lifecycle::{signals, Shutdown};
use resilient_gateway::observability::{logging, metrics, BufferedSink, LogSink};
use resilient_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "resilient-gateway")]
#[command(about = "Path-prefix HTTP gateway with per-route rate limiting and circuit breaking", long_about = None)]
struct Args {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!("resilient-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        rate_limit_capacity = config.rate_limit.capacity,
        rate_limit_refill = config.rate_limit.refill_per_second,
        failure_threshold = config.circuit_breaker.failure_threshold,
        upstream_timeout_secs = config.upstream.timeout_secs,
        "Configuration loaded"
    );

    let prometheus = if config.observability.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install metrics recorder");
                None
            }
        }
    } else {
        None
    };

    let sink = Arc::new(BufferedSink::spawn(Arc::new(LogSink), config.observability.event_buffer));
    let server = GatewayServer::new(&config, sink, prometheus);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    tokio::spawn(signals::trigger_on_signal(shutdown.clone()));
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
