//! Resilient HTTP gateway library.
//!
//! Routes requests by path prefix to a fixed set of backends. Every route
//! owns a token-bucket rate limiter and a circuit breaker; transport
//! failures trip the breaker, upstream responses of any status do not.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
