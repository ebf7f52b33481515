//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum router: one handler per route prefix)
//!     → routing::dispatcher (limit → break)
//!     → forward.rs (outbound request, transport classification)
//!     → response.rs (header copy, streamed body)
//!     → Send to client
//! ```

pub mod forward;
pub mod response;
pub mod server;

pub use forward::ProxyExecutor;
pub use server::GatewayServer;
