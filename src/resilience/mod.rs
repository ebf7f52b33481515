//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → circuit_breaker.rs (admit, or reject while open)
//!     → http::forward (deadline enforced there)
//!     → circuit_breaker.rs (record transport outcome)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries; a failed call is reported to the breaker once
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;

pub use circuit_breaker::{
    Admission, BreakerError, BreakerSettings, CircuitBreaker, CircuitState, Counts, Permit, StateChange,
};
