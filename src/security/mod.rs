//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after route match):
//!     → rate_limit.rs (per-route token bucket)
//!     → Pass to the circuit breaker
//! ```
//!
//! # Design Decisions
//! - One bucket per route, shared by every client of that route
//! - Fail closed: an empty bucket rejects with 429

pub mod rate_limit;

pub use rate_limit::TokenBucketLimiter;
