//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → router.rs (one Route per prefix: matcher + limiter + breaker)
//!     → Freeze as immutable RouteTable
//!
//! Incoming Request (path)
//!     → matched structurally by the HTTP layer, or RouteTable::find
//!     → dispatcher.rs (limit → break → forward → observe)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Each route owns its limiter and breaker; routes never contend

pub mod dispatcher;
pub mod matcher;
pub mod router;

pub use dispatcher::RouteDispatcher;
pub use matcher::PathPrefixMatcher;
pub use router::{Route, RouteTable};
