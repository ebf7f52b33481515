//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher / breaker transitions:
//!     → events.rs (one logical event per terminal outcome)
//!     → sink.rs (EventSink: bounded buffer → tracing + metrics)
//!     → metrics.rs (counters and gauges, scraped on /metrics)
//!
//! logging.rs installs the tracing subscriber at startup.
//! ```
//!
//! # Design Decisions
//! - Emitting never blocks a request; a full buffer drops events
//! - Metrics are cheap (atomic increments)

pub mod events;
pub mod logging;
pub mod metrics;
pub mod sink;

pub use events::{Event, EventDetail, Level, ProxyOutcome};
pub use sink::{BufferedSink, EventSink, LogSink};
