//! Event sinks.
//!
//! The request path only ever calls [`EventSink::emit`] and
//! [`EventSink::record_request`], and neither may block. [`BufferedSink`]
//! puts a bounded queue in front of any sink so a slow consumer costs
//! dropped events, never request latency.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::observability::events::{Event, EventDetail, Level};
use crate::observability::metrics;

/// Destination for observability events and request counts.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Best effort.
    fn emit(&self, event: Event);

    /// Count one inbound request.
    fn record_request(&self, path: &str, method: &str) {
        metrics::record_request(path, method);
    }
}

/// Writes events to `tracing` and outcome counters to `metrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        if let EventDetail::Request { route, method, outcome } = &event.detail {
            metrics::record_outcome(route, outcome.label());
            match event.level {
                Level::Info => tracing::info!(
                    route = %route, method = %method, path = %event.path,
                    status = ?outcome.status_code, bytes = outcome.bytes_copied,
                    "{}", event.message
                ),
                Level::Warn => tracing::warn!(
                    route = %route, method = %method, path = %event.path,
                    status = ?outcome.status_code, outcome = outcome.label(),
                    "{}", event.message
                ),
                Level::Error => tracing::error!(
                    route = %route, method = %method, path = %event.path,
                    status = ?outcome.status_code, outcome = outcome.label(),
                    bytes = outcome.bytes_copied,
                    "{}", event.message
                ),
            }
        } else {
            tracing::debug!(path = %event.path, level = %event.level, "{}", event.message);
        }
    }
}

/// A bounded, non-blocking queue in front of another sink.
///
/// Events are drained by a background task. When the queue is full the
/// event is dropped and counted.
#[derive(Debug, Clone)]
pub struct BufferedSink {
    tx: mpsc::Sender<Event>,
}

impl BufferedSink {
    /// Spawn the drain task on the current runtime.
    pub fn spawn(inner: Arc<dyn EventSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Event>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                inner.emit(event);
            }
            tracing::debug!("Event buffer closed");
        });
        Self { tx }
    }
}

impl EventSink for BufferedSink {
    fn emit(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                metrics::record_dropped_event();
                tracing::debug!(path = %event.path, "Event buffer full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                metrics::record_dropped_event();
            }
        }
    }
}
