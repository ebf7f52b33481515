//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: a bounded number of trial requests probe the backend
//!
//! # State Transitions
//! ```text
//! Closed → Open:      consecutive_failures > failure_threshold
//! Open → Half-Open:   first call after open_timeout has elapsed
//! Half-Open → Closed: half_open_max_requests consecutive trial successes
//! Half-Open → Open:   any trial failure
//! ```
//!
//! Every transition starts a new generation and clears the counts. A call
//! remembers the generation it was admitted under; when it completes under a
//! different generation its result is discarded.
//!
//! The breaker only counts what the wrapped operation reports. Deciding what
//! is a failure is the caller's job.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half-open",
            CircuitState::Open => "open",
        }
    }

    /// Numeric encoding used for the state gauge.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request tallies for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

/// Tuning for a single breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// The breaker trips once consecutive failures exceed this value.
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting trials.
    pub open_timeout: Duration,
    /// Trial quota in half-open, and the success streak needed to close.
    pub half_open_max_requests: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(5),
            half_open_max_requests: 5,
        }
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            open_timeout: Duration::from_millis(config.open_timeout_ms),
            half_open_max_requests: config.half_open_max_requests,
        }
    }
}

/// A state transition, reported to the state-change hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub name: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Callback invoked after every transition, outside the breaker's lock.
pub type StateChangeHook = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// The call was rejected without running the operation.
    #[error("circuit breaker is open")]
    Open,
    /// The operation ran and reported a failure.
    #[error("{0}")]
    Operation(E),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    opened_at: Option<Instant>,
}

/// Per-route circuit breaker.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
    on_state_change: Option<StateChangeHook>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                opened_at: None,
            }),
            on_state_change: None,
        }
    }

    /// Register a callback for state transitions.
    pub fn with_state_change_hook(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Current state, applying an expired open timeout first.
    pub fn state(&self) -> CircuitState {
        self.with_current(|inner, _| inner.state)
    }

    pub fn counts(&self) -> Counts {
        self.lock().counts
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Run `operation` if the breaker admits it, counting its result.
    ///
    /// `Err` from the operation is a failure, `Ok` a success. If the returned
    /// future is dropped before the operation finishes, nothing is counted and
    /// the trial slot is handed back.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.admit().ok_or(BreakerError::Open)?;
        let admission = Admission {
            breaker: self,
            generation,
            done: false,
        };
        let result = operation().await;
        admission.finish(result.is_ok());
        result.map_err(BreakerError::Operation)
    }

    /// Admit a call whose outcome is reported later through the returned
    /// [`Permit`], possibly from another task. `None` while the breaker
    /// rejects calls.
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        self.admit().map(|generation| Admission {
            breaker: self.clone(),
            generation,
            done: false,
        })
    }

    fn admit(&self) -> Option<u64> {
        let max_trials = self.settings.half_open_max_requests;
        let admitted = self.with_current(|inner, _| match inner.state {
            CircuitState::Open => None,
            CircuitState::HalfOpen if inner.counts.requests >= max_trials => None,
            _ => {
                inner.counts.on_request();
                Some(inner.generation)
            }
        });

        if admitted.is_none() {
            tracing::debug!(breaker = %self.name, "Call rejected by open breaker");
        }
        admitted
    }

    fn record(&self, generation: u64, success: bool) {
        let settings = self.settings;
        self.with_current(|inner, changes| {
            if inner.generation != generation {
                tracing::debug!(
                    breaker = %self.name,
                    stale_generation = generation,
                    generation = inner.generation,
                    "Discarding stale completion"
                );
                return;
            }

            let next = if success {
                inner.counts.on_success();
                let closes = inner.state == CircuitState::HalfOpen
                    && inner.counts.consecutive_successes >= settings.half_open_max_requests;
                closes.then_some(CircuitState::Closed)
            } else {
                inner.counts.on_failure();
                match inner.state {
                    CircuitState::Closed
                        if inner.counts.consecutive_failures > settings.failure_threshold =>
                    {
                        Some(CircuitState::Open)
                    }
                    CircuitState::HalfOpen => Some(CircuitState::Open),
                    _ => None,
                }
            };

            if let Some(next) = next {
                transition(inner, next, changes);
            }
        });
    }

    fn release(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.counts.requests = inner.counts.requests.saturating_sub(1);
        }
    }

    /// Lock, apply any pending open → half-open transition, run `f`, then
    /// report the transitions once the lock is released.
    fn with_current<R>(&self, f: impl FnOnce(&mut Inner, &mut Vec<Transition>) -> R) -> R {
        let mut changes = Vec::new();
        let result = {
            let mut inner = self.lock();
            if inner.state == CircuitState::Open {
                let expired = inner
                    .opened_at
                    .map(|at| Instant::now().saturating_duration_since(at) >= self.settings.open_timeout)
                    .unwrap_or(true);
                if expired {
                    transition(&mut inner, CircuitState::HalfOpen, &mut changes);
                }
            }
            f(&mut inner, &mut changes)
        };
        self.notify(changes);
        result
    }

    fn notify(&self, changes: Vec<Transition>) {
        for (from, to) in changes {
            if to == CircuitState::Open {
                tracing::warn!(breaker = %self.name, from = %from, to = %to, "Circuit breaker changed state");
            } else {
                tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit breaker changed state");
            }
            if let Some(hook) = &self.on_state_change {
                hook(&StateChange {
                    name: self.name.clone(),
                    from,
                    to,
                });
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

type Transition = (CircuitState, CircuitState);

/// Move to `next`, starting a new generation with cleared counts.
fn transition(inner: &mut Inner, next: CircuitState, changes: &mut Vec<Transition>) {
    if inner.state == next {
        return;
    }
    changes.push((inner.state, next));
    inner.state = next;
    inner.generation += 1;
    inner.counts = Counts::default();
    inner.opened_at = match next {
        CircuitState::Open => Some(Instant::now()),
        _ => None,
    };
}

/// A call admitted under a particular generation.
///
/// Report the result with [`Admission::finish`]. Dropping an unfinished
/// admission hands its slot back without counting anything.
pub struct Admission<B: Deref<Target = CircuitBreaker>> {
    breaker: B,
    generation: u64,
    done: bool,
}

/// An admission that owns its breaker and can outlive the admitting call.
pub type Permit = Admission<Arc<CircuitBreaker>>;

impl<B: Deref<Target = CircuitBreaker>> Admission<B> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Count the call as a success or a failure.
    pub fn finish(mut self, success: bool) {
        self.done = true;
        self.breaker.record(self.generation, success);
    }
}

impl<B: Deref<Target = CircuitBreaker>> fmt::Debug for Admission<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission")
            .field("breaker", &self.breaker.name)
            .field("generation", &self.generation)
            .finish()
    }
}

impl<B: Deref<Target = CircuitBreaker>> Drop for Admission<B> {
    fn drop(&mut self) {
        if !self.done {
            self.breaker.release(self.generation);
        }
    }
}
