//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: one probe request tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: first call after reset_timeout (that call is the probe)
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (reset_timeout restarts)
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global), see `registry.rs`
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open, guarded by a flag inside the state lock
//! - The lock is never held across the backend call

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::proxy::InvocationOutcome;
use crate::resilience::clock::Clock;

/// Breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitStatus {
    /// Gauge value exported to metrics.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitStatus::Closed => 0.0,
            CircuitStatus::HalfOpen => 1.0,
            CircuitStatus::Open => 2.0,
        }
    }
}

/// Thresholds for a single breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
        }
    }
}

/// Returned instead of invoking the backend when the breaker rejects a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit open for backend {backend_id} after {failure_count} failures")]
pub struct CircuitOpenError {
    pub backend_id: String,
    pub failure_count: u32,
    pub opened_at: Option<Instant>,
    /// Estimated time until the next probe is admitted.
    pub retry_after: Duration,
}

impl CircuitOpenError {
    /// `retry_after` rounded up to whole seconds, never less than one.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        secs.max(1)
    }
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitStatus,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    /// Bumped on every trip to Open; permits from an older generation are stale.
    generation: u64,
}

/// Point-in-time view of a breaker, for the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub backend_id: String,
    pub status: CircuitStatus,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    /// Milliseconds since the breaker last opened, while Open.
    pub open_for_ms: Option<u64>,
    pub probe_in_flight: bool,
}

/// Failure-counting state machine guarding calls to one backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    backend_id: String,
    settings: BreakerSettings,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(backend_id: impl Into<String>, settings: BreakerSettings, clock: Arc<dyn Clock>) -> Self {
        let backend_id = backend_id.into();
        tracing::debug!(
            backend = %backend_id,
            failure_threshold = settings.failure_threshold,
            reset_timeout_secs = settings.reset_timeout.as_secs(),
            "Circuit breaker initialized"
        );
        metrics::record_breaker_state(&backend_id, CircuitStatus::Closed);

        Self {
            backend_id,
            settings,
            clock,
            state: Mutex::new(BreakerState {
                status: CircuitStatus::Closed,
                failure_count: 0,
                opened_at: None,
                probe_in_flight: false,
                generation: 0,
            }),
        }
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    /// Current status without applying the Open → Half-Open timeout check.
    pub fn status(&self) -> CircuitStatus {
        self.lock().status
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let state = self.lock();
        BreakerSnapshot {
            backend_id: self.backend_id.clone(),
            status: state.status,
            failure_count: state.failure_count,
            failure_threshold: self.settings.failure_threshold,
            reset_timeout_secs: self.settings.reset_timeout.as_secs(),
            open_for_ms: match (state.status, state.opened_at) {
                (CircuitStatus::Open, Some(at)) => {
                    Some(now.saturating_duration_since(at).as_millis() as u64)
                }
                _ => None,
            },
            probe_in_flight: state.probe_in_flight,
        }
    }

    /// Run `invoke` if the breaker admits the call and record its outcome.
    ///
    /// Rejected calls never run `invoke`.
    pub async fn call<F, Fut>(&self, invoke: F) -> Result<InvocationOutcome, CircuitOpenError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = InvocationOutcome>,
    {
        let permit = self.try_acquire()?;
        let outcome = invoke().await;
        permit.record(outcome.is_success());
        Ok(outcome)
    }

    /// Admission decision. The returned permit must be resolved with `record`;
    /// dropping an unresolved probe permit frees the probe slot.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, CircuitOpenError> {
        let now = self.clock.now();
        let mut state = self.lock();

        let status = state.status;
        let generation = state.generation;
        match status {
            CircuitStatus::Closed => Ok(CallPermit::new(self, false, generation)),
            CircuitStatus::Open => {
                let opened_at = *state.opened_at.get_or_insert(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed >= self.settings.reset_timeout {
                    state.status = CircuitStatus::HalfOpen;
                    state.probe_in_flight = true;
                    let failures = state.failure_count;
                    drop(state);
                    self.announce(CircuitStatus::Open, CircuitStatus::HalfOpen, failures);
                    Ok(CallPermit::new(self, true, generation))
                } else {
                    Err(self.rejection(&state, self.settings.reset_timeout - elapsed))
                }
            }
            CircuitStatus::HalfOpen => {
                if state.probe_in_flight {
                    Err(self.rejection(&state, Duration::ZERO))
                } else {
                    state.probe_in_flight = true;
                    Ok(CallPermit::new(self, true, generation))
                }
            }
        }
    }

    fn record(&self, probe: bool, generation: u64, success: bool) {
        let now = self.clock.now();
        let mut state = self.lock();
        let before = state.status;

        if probe {
            state.probe_in_flight = false;
            if state.status != CircuitStatus::HalfOpen {
                return;
            }
            if success {
                state.status = CircuitStatus::Closed;
                state.failure_count = 0;
                state.opened_at = None;
            } else {
                state.failure_count = state.failure_count.saturating_add(1);
                state.status = CircuitStatus::Open;
                state.opened_at = Some(now);
                state.generation += 1;
            }
        } else {
            // Admitted while Closed but the breaker has tripped since,
            // even if a probe has closed it again.
            if state.status != CircuitStatus::Closed || state.generation != generation {
                return;
            }
            if success {
                state.failure_count = 0;
            } else {
                state.failure_count = state.failure_count.saturating_add(1);
                if state.failure_count >= self.settings.failure_threshold {
                    state.status = CircuitStatus::Open;
                    state.opened_at = Some(now);
                    state.generation += 1;
                }
            }
        }

        let after = state.status;
        let failures = state.failure_count;
        drop(state);

        if before != after {
            self.announce(before, after, failures);
        }
    }

    fn release_probe(&self) {
        let mut state = self.lock();
        state.probe_in_flight = false;
        tracing::debug!(backend = %self.backend_id, "Probe abandoned before completion");
    }

    fn rejection(&self, state: &BreakerState, retry_after: Duration) -> CircuitOpenError {
        CircuitOpenError {
            backend_id: self.backend_id.clone(),
            failure_count: state.failure_count,
            opened_at: state.opened_at,
            retry_after,
        }
    }

    fn announce(&self, from: CircuitStatus, to: CircuitStatus, failure_count: u32) {
        match to {
            CircuitStatus::Open => tracing::warn!(
                backend = %self.backend_id,
                from = ?from,
                failure_count,
                reset_timeout_secs = self.settings.reset_timeout.as_secs(),
                "Circuit opened"
            ),
            CircuitStatus::HalfOpen => tracing::info!(
                backend = %self.backend_id,
                "Circuit half-open, admitting probe"
            ),
            CircuitStatus::Closed => tracing::info!(
                backend = %self.backend_id,
                "Circuit closed, backend recovered"
            ),
        }
        metrics::record_breaker_state(&self.backend_id, to);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Admission ticket handed out by `try_acquire`.
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    generation: u64,
    resolved: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool, generation: u64) -> Self {
        Self {
            breaker,
            probe,
            generation,
            resolved: false,
        }
    }

    /// True if this call is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Record the outcome of the admitted call.
    pub fn record(mut self, success: bool) {
        self.resolved = true;
        self.breaker.record(self.probe, self.generation, success);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.resolved {
            self.breaker.release_probe();
        }
    }
}
