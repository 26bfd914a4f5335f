use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::BreakerError;
use crate::metrics::{
    BreakerCallRejected, BreakerFailureRecorded, BreakerTransitioned, InternalEvent,
};

/// Runtime circuit state for one upstream source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Enumerable gauge value exported for dashboards.
    pub const fn gauge_value(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::Open => 1.0,
            Self::HalfOpen => 2.0,
        }
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Transition counters, one per target state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCounts {
    pub opened: u64,
    pub half_opened: u64,
    pub closed: u64,
}

impl TransitionCounts {
    fn record(&mut self, to: CircuitState) {
        match to {
            CircuitState::Open => self.opened += 1,
            CircuitState::HalfOpen => self.half_opened += 1,
            CircuitState::Closed => self.closed += 1,
        }
    }
}

/// Read-only observation of a breaker, keyed by source name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub state_value: f64,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub last_failure_unix_ms: Option<u64>,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rejected_calls: u64,
    pub transitions: TransitionCounts,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_wall: Option<SystemTime>,
    probe_in_flight: bool,
    total_successes: u64,
    total_failures: u64,
    rejected_calls: u64,
    transitions: TransitionCounts,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            last_failure_wall: None,
            probe_in_flight: false,
            total_successes: 0,
            total_failures: 0,
            rejected_calls: 0,
            transitions: TransitionCounts::default(),
        }
    }
}

/// Thread-safe circuit breaker guarding calls to one named upstream source.
///
/// All state lives behind a single mutex so the threshold check and the
/// resulting transition happen atomically. The lock is never held while the
/// wrapped operation runs.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                ..config
            },
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Run a synchronous operation through the breaker.
    ///
    /// Returns [`BreakerError::Open`] without invoking `operation` while the
    /// circuit is open and the recovery timeout has not elapsed.
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let permit = self.acquire()?;
        match operation() {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(error) => {
                permit.fail();
                Err(BreakerError::Inner(error))
            }
        }
    }

    /// Run an asynchronous operation through the breaker.
    ///
    /// `operation` is only called (and its future only created) once the
    /// breaker admits the call.
    pub async fn call_async<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire()?;
        match operation().await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(error) => {
                permit.fail();
                Err(BreakerError::Inner(error))
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn last_failure_time(&self) -> Option<Instant> {
        self.lock().last_failure
    }

    /// Force the breaker back to Closed with no recorded failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.last_failure_wall = None;
        inner.probe_in_flight = false;
        info!(source = %self.name, "circuit breaker reset");
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            state_value: inner.state.gauge_value(),
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_ms: duration_ms(self.config.recovery_timeout),
            last_failure_unix_ms: inner.last_failure_wall.and_then(unix_ms),
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            rejected_calls: inner.rejected_calls,
            transitions: inner.transitions,
        }
    }

    fn acquire<E>(&self) -> Result<CallPermit<'_>, BreakerError<E>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(CallPermit::new(self, false)),
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                Ok(CallPermit::new(self, true))
            }
            CircuitState::HalfOpen => Err(self.reject(&mut inner, Duration::ZERO)),
            CircuitState::Open => {
                let elapsed = inner.last_failure.map(|failed_at| failed_at.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed < self.config.recovery_timeout => {
                        let retry_in = self.config.recovery_timeout - elapsed;
                        Err(self.reject(&mut inner, retry_in))
                    }
                    _ => {
                        self.transition(&mut inner, CircuitState::HalfOpen);
                        inner.probe_in_flight = true;
                        Ok(CallPermit::new(self, true))
                    }
                }
            }
        }
    }

    fn reject<E>(&self, inner: &mut CircuitInner, retry_in: Duration) -> BreakerError<E> {
        inner.rejected_calls += 1;
        BreakerCallRejected { source: &self.name }.emit();
        debug!(
            source = %self.name,
            retry_in_ms = duration_ms(retry_in),
            "circuit open, rejecting call"
        );
        BreakerError::Open {
            name: self.name.clone(),
            retry_in,
        }
    }

    fn record_success(&self, probe: bool) {
        let mut inner = self.lock();
        inner.total_successes += 1;
        if probe {
            inner.probe_in_flight = false;
            if inner.state == CircuitState::HalfOpen {
                self.transition(&mut inner, CircuitState::Closed);
            }
        }
    }

    fn record_failure(&self, probe: bool) {
        let mut inner = self.lock();
        inner.total_failures += 1;
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_wall = Some(SystemTime::now());
        BreakerFailureRecorded {
            source: &self.name,
            failure_count: inner.failure_count,
        }
        .emit();

        if probe {
            inner.probe_in_flight = false;
        }

        let reopen = match inner.state {
            CircuitState::HalfOpen => probe,
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if reopen {
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn release_probe(&self) {
        self.lock().probe_in_flight = false;
    }

    fn transition(&self, inner: &mut CircuitInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.transitions.record(to);
        if to == CircuitState::Closed {
            inner.failure_count = 0;
        }

        match to {
            CircuitState::Open => warn!(
                source = %self.name,
                from = %from,
                failure_count = inner.failure_count,
                "circuit opened"
            ),
            CircuitState::Closed => info!(source = %self.name, from = %from, "circuit closed"),
            CircuitState::HalfOpen => debug!(source = %self.name, "circuit half-open, probing"),
        }

        BreakerTransitioned {
            source: &self.name,
            from,
            to,
        }
        .emit();
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission ticket for one call. Dropping it unsettled (e.g. a cancelled
/// future) frees the half-open probe slot without recording an outcome.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success(self.probe);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.probe);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

fn unix_ms(at: SystemTime) -> Option<u64> {
    at.duration_since(UNIX_EPOCH).ok().map(duration_ms)
}
