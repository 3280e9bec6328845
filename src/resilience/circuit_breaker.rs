//! Circuit breaker for outbound client protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: client assumed down, calls fail fast
//! - Half-Open: a single probe call is testing whether the client recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: reset_timeout elapsed since last failure (one CAS winner)
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - Per-client circuit breaker (not global), shared through `CircuitBreakerRegistry`
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open; every other caller is rejected while it runs
//! - A probe older than `half_open_timeout` may be taken over by one new caller
//! - All state lives in atomics; no lock is held across the wrapped call

use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::loader::{ensure_valid, ConfigError};
use crate::config::validation::check_circuit_breaker;
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::error::{CircuitOpenError, GuardError};

/// Circuit state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(val: u8) -> Self {
        match val {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Advisory health predicate attached to a breaker.
pub type HealthCheck = Arc<dyn Fn() -> bool + Send + Sync>;

fn always_healthy() -> HealthCheck {
    Arc::new(|| true)
}

const CLOSED: u8 = CircuitState::Closed as u8;
const OPEN: u8 = CircuitState::Open as u8;
const HALF_OPEN: u8 = CircuitState::HalfOpen as u8;

/// Timestamps are stored as nanoseconds since `epoch` plus one; zero means unset.
const UNSET: u64 = 0;

/// Circuit breaker for a single named client.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_timeout: Duration,
    health_check: HealthCheck,

    epoch: Instant,
    state: AtomicU8,
    failure_count: AtomicU32,
    last_failure: AtomicU64,
    half_open_at: AtomicU64,
}

impl CircuitBreaker {
    /// Create a breaker with an always-healthy predicate.
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Result<Self, ConfigError> {
        Self::with_health_check(name, config, always_healthy())
    }

    pub fn with_health_check(
        name: impl Into<String>,
        config: &CircuitBreakerConfig,
        health_check: HealthCheck,
    ) -> Result<Self, ConfigError> {
        ensure_valid(check_circuit_breaker(config))?;
        Ok(Self::build(name.into(), config, health_check))
    }

    fn build(name: String, config: &CircuitBreakerConfig, health_check: HealthCheck) -> Self {
        Self {
            name,
            failure_threshold: config.failure_threshold,
            reset_timeout: config.reset_timeout(),
            half_open_timeout: config.half_open_timeout(),
            health_check,
            epoch: Instant::now(),
            state: AtomicU8::new(CLOSED),
            failure_count: AtomicU32::new(0),
            last_failure: AtomicU64::new(UNSET),
            half_open_at: AtomicU64::new(UNSET),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` if the circuit admits it.
    ///
    /// The operation's own error is returned unchanged inside `GuardError::Failed`;
    /// `GuardError::CircuitOpen` means it was never invoked.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.try_acquire()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(GuardError::Failed(e))
            }
        }
    }

    /// Decide whether the caller may invoke the operation now.
    fn try_acquire(&self) -> Result<(), CircuitOpenError> {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                // A racing success can clear the stamp after the swap to OPEN; an
                // unset stamp must not keep the circuit open forever.
                let reset_due = self
                    .since(self.last_failure.load(Ordering::Acquire))
                    .map_or(true, |elapsed| elapsed >= self.reset_timeout);
                if !reset_due {
                    return Err(self.open_error());
                }

                if self
                    .state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.half_open_at.store(self.stamp(), Ordering::Release);
                    tracing::info!(client = %self.name, "Circuit breaker half-open, probing");
                    self.report(CircuitState::HalfOpen);
                    Ok(())
                } else {
                    Err(self.open_error())
                }
            }
            CircuitState::HalfOpen => {
                let started = self.half_open_at.load(Ordering::Acquire);
                let stalled = self
                    .since(started)
                    .is_some_and(|elapsed| elapsed >= self.half_open_timeout);
                if stalled
                    && self
                        .half_open_at
                        .compare_exchange(started, self.stamp(), Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    tracing::warn!(
                        client = %self.name,
                        timeout = ?self.half_open_timeout,
                        "Half-open probe stalled, starting a new probe"
                    );
                    return Ok(());
                }
                Err(self.open_error())
            }
        }
    }

    fn on_success(&self) {
        self.failure_count.store(0, Ordering::Release);
        let previous = self.state.swap(CLOSED, Ordering::AcqRel);
        self.last_failure.store(UNSET, Ordering::Release);
        self.half_open_at.store(UNSET, Ordering::Release);

        if previous != CLOSED {
            tracing::info!(
                client = %self.name,
                from = CircuitState::from(previous).as_str(),
                "Circuit breaker closed"
            );
            self.report(CircuitState::Closed);
        }
    }

    fn on_failure(&self) {
        self.last_failure.store(self.stamp(), Ordering::Release);

        // A failed probe reopens immediately, whatever the counter says.
        if self
            .state
            .compare_exchange(HALF_OPEN, OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.half_open_at.store(UNSET, Ordering::Release);
            tracing::warn!(client = %self.name, "Half-open probe failed, circuit breaker reopened");
            self.report(CircuitState::Open);
            return;
        }

        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold {
            let previous = self.state.swap(OPEN, Ordering::AcqRel);
            if previous != OPEN {
                self.last_failure.store(self.stamp(), Ordering::Release);
                tracing::warn!(
                    client = %self.name,
                    failures,
                    "Circuit breaker opened after {} failures",
                    failures
                );
                self.report(CircuitState::Open);
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Acquire)
    }

    /// Evaluate the attached health predicate. Advisory only: never changes state.
    pub fn is_healthy(&self) -> bool {
        (self.health_check)()
    }

    fn open_error(&self) -> CircuitOpenError {
        CircuitOpenError {
            client: self.name.clone(),
        }
    }

    fn stamp(&self) -> u64 {
        (self.epoch.elapsed().as_nanos() as u64).saturating_add(1)
    }

    fn since(&self, stamp: u64) -> Option<Duration> {
        if stamp == UNSET {
            return None;
        }
        let now = self.epoch.elapsed().as_nanos() as u64;
        Some(Duration::from_nanos(now.saturating_sub(stamp - 1)))
    }

    fn report(&self, state: CircuitState) {
        metrics::record_circuit_state(&self.name, state as u8);
        metrics::record_circuit_transition(&self.name, state.as_str());
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .finish()
    }
}

/// One breaker per client name, created on first use.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, ConfigError> {
        ensure_valid(check_circuit_breaker(&config))?;
        Ok(Self {
            config,
            breakers: DashMap::new(),
        })
    }

    /// Get or create the breaker for `name`.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_insert(name, always_healthy)
    }

    /// Get or create the breaker for `name`, attaching `health_check` if it is created now.
    pub fn get_with_health_check(&self, name: &str, health_check: HealthCheck) -> Arc<CircuitBreaker> {
        self.get_or_insert(name, move || health_check)
    }

    fn get_or_insert(&self, name: &str, health: impl FnOnce() -> HealthCheck) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(client = %name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::build(name.to_string(), &self.config, health()))
            })
            .value()
            .clone()
    }

    pub async fn execute<F, Fut, T, E>(&self, name: &str, operation: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get(name).execute(operation).await
    }

    pub fn state(&self, name: &str) -> Option<CircuitState> {
        self.breakers.get(name).map(|b| b.state())
    }

    pub fn failure_count(&self, name: &str) -> Option<u32> {
        self.breakers.get(name).map(|b| b.failure_count())
    }

    pub fn is_healthy(&self, name: &str) -> Option<bool> {
        self.breakers.get(name).map(|b| b.value().clone()).map(|b| b.is_healthy())
    }

    /// Drop the breaker for `name`; the next call starts from a fresh Closed breaker.
    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        let removed = self.breakers.remove(name).map(|(_, b)| b);
        if removed.is_some() {
            tracing::info!(client = %name, "Removed circuit breaker");
        }
        removed
    }

    pub fn names(&self) -> Vec<String> {
        self.breakers.iter().map(|r| r.key().clone()).collect()
    }
}
