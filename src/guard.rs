//! Composition of the resilience primitives around one outbound call.
//!
//! # Data Flow
//! ```text
//! Guard::call(client, operation, op)
//!     → RateLimiter::check_admission(client)        (reject: RateLimited)
//!     → CircuitBreakerRegistry::execute(client, ..)  (reject: CircuitOpen)
//!         → RetryPolicy::run_cancellable(..)         (Cancelled when the call's token fires)
//!             → each attempt:
//!                 TimeoutManager::get_timeout(operation)
//!                 tokio::time::timeout(budget, op())
//!                 TimeoutManager::record_outcome(operation, elapsed, timed_out)
//! ```
//!
//! # Design Decisions
//! - One guarded call is one breaker outcome, however many attempts the retry loop made
//! - Each attempt fetches a fresh budget, so a timeout widens the next attempt's deadline
//! - An elapsed deadline becomes `CallFailure::TimedOut`, which the retry loop treats as
//!   transient
//! - Each call waits on a child of the guard's root token: `shutdown` cancels every
//!   call, cancelling one child token cancels only its call
//! - Construction checks only the sections the guard uses; clients and observability
//!   are validated by whoever consumes them

use serde::Serialize;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::loader::ensure_valid;
use crate::config::validation::{
    check_circuit_breaker, check_rate_limit, check_retries, check_timeouts,
};
use crate::config::{ConfigError, GuardConfig};
use crate::resilience::{
    CallFailure, CircuitBreakerRegistry, CircuitState, GuardError, RateLimiter, RetryPolicy,
    TimeoutManager, TimeoutSnapshot,
};

/// Breaker and bucket state for one client.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub client: String,
    pub circuit: Option<CircuitState>,
    pub failure_count: Option<u32>,
    pub healthy: Option<bool>,
    pub available_tokens: Option<u64>,
}

/// Rate limiting, circuit breaking, retries and adaptive timeouts behind one call.
#[derive(Debug)]
pub struct Guard {
    breakers: CircuitBreakerRegistry,
    limiter: RateLimiter,
    timeouts: TimeoutManager,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl Guard {
    /// Validate the resilience sections of `config` and build every component.
    ///
    /// All section errors are reported together.
    pub fn new(config: &GuardConfig) -> Result<Self, ConfigError> {
        let mut errors = check_circuit_breaker(&config.circuit_breaker);
        errors.extend(check_rate_limit(&config.rate_limit));
        errors.extend(check_timeouts(&config.timeouts));
        errors.extend(check_retries(&config.retries));
        ensure_valid(errors)?;

        Ok(Self {
            breakers: CircuitBreakerRegistry::new(config.circuit_breaker.clone())?,
            limiter: RateLimiter::new(config.rate_limit.clone())?,
            timeouts: TimeoutManager::new(config.timeouts.clone())?,
            retry: RetryPolicy::new(config.retries.clone())?,
            shutdown: CancellationToken::new(),
        })
    }

    /// Run `op` against `client` under every policy.
    ///
    /// `operation` names the timeout budget; several operations may share a client.
    pub async fn call<F, Fut, T>(
        &self,
        client: &str,
        operation: &str,
        op: F,
    ) -> Result<T, GuardError<CallFailure>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        let cancel = self.cancellation_token();
        self.call_cancellable(client, operation, &cancel, op).await
    }

    /// Like [`call`](Self::call), but cancelling `cancel` aborts the call's backoff
    /// waits with `GuardError::Cancelled`.
    ///
    /// Tokens from [`cancellation_token`](Self::cancellation_token) also observe
    /// [`shutdown`](Self::shutdown); an unrelated token does not.
    pub async fn call_cancellable<F, Fut, T>(
        &self,
        client: &str,
        operation: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, GuardError<CallFailure>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallFailure>>,
    {
        self.limiter.check_admission(client)?;

        let timeouts = &self.timeouts;
        let attempt = || {
            let budget = timeouts.get_timeout(operation);
            let pending = op();
            async move {
                let started = Instant::now();
                let outcome = tokio::time::timeout(budget, pending).await;
                let elapsed = started.elapsed();
                match outcome {
                    Ok(result) => {
                        timeouts.record_outcome(operation, elapsed, false);
                        result
                    }
                    Err(_) => {
                        tracing::warn!(
                            operation = %operation,
                            budget = ?budget,
                            "Attempt exceeded its timeout"
                        );
                        timeouts.record_outcome(operation, elapsed, true);
                        Err(CallFailure::TimedOut(budget))
                    }
                }
            }
        };

        self.breakers
            .execute(client, || self.retry.run_cancellable(attempt, cancel))
            .await
            .map_err(GuardError::flatten)
    }

    /// Token for one call: cancelled by [`shutdown`](Self::shutdown), or on its own.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Abort every backoff wait in progress and any that start later.
    pub fn shutdown(&self) {
        tracing::info!("Cancelling pending retries");
        self.shutdown.cancel();
    }

    /// Root token; cancelling it is the same as [`shutdown`](Self::shutdown).
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn timeouts(&self) -> &TimeoutManager {
        &self.timeouts
    }

    pub fn client_status(&self, client: &str) -> ClientStatus {
        ClientStatus {
            client: client.to_string(),
            circuit: self.breakers.state(client),
            failure_count: self.breakers.failure_count(client),
            healthy: self.breakers.is_healthy(client),
            available_tokens: self.limiter.available_tokens(client),
        }
    }

    pub fn timeout_snapshot(&self, operation: &str) -> Option<TimeoutSnapshot> {
        self.timeouts.snapshot(operation)
    }
}
