//! Retry logic.
//!
//! # Responsibilities
//! - Re-run an operation after transient failures, up to `max_attempts` in total
//! - Wait an exponentially growing delay between attempts
//! - Abort a pending wait when the caller's cancellation token fires
//!
//! # Design Decisions
//! - Only `FailureKind::Transient` errors are retried; permanent ones return at once
//! - The last observed failure is returned unchanged after exhaustion
//! - Stateless: one policy can serve any number of concurrent calls
//! - Dropping the returned future also stops the loop; the token exists for callers
//!   that cannot drop it
//! - Only waits are interruptible; an attempt in flight runs to completion

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::loader::{ensure_valid, ConfigError};
use crate::config::validation::check_retries;
use crate::config::RetryConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::error::{Classify, GuardError};

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Result<Self, ConfigError> {
        ensure_valid(check_retries(&config))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay after the `attempt`-th failure.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(
            attempt,
            self.config.initial_interval(),
            self.config.multiplier,
            self.config.max_interval(),
            self.config.jitter,
        )
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> Result<T, GuardError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        self.run_inner(operation, None).await
    }

    /// Like [`run`](Self::run), but cancelling `cancel` aborts any backoff wait
    /// with `GuardError::Cancelled`.
    pub async fn run_cancellable<F, Fut, T, E>(
        &self,
        operation: F,
        cancel: &CancellationToken,
    ) -> Result<T, GuardError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        self.run_inner(operation, Some(cancel)).await
    }

    async fn run_inner<F, Fut, T, E>(
        &self,
        mut operation: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, GuardError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let max_attempts = self.config.max_attempts;
        let mut attempts = 0;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_transient() {
                tracing::debug!(error = %error, "Failure is not retryable");
                return Err(GuardError::Failed(error));
            }

            attempts += 1;
            tracing::warn!(
                attempt = attempts,
                max_attempts,
                error = %error,
                "Request failed ({}/{})",
                attempts,
                max_attempts
            );
            if attempts >= max_attempts {
                return Err(GuardError::Failed(error));
            }

            let delay = self.delay_for(attempts);
            tracing::info!(attempt = attempts, delay = ?delay, "Waiting before retry");
            metrics::record_retry(attempts);

            let completed = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => false,
                    _ = tokio::time::sleep(delay) => true,
                },
                None => {
                    tokio::time::sleep(delay).await;
                    true
                }
            };
            if !completed {
                tracing::warn!(attempt = attempts, "Retry interrupted during backoff");
                return Err(GuardError::Cancelled { attempts });
            }
        }
    }
}
