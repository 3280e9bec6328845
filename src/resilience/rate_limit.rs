//! Per-client token bucket rate limiting.
//!
//! # Design Decisions
//! - Refill is lazy: computed on access, no background timer
//! - Refill happens in whole seconds counted from the bucket's creation, so partial
//!   seconds carry over to the next check
//! - Credited seconds and tokens share one `AtomicU64`; refill and consumption are a
//!   single `fetch_update`, so K tokens admit exactly K callers however many race for
//!   them and no caller observes a refill half applied

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

use crate::config::loader::{ensure_valid, ConfigError};
use crate::config::validation::check_rate_limit;
use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::resilience::error::RateLimitExceeded;

/// Low half of the bucket state: tokens. High half: seconds already credited.
const TOKEN_MASK: u64 = u32::MAX as u64;

fn pack(credited_secs: u64, tokens: u64) -> u64 {
    (credited_secs << 32) | tokens
}

fn unpack(state: u64) -> (u64, u64) {
    (state >> 32, state & TOKEN_MASK)
}

/// A token bucket refilled at `permits_per_second`, capped at `capacity`.
#[derive(Debug)]
struct TokenBucket {
    capacity: u64,
    permits_per_second: u64,
    epoch: Instant,
    state: AtomicU64,
}

impl TokenBucket {
    /// Capacity must fit in 32 bits; `check_rate_limit` enforces it.
    fn new(permits_per_second: u32, max_burst_seconds: u32) -> Self {
        let capacity = (u64::from(permits_per_second) * u64::from(max_burst_seconds)).min(TOKEN_MASK);
        Self {
            capacity,
            permits_per_second: u64::from(permits_per_second),
            epoch: Instant::now(),
            state: AtomicU64::new(pack(0, capacity)),
        }
    }

    fn now_secs(&self) -> u64 {
        self.epoch.elapsed().as_secs().min(TOKEN_MASK)
    }

    /// Credit every whole second between the last credit and `now_secs`.
    fn refilled(&self, state: u64, now_secs: u64) -> (u64, u64) {
        let (credited, tokens) = unpack(state);
        let elapsed = now_secs.saturating_sub(credited);
        if elapsed == 0 {
            return (credited, tokens);
        }
        let added = elapsed.saturating_mul(self.permits_per_second);
        (now_secs, tokens.saturating_add(added).min(self.capacity))
    }

    fn try_consume(&self) -> bool {
        let now = self.now_secs();
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                let (credited, tokens) = self.refilled(state, now);
                if tokens == 0 {
                    None
                } else {
                    Some(pack(credited, tokens - 1))
                }
            })
            .is_ok()
    }

    fn available(&self) -> u64 {
        let (_, tokens) = self.refilled(self.state.load(Ordering::Acquire), self.now_secs());
        tokens
    }
}

/// Admission control keyed by client name.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        ensure_valid(check_rate_limit(&config))?;
        Ok(Self {
            config,
            buckets: DashMap::new(),
        })
    }

    /// Take one token for `client`, or reject.
    ///
    /// A disabled limiter admits everything and creates no buckets.
    pub fn check_admission(&self, client: &str) -> Result<(), RateLimitExceeded> {
        if !self.config.enabled {
            return Ok(());
        }

        if self.with_bucket(client, TokenBucket::try_consume) {
            return Ok(());
        }

        tracing::warn!(
            client = %client,
            permits_per_second = self.config.permits_per_second,
            max_burst_seconds = self.config.max_burst_seconds,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(client);
        Err(RateLimitExceeded {
            client: client.to_string(),
            permits_per_second: self.config.permits_per_second,
            max_burst_seconds: self.config.max_burst_seconds,
        })
    }

    /// Tokens currently available to `client`, after crediting any pending refill.
    ///
    /// Returns `None` for a client that has not been seen yet.
    pub fn available_tokens(&self, client: &str) -> Option<u64> {
        self.buckets.get(client).map(|bucket| bucket.available())
    }

    fn with_bucket<R>(&self, client: &str, f: impl FnOnce(&TokenBucket) -> R) -> R {
        if let Some(bucket) = self.buckets.get(client) {
            return f(bucket.value());
        }
        let bucket = self.buckets.entry(client.to_string()).or_insert_with(|| {
            tracing::debug!(
                client = %client,
                capacity = self.config.capacity(),
                "Creating token bucket"
            );
            TokenBucket::new(self.config.permits_per_second, self.config.max_burst_seconds)
        });
        f(bucket.value())
    }
}
