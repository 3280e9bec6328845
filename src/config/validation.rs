//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds >= 1, timeout bounds ordered, factors in range)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Each component runs its own section check at construction, so a bad value
//!   fails before the first call instead of during one

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{
    CircuitBreakerConfig, ClientConfig, GuardConfig, ObservabilityConfig, RateLimitConfig,
    RetryConfig, TimeoutConfig,
};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("circuit_breaker.failure_threshold must be at least 1")]
    ZeroFailureThreshold,

    #[error("circuit_breaker.{0} must be greater than zero")]
    ZeroBreakerTimeout(&'static str),

    #[error("timeouts must satisfy min <= default <= max (got min={min_ms}ms, default={default_ms}ms, max={max_ms}ms)")]
    TimeoutBounds { min_ms: u64, default_ms: u64, max_ms: u64 },

    #[error("timeouts.min_ms must be greater than zero")]
    ZeroMinTimeout,

    #[error("timeouts.adjustment_factor must be strictly between 0 and 1 (got {0})")]
    AdjustmentFactor(f64),

    #[error("retries.max_attempts must be at least 1")]
    ZeroMaxAttempts,

    #[error("retries.multiplier must be a finite value >= 1.0 (got {0})")]
    Multiplier(f64),

    #[error("retries.initial_interval_ms ({initial_ms}) must not exceed retries.max_interval_ms ({max_ms})")]
    BackoffBounds { initial_ms: u64, max_ms: u64 },

    #[error("rate_limit burst capacity {0} exceeds {max}", max = u32::MAX)]
    BurstCapacity(u64),

    #[error("client '{name}' has an invalid base_url: {reason}")]
    ClientUrl { name: String, reason: String },

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),
}

pub fn check_circuit_breaker(config: &CircuitBreakerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if config.failure_threshold == 0 {
        errors.push(ValidationError::ZeroFailureThreshold);
    }
    if config.reset_timeout_ms == 0 {
        errors.push(ValidationError::ZeroBreakerTimeout("reset_timeout_ms"));
    }
    if config.half_open_timeout_ms == 0 {
        errors.push(ValidationError::ZeroBreakerTimeout("half_open_timeout_ms"));
    }
    errors
}

/// Zero permits is a valid shape that rejects everything; the product of permits and
/// burst seconds must fit in 32 bits.
pub fn check_rate_limit(config: &RateLimitConfig) -> Vec<ValidationError> {
    let capacity = config.capacity();
    if capacity > u64::from(u32::MAX) {
        return vec![ValidationError::BurstCapacity(capacity)];
    }
    Vec::new()
}

pub fn check_timeouts(config: &TimeoutConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if config.min_ms == 0 {
        errors.push(ValidationError::ZeroMinTimeout);
    }
    if config.min_ms > config.default_ms || config.default_ms > config.max_ms {
        errors.push(ValidationError::TimeoutBounds {
            min_ms: config.min_ms,
            default_ms: config.default_ms,
            max_ms: config.max_ms,
        });
    }
    let f = config.adjustment_factor;
    if !(f > 0.0 && f < 1.0) {
        errors.push(ValidationError::AdjustmentFactor(f));
    }
    errors
}

pub fn check_retries(config: &RetryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if config.max_attempts == 0 {
        errors.push(ValidationError::ZeroMaxAttempts);
    }
    if !config.multiplier.is_finite() || config.multiplier < 1.0 {
        errors.push(ValidationError::Multiplier(config.multiplier));
    }
    if config.initial_interval_ms > config.max_interval_ms {
        errors.push(ValidationError::BackoffBounds {
            initial_ms: config.initial_interval_ms,
            max_ms: config.max_interval_ms,
        });
    }
    errors
}

fn check_client(name: &str, config: &ClientConfig) -> Option<ValidationError> {
    match url::Url::parse(&config.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => None,
        Ok(url) => Some(ValidationError::ClientUrl {
            name: name.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => Some(ValidationError::ClientUrl {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn check_observability(config: &ObservabilityConfig) -> Option<ValidationError> {
    if config.metrics_enabled && config.metrics_address.parse::<SocketAddr>().is_err() {
        return Some(ValidationError::MetricsAddress(config.metrics_address.clone()));
    }
    None
}

/// Validate a whole configuration, collecting every problem found.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    errors.extend(check_circuit_breaker(&config.circuit_breaker));
    errors.extend(check_rate_limit(&config.rate_limit));
    errors.extend(check_timeouts(&config.timeouts));
    errors.extend(check_retries(&config.retries));
    for (name, client) in &config.clients {
        errors.extend(check_client(name, client));
    }
    errors.extend(check_observability(&config.observability));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
