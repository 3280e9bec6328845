//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call for client C, operation O:
//!     → rate_limit.rs (take a token from C's bucket or reject)
//!     → circuit_breaker.rs (admit unless C's circuit is open)
//!     → retries.rs (re-run transient failures with backoff.rs delays)
//!     → timeouts.rs (deadline for each attempt of O, adjusted by outcome)
//! ```
//!
//! # Design Decisions
//! - Each primitive is usable on its own; `crate::guard` composes them
//! - Per-client and per-operation state is created lazily on first use
//! - Policy rejections never invoke the wrapped operation
//! - Operation errors pass through unchanged inside `GuardError::Failed`

pub mod backoff;
pub mod circuit_breaker;
pub mod error;
pub mod rate_limit;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState, HealthCheck};
pub use error::{
    CallFailure, CircuitOpenError, Classify, FailureKind, GuardError, RateLimitExceeded,
};
pub use rate_limit::RateLimiter;
pub use retries::RetryPolicy;
pub use timeouts::{TimeoutManager, TimeoutSnapshot};
