//! Error types shared by the resilience primitives.
//!
//! Two families of failure reach a caller:
//! - policy rejections (`CircuitOpen`, `RateLimited`): the operation never ran
//! - operation failures (`Failed`): the operation ran and its own error is returned as-is
//!
//! `Cancelled` is neither: a retry loop was interrupted while waiting out a backoff.

use std::time::Duration;
use thiserror::Error;

/// Returned when a circuit breaker refuses to admit a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Circuit breaker is open for {client}")]
pub struct CircuitOpenError {
    pub client: String,
}

/// Returned when a client's token bucket is empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Rate limit exceeded for client {client}. Permits per second: {permits_per_second}, Max burst seconds: {max_burst_seconds}"
)]
pub struct RateLimitExceeded {
    pub client: String,
    pub permits_per_second: u32,
    pub max_burst_seconds: u32,
}

/// Outcome of a guarded call that did not produce a value.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    /// Backoff wait interrupted before the next attempt.
    #[error("Retry interrupted after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// The wrapped operation ran and failed.
    #[error("{0}")]
    Failed(E),
}

impl<E> GuardError<E> {
    /// True when a policy blocked the call before the operation was invoked.
    pub fn is_rejected(&self) -> bool {
        matches!(self, GuardError::CircuitOpen(_) | GuardError::RateLimited(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GuardError::Cancelled { .. })
    }

    /// The operation's own error, if it ran and failed.
    pub fn into_failure(self) -> Option<E> {
        match self {
            GuardError::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&E> {
        match self {
            GuardError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> GuardError<GuardError<E>> {
    /// Collapse a breaker-wrapped retry result into a single layer.
    pub fn flatten(self) -> GuardError<E> {
        match self {
            GuardError::Failed(inner) => inner,
            GuardError::CircuitOpen(e) => GuardError::CircuitOpen(e),
            GuardError::RateLimited(e) => GuardError::RateLimited(e),
            GuardError::Cancelled { attempts } => GuardError::Cancelled { attempts },
        }
    }
}

/// How a failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection-level or deadline failure; worth another attempt.
    Transient,
    /// The remote end answered with an error; retrying will not help.
    Permanent,
}

/// Classification hook for errors crossing into the retry policy.
///
/// The core never inspects transport-specific error types; whatever error the
/// operation produces declares its own kind.
pub trait Classify {
    fn kind(&self) -> FailureKind;

    fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

/// Failure of a single outbound HTTP call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFailure {
    /// Connect, send or read failed before a response was obtained.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The attempt did not finish within its assigned timeout.
    #[error("Call timed out after {0:?}")]
    TimedOut(Duration),

    /// The remote end answered with a non-success status.
    #[error("HTTP error {status}: {body}")]
    Status { status: u16, body: String },

    /// The request could not be built (bad path, bad header).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl CallFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            CallFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Classify for CallFailure {
    fn kind(&self) -> FailureKind {
        match self {
            CallFailure::Transport(_) | CallFailure::TimedOut(_) => FailureKind::Transient,
            CallFailure::Status { .. } | CallFailure::InvalidRequest(_) => FailureKind::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_vs_failure() {
        let open: GuardError<CallFailure> = CircuitOpenError { client: "orders".into() }.into();
        assert!(open.is_rejected());
        assert!(open.failure().is_none());

        let failed = GuardError::Failed(CallFailure::Transport("reset".into()));
        assert!(!failed.is_rejected());
        assert_eq!(
            failed.into_failure(),
            Some(CallFailure::Transport("reset".into()))
        );
    }

    #[test]
    fn test_flatten_keeps_inner_failure() {
        let nested: GuardError<GuardError<CallFailure>> =
            GuardError::Failed(GuardError::Cancelled { attempts: 2 });
        assert!(nested.flatten().is_cancelled());

        let nested: GuardError<GuardError<CallFailure>> =
            GuardError::CircuitOpen(CircuitOpenError { client: "a".into() });
        assert!(nested.flatten().is_rejected());
    }

    #[test]
    fn test_rate_limit_message() {
        let err = RateLimitExceeded {
            client: "billing".into(),
            permits_per_second: 10,
            max_burst_seconds: 2,
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded for client billing. Permits per second: 10, Max burst seconds: 2"
        );
    }

    #[test]
    fn test_classification() {
        assert!(CallFailure::Transport("refused".into()).is_transient());
        assert!(CallFailure::TimedOut(Duration::from_millis(5)).is_transient());
        let status = CallFailure::Status { status: 503, body: String::new() };
        assert_eq!(status.kind(), FailureKind::Permanent);
        assert_eq!(status.status(), Some(503));
    }
}
