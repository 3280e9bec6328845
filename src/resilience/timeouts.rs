//! Adaptive per-operation timeouts.
//!
//! # Responsibilities
//! - Hand out the current timeout budget for a named operation
//! - Grow the budget after a timeout, shrink it after sustained success
//! - Track the global timeout rate across all operations
//!
//! # Design Decisions
//! - Feedback controller, not an SLA: an adjustment only affects budgets handed
//!   out afterwards, never a call already in flight
//! - Growth: × (1 + factor) on every timeout, capped at max
//! - Shrink: × (1 − factor) on every 10th cumulative success, floored at min
//! - Budgets are whole milliseconds held in atomics; no lock on the read path

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::loader::{ensure_valid, ConfigError};
use crate::config::validation::check_timeouts;
use crate::config::TimeoutConfig;
use crate::observability::metrics;

/// Successes between two shrink steps.
const SHRINK_EVERY: u64 = 10;

#[derive(Debug)]
struct OperationTimeout {
    current_ms: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl OperationTimeout {
    fn new(initial_ms: u64) -> Self {
        Self {
            current_ms: AtomicU64::new(initial_ms),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Apply `step` atomically and return (old, new).
    fn adjust(&self, step: impl Fn(u64) -> u64) -> (u64, u64) {
        let old = self
            .current_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| Some(step(current)))
            .unwrap_or_else(|current| current);
        (old, step(old))
    }
}

/// Point-in-time view of one operation's timeout state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutSnapshot {
    pub timeout_ms: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Per-operation adaptive timeout estimator.
#[derive(Debug)]
pub struct TimeoutManager {
    config: TimeoutConfig,
    operations: DashMap<String, OperationTimeout>,
    total_requests: AtomicU64,
    timeout_count: AtomicU64,
}

impl TimeoutManager {
    pub fn new(config: TimeoutConfig) -> Result<Self, ConfigError> {
        ensure_valid(check_timeouts(&config))?;
        Ok(Self {
            config,
            operations: DashMap::new(),
            total_requests: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
        })
    }

    /// Current budget for `operation`, seeding it at the default on first lookup.
    pub fn get_timeout(&self, operation: &str) -> Duration {
        if let Some(state) = self.operations.get(operation) {
            return Duration::from_millis(state.current_ms.load(Ordering::Acquire));
        }
        let state = self
            .operations
            .entry(operation.to_string())
            .or_insert_with(|| OperationTimeout::new(self.config.default_ms));
        Duration::from_millis(state.current_ms.load(Ordering::Acquire))
    }

    /// Feed back the outcome of one completed call.
    ///
    /// Global counters always move. Per-operation adjustment only applies to
    /// operations previously handed a budget by `get_timeout`.
    pub fn record_outcome(&self, operation: &str, execution_time: Duration, timed_out: bool) {
        self.total_requests.fetch_add(1, Ordering::AcqRel);
        if timed_out {
            self.timeout_count.fetch_add(1, Ordering::AcqRel);
        }
        metrics::record_call(operation, execution_time, timed_out);

        let Some(state) = self.operations.get(operation) else {
            tracing::debug!(operation = %operation, "Outcome recorded for untracked operation");
            return;
        };

        let factor = self.config.adjustment_factor;
        if timed_out {
            state.failures.fetch_add(1, Ordering::AcqRel);
            let max_ms = self.config.max_ms;
            let (old, new) = state.adjust(|current| max_ms.min((current as f64 * (1.0 + factor)) as u64));
            tracing::debug!(
                operation = %operation,
                elapsed = ?execution_time,
                old_ms = old,
                new_ms = new,
                "Timeout observed, widening budget"
            );
            metrics::record_operation_timeout(operation, Duration::from_millis(new));
        } else {
            let successes = state.successes.fetch_add(1, Ordering::AcqRel) + 1;
            if successes % SHRINK_EVERY == 0 {
                let min_ms = self.config.min_ms;
                let (old, new) = state.adjust(|current| min_ms.max((current as f64 * (1.0 - factor)) as u64));
                tracing::debug!(
                    operation = %operation,
                    successes,
                    old_ms = old,
                    new_ms = new,
                    "Sustained success, tightening budget"
                );
                metrics::record_operation_timeout(operation, Duration::from_millis(new));
            }
        }
    }

    /// Timeouts divided by all recorded outcomes; 0.0 before any outcome.
    pub fn timeout_rate(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Acquire);
        if total == 0 {
            return 0.0;
        }
        self.timeout_count.load(Ordering::Acquire) as f64 / total as f64
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Acquire)
    }

    pub fn snapshot(&self, operation: &str) -> Option<TimeoutSnapshot> {
        self.operations.get(operation).map(|state| TimeoutSnapshot {
            timeout_ms: state.current_ms.load(Ordering::Acquire),
            successes: state.successes.load(Ordering::Acquire),
            failures: state.failures.load(Ordering::Acquire),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn manager() -> TimeoutManager {
        TimeoutManager::new(TimeoutConfig {
            default_ms: 1_000,
            min_ms: 500,
            max_ms: 1_500,
            adjustment_factor: 0.2,
        })
        .unwrap()
    }

    const FAST: Duration = Duration::from_millis(20);

    #[test]
    fn test_seeded_at_default() {
        let manager = manager();
        assert_eq!(manager.get_timeout("get-order"), Duration::from_millis(1_000));
        assert_eq!(
            manager.snapshot("get-order"),
            Some(TimeoutSnapshot { timeout_ms: 1_000, successes: 0, failures: 0 })
        );
    }

    #[test]
    fn test_timeout_grows_and_clamps_at_max() {
        let manager = manager();
        manager.get_timeout("op");

        manager.record_outcome("op", Duration::from_millis(1_000), true);
        assert_eq!(manager.get_timeout("op"), Duration::from_millis(1_200));

        manager.record_outcome("op", Duration::from_millis(1_200), true);
        assert_eq!(manager.get_timeout("op"), Duration::from_millis(1_440));

        manager.record_outcome("op", Duration::from_millis(1_440), true);
        assert_eq!(manager.get_timeout("op"), Duration::from_millis(1_500));
        assert_eq!(manager.snapshot("op").unwrap().failures, 3);
    }

    #[test]
    fn test_shrinks_every_tenth_success_and_clamps_at_min() {
        let manager = manager();
        manager.get_timeout("op");

        for _ in 0..9 {
            manager.record_outcome("op", FAST, false);
        }
        assert_eq!(manager.get_timeout("op"), Duration::from_millis(1_000));

        manager.record_outcome("op", FAST, false);
        assert_eq!(manager.get_timeout("op"), Duration::from_millis(800));

        for _ in 0..10 {
            manager.record_outcome("op", FAST, false);
        }
        assert_eq!(manager.get_timeout("op"), Duration::from_millis(640));

        for _ in 0..10 {
            manager.record_outcome("op", FAST, false);
        }
        assert_eq!(manager.get_timeout("op"), Duration::from_millis(512));

        for _ in 0..10 {
            manager.record_outcome("op", FAST, false);
        }
        assert_eq!(manager.get_timeout("op"), Duration::from_millis(500));
        assert_eq!(manager.snapshot("op").unwrap().successes, 40);
    }

    #[test]
    fn test_operations_converge_independently() {
        let manager = manager();
        manager.get_timeout("slow");
        manager.get_timeout("fast");

        manager.record_outcome("slow", Duration::from_millis(1_000), true);
        for _ in 0..10 {
            manager.record_outcome("fast", FAST, false);
        }

        assert_eq!(manager.get_timeout("slow"), Duration::from_millis(1_200));
        assert_eq!(manager.get_timeout("fast"), Duration::from_millis(800));
    }

    #[test]
    fn test_global_timeout_rate() {
        let manager = manager();
        assert_eq!(manager.timeout_rate(), 0.0);

        manager.get_timeout("a");
        manager.record_outcome("a", FAST, false);
        manager.record_outcome("a", FAST, true);
        manager.record_outcome("b", FAST, true);
        manager.record_outcome("b", FAST, false);

        assert_eq!(manager.total_requests(), 4);
        assert!((manager.timeout_rate() - 0.5).abs() < f64::EPSILON);
        // "b" was never looked up, so only the global counters saw it.
        assert_eq!(manager.snapshot("b"), None);
    }

    #[test]
    fn test_rejects_invalid_bounds() {
        let err = TimeoutManager::new(TimeoutConfig {
            default_ms: 100,
            min_ms: 500,
            max_ms: 1_500,
            adjustment_factor: 0.2,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_concurrent_outcomes_are_counted() {
        let manager = Arc::new(manager());
        manager.get_timeout("op");

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        manager.record_outcome("op", FAST, false);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let snapshot = manager.snapshot("op").unwrap();
        assert_eq!(snapshot.successes, 400);
        assert_eq!(manager.total_requests(), 400);
        assert!(snapshot.timeout_ms >= 500 && snapshot.timeout_ms <= 1_500);
    }
}
