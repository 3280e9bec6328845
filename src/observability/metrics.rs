//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_circuit_state` (gauge): 0=closed, 1=open, 2=half-open, per client
//! - `guard_circuit_transitions_total` (counter): transitions by client and target state
//! - `guard_rate_limited_total` (counter): rejected admissions per client
//! - `guard_retries_total` (counter): backoff waits started
//! - `guard_operation_timeout_ms` (gauge): current adaptive timeout per operation
//! - `guard_timeouts_total` (counter): attempts that exceeded their deadline
//! - `guard_call_duration_seconds` (histogram): per-attempt latency per operation
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed recorder
//!   every call is a no-op, so unit tests need no setup
//! - Labels are client or operation names only

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter with an HTTP scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_circuit_state(client: &str, state: u8) {
    gauge!("guard_circuit_state", "client" => client.to_string()).set(f64::from(state));
}

pub fn record_circuit_transition(client: &str, to: &'static str) {
    counter!("guard_circuit_transitions_total", "client" => client.to_string(), "to" => to)
        .increment(1);
}

pub fn record_rate_limited(client: &str) {
    counter!("guard_rate_limited_total", "client" => client.to_string()).increment(1);
}

pub fn record_retry(attempt: u32) {
    counter!("guard_retries_total", "attempt" => attempt.to_string()).increment(1);
}

pub fn record_operation_timeout(operation: &str, timeout: Duration) {
    gauge!("guard_operation_timeout_ms", "operation" => operation.to_string())
        .set(timeout.as_millis() as f64);
}

pub fn record_call(operation: &str, elapsed: Duration, timed_out: bool) {
    histogram!("guard_call_duration_seconds", "operation" => operation.to_string())
        .record(elapsed.as_secs_f64());
    if timed_out {
        counter!("guard_timeouts_total", "operation" => operation.to_string()).increment(1);
    }
}
