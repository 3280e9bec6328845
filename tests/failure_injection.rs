//! Failure injection tests: a guard wrapped around real HTTP calls to a misbehaving backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rest_resilience::http::HttpInvoker;
use rest_resilience::resilience::{CallFailure, CircuitState, GuardError};
use rest_resilience::Guard;

mod common;

fn invoker(config: &rest_resilience::GuardConfig) -> HttpInvoker {
    HttpInvoker::new("backend", &config.clients["backend"]).unwrap()
}

#[tokio::test]
async fn test_retry_recovers_after_dropped_connections() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let addr = common::start_programmable_backend(move || {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                None
            } else {
                Some((200, "Success".into()))
            }
        }
    })
    .await;

    let config = common::guard_config(addr);
    let guard = Guard::new(&config).unwrap();
    let invoker = invoker(&config);

    let body = guard
        .call("backend", "get-root", || invoker.get("/"))
        .await
        .expect("should succeed after retries");

    assert_eq!(body, "Success");
    assert_eq!(call_count.load(Ordering::SeqCst), 3);
    let status = guard.client_status("backend");
    assert_eq!(status.circuit, Some(CircuitState::Closed));
    assert_eq!(status.failure_count, Some(0));
}

#[tokio::test]
async fn test_error_status_is_returned_without_retry() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let addr = common::start_programmable_backend(move || {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            Some((500, "Internal failure".into()))
        }
    })
    .await;

    let config = common::guard_config(addr);
    let guard = Guard::new(&config).unwrap();
    let invoker = invoker(&config);

    let err = guard
        .call("backend", "get-root", || invoker.get("/"))
        .await
        .unwrap_err();

    assert_eq!(
        err.into_failure(),
        Some(CallFailure::Status {
            status: 500,
            body: "Internal failure".into()
        })
    );
    assert_eq!(call_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_circuit_opens_and_stops_traffic() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let addr = common::start_programmable_backend(move || {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            None
        }
    })
    .await;

    let mut config = common::guard_config(addr);
    config.circuit_breaker.failure_threshold = 2;
    config.retries.max_attempts = 1;
    let guard = Guard::new(&config).unwrap();
    let invoker = invoker(&config);

    for _ in 0..2 {
        let err = guard
            .call("backend", "get-root", || invoker.get("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Failed(CallFailure::Transport(_))));
    }
    assert_eq!(guard.breakers().state("backend"), Some(CircuitState::Open));

    let err = guard
        .call("backend", "get-root", || invoker.get("/"))
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::CircuitOpen(_)));
    assert_eq!(call_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_slow_backend_times_out_and_budget_grows() {
    let addr = common::start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Some((200, "late".into()))
    })
    .await;

    let mut config = common::guard_config(addr);
    config.timeouts.default_ms = 200;
    config.timeouts.min_ms = 100;
    config.timeouts.max_ms = 400;
    config.timeouts.adjustment_factor = 0.5;
    config.retries.max_attempts = 2;
    let guard = Guard::new(&config).unwrap();
    let invoker = invoker(&config);

    let err = guard
        .call("backend", "slow", || invoker.get("/"))
        .await
        .unwrap_err();

    assert_eq!(
        err.into_failure(),
        Some(CallFailure::TimedOut(Duration::from_millis(300)))
    );
    assert_eq!(guard.timeout_snapshot("slow").unwrap().timeout_ms, 400);
    assert_eq!(guard.timeouts().total_requests(), 2);
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_calls() {
    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    let addr = common::start_programmable_backend(move || {
        let cc = cc.clone();
        async move {
            cc.fetch_add(1, Ordering::SeqCst);
            Some((200, "ok".into()))
        }
    })
    .await;

    let mut config = common::guard_config(addr);
    config.rate_limit.permits_per_second = 2;
    let guard = Guard::new(&config).unwrap();
    let invoker = invoker(&config);

    let mut admitted = 0;
    let mut limited = 0;
    for _ in 0..5 {
        match guard.call("backend", "get-root", || invoker.get("/")).await {
            Ok(_) => admitted += 1,
            Err(GuardError::RateLimited(e)) => {
                assert_eq!(e.permits_per_second, 2);
                limited += 1;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(admitted, 2);
    assert_eq!(limited, 3);
    assert_eq!(call_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_shutdown_cancels_retry_wait() {
    let addr = common::start_programmable_backend(|| async { None }).await;

    let mut config = common::guard_config(addr);
    config.retries.max_attempts = 5;
    config.retries.initial_interval_ms = 10_000;
    config.retries.max_interval_ms = 10_000;
    let guard = Arc::new(Guard::new(&config).unwrap());
    let invoker = invoker(&config);

    let task = {
        let guard = guard.clone();
        tokio::spawn(async move { guard.call("backend", "get-root", || invoker.get("/")).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    guard.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("cancelled call should return promptly")
        .unwrap();
    assert!(matches!(result, Err(GuardError::Cancelled { attempts: 1 })));
}
