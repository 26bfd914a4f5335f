//! Behavior-driven tests for circuit breakers and the breaker registry.
//!
//! These tests verify HOW a breaker guards an upstream source: when it opens,
//! what it does while open, and how it recovers.

use ferroingest_core::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    FetchError,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn breaker(threshold: u32, recovery_timeout: Duration) -> CircuitBreaker {
    CircuitBreaker::new(
        "nse",
        CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout,
        },
    )
}

fn fail(breaker: &CircuitBreaker) {
    let result = breaker.call(|| Err::<(), _>(FetchError::connection("reset by peer")));
    assert!(matches!(result, Err(BreakerError::Inner(_))));
}

// =============================================================================
// Circuit Breaker: Opening
// =============================================================================

#[test]
fn when_failures_reach_threshold_breaker_opens_and_stops_invoking() {
    // Given: A breaker with threshold 3 and a long recovery timeout
    let breaker = breaker(3, Duration::from_secs(60));

    // When: Three consecutive calls fail
    for _ in 0..3 {
        fail(&breaker);
    }

    // Then: The breaker is open
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.failure_count(), 3);

    // And: Further calls are rejected without invoking the operation
    let invocations = AtomicU32::new(0);
    for _ in 0..5 {
        let result = breaker.call(|| {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<_, FetchError>(())
        });
        match result {
            Err(BreakerError::Open { name, retry_in }) => {
                assert_eq!(name, "nse");
                assert!(retry_in <= Duration::from_secs(60));
            }
            other => panic!("expected open circuit, got {other:?}"),
        }
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert_eq!(breaker.snapshot().rejected_calls, 5);
}

#[test]
fn when_calls_succeed_below_threshold_breaker_stays_closed() {
    // Given: A breaker with threshold 3
    let breaker = breaker(3, Duration::from_secs(60));

    // When: Two failures are followed by a success
    fail(&breaker);
    fail(&breaker);
    let value = breaker.call(|| Ok::<_, FetchError>(7)).expect("closed breaker admits call");

    // Then: The call result passes through and the breaker remains closed
    assert_eq!(value, 7);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 2);
}

#[test]
fn when_operation_fails_its_error_is_returned_unchanged() {
    // Given: A closed breaker
    let breaker = breaker(5, Duration::from_secs(60));

    // When: The operation fails with a rate-limit error
    let result = breaker.call(|| Err::<(), _>(FetchError::rate_limited("429 from upstream")));

    // Then: The original error is returned inside `Inner`
    let error = result.expect_err("operation failed").into_inner().expect("inner error");
    assert_eq!(error, FetchError::rate_limited("429 from upstream"));
}

// =============================================================================
// Circuit Breaker: Recovery
// =============================================================================

#[test]
fn when_recovery_timeout_elapses_a_successful_probe_closes_the_circuit() {
    // Given: An open breaker with a short recovery timeout
    let breaker = breaker(1, Duration::from_millis(30));
    fail(&breaker);
    assert_eq!(breaker.state(), CircuitState::Open);

    // When: The timeout elapses and the next call succeeds
    thread::sleep(Duration::from_millis(50));
    let result = breaker.call(|| Ok::<_, FetchError>("fresh data"));

    // Then: The probe ran and the breaker closed with a clean failure count
    assert_eq!(result.expect("probe admitted"), "fresh data");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);

    let transitions = breaker.snapshot().transitions;
    assert_eq!(transitions.opened, 1);
    assert_eq!(transitions.half_opened, 1);
    assert_eq!(transitions.closed, 1);
}

#[test]
fn when_probe_fails_circuit_reopens_with_fresh_timeout() {
    // Given: An open breaker whose recovery timeout has elapsed
    let breaker = breaker(1, Duration::from_millis(30));
    fail(&breaker);
    thread::sleep(Duration::from_millis(50));

    // When: The probe call fails
    fail(&breaker);

    // Then: The breaker is open again and rejects immediately
    assert_eq!(breaker.state(), CircuitState::Open);
    let result = breaker.call(|| Ok::<_, FetchError>(()));
    assert!(matches!(result, Err(BreakerError::Open { .. })));
}

#[tokio::test]
async fn while_probe_is_in_flight_other_callers_are_rejected() {
    // Given: A half-open breaker with one slow probe running
    let breaker = Arc::new(breaker(1, Duration::from_millis(20)));
    fail(&breaker);
    tokio::time::sleep(Duration::from_millis(40)).await;

    let probe = {
        let breaker = Arc::clone(&breaker);
        tokio::spawn(async move {
            breaker
                .call_async(|| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, FetchError>(())
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    // When: A second caller arrives during the probe
    let second = breaker.call_async(|| async { Ok::<_, FetchError>(()) }).await;

    // Then: It is rejected, and the probe's success closes the circuit
    assert!(matches!(second, Err(BreakerError::Open { .. })));
    probe.await.expect("probe task").expect("probe succeeded");
    assert_eq!(breaker.state(), CircuitState::Closed);
}

// =============================================================================
// Circuit Breaker: Concurrency
// =============================================================================

#[test]
fn concurrent_failures_are_all_counted() {
    // Given: A shared breaker with a threshold above the total failure count
    let breaker = Arc::new(breaker(10_000, Duration::from_secs(60)));

    // When: Eight threads record fifty failures each
    let handles = (0..8)
        .map(|_| {
            let breaker = Arc::clone(&breaker);
            thread::spawn(move || {
                for _ in 0..50 {
                    let _ = breaker.call(|| Err::<(), _>(FetchError::timeout("slow")));
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().expect("worker thread");
    }

    // Then: No increment was lost
    assert_eq!(breaker.failure_count(), 400);
    assert_eq!(breaker.snapshot().total_failures, 400);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

// =============================================================================
// Registry: Isolation
// =============================================================================

#[test]
fn opening_one_source_leaves_other_sources_closed() {
    // Given: A registry with two sources sharing default settings
    let registry = CircuitBreakerRegistry::builder()
        .with_defaults(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        })
        .source("nse")
        .source("bse")
        .build()
        .expect("valid registry");

    // When: Only "nse" fails past its threshold
    let nse = registry.get("nse").expect("nse registered");
    fail(nse);
    fail(nse);

    // Then: "nse" is open, "bse" is untouched
    let bse = registry.get("bse").expect("bse registered");
    assert_eq!(nse.state(), CircuitState::Open);
    assert_eq!(bse.state(), CircuitState::Closed);
    assert_eq!(bse.failure_count(), 0);

    // And: Lookups return the same shared breaker every time
    assert!(Arc::ptr_eq(
        registry.get("nse").expect("nse"),
        registry.get("nse").expect("nse")
    ));
}

#[test]
fn reset_all_closes_every_breaker() {
    // Given: A registry with an open breaker
    let registry = CircuitBreakerRegistry::builder()
        .source_with(
            "nse",
            CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_secs(60),
            },
        )
        .build()
        .expect("valid registry");
    fail(registry.get("nse").expect("nse"));

    // When: The registry is reset
    registry.reset_all();

    // Then: Every breaker is closed again
    assert!(registry
        .snapshots()
        .iter()
        .all(|snapshot| snapshot.state == CircuitState::Closed && snapshot.failure_count == 0));
}
