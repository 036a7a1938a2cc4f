use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use heimdall::{CircuitBreaker, CircuitBreakerConfig, CircuitState, HeimdallError, Result};

fn breaker(failures: u32, reset: Duration, successes: u32) -> CircuitBreaker {
    CircuitBreaker::new(
        CircuitBreakerConfig::new()
            .failure_threshold(failures)
            .reset_timeout(reset)
            .success_threshold(successes),
    )
}

async fn fail(breaker: &CircuitBreaker) -> Result<()> {
    breaker
        .execute(|| async { Err::<(), _>(HeimdallError::Http("connection refused".into())) })
        .await
}

async fn succeed(breaker: &CircuitBreaker) -> Result<u32> {
    breaker.execute(|| async { Ok(7) }).await
}

#[tokio::test(start_paused = true)]
async fn opens_after_threshold_consecutive_failures() {
    let breaker = breaker(3, Duration::from_secs(30), 2);

    for _ in 0..2 {
        assert!(matches!(fail(&breaker).await, Err(HeimdallError::Http(_))));
        assert_eq!(breaker.state().state, CircuitState::Closed);
    }
    assert!(fail(&breaker).await.is_err());

    let state = breaker.state();
    assert_eq!(state.state, CircuitState::Open);
    assert_eq!(state.consecutive_failures, 3);
}

#[tokio::test(start_paused = true)]
async fn success_resets_failure_count() {
    let breaker = breaker(3, Duration::from_secs(30), 2);
    fail(&breaker).await.unwrap_err();
    fail(&breaker).await.unwrap_err();
    assert_eq!(succeed(&breaker).await.unwrap(), 7);
    fail(&breaker).await.unwrap_err();
    fail(&breaker).await.unwrap_err();

    let state = breaker.state();
    assert_eq!(state.state, CircuitState::Closed);
    assert_eq!(state.consecutive_failures, 2);
}

#[tokio::test(start_paused = true)]
async fn open_circuit_rejects_without_calling() {
    let breaker = breaker(1, Duration::from_secs(30), 1);
    fail(&breaker).await.unwrap_err();

    let calls = AtomicU32::new(0);
    tokio::time::advance(Duration::from_secs(10)).await;
    let err = breaker
        .execute(|| async {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::Relaxed), 0);
    match err {
        HeimdallError::CircuitOpen { retry_in } => assert_eq!(retry_in, Duration::from_secs(20)),
        other => panic!("expected CircuitOpen, got {other:?}"),
    }
    assert!(breaker.state().state == CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn still_open_at_exactly_reset_timeout() {
    let breaker = breaker(1, Duration::from_secs(30), 1);
    fail(&breaker).await.unwrap_err();

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(succeed(&breaker).await.unwrap_err().is_circuit_open());
}

#[tokio::test(start_paused = true)]
async fn half_open_trial_closes_after_success_threshold() {
    let breaker = breaker(1, Duration::from_secs(30), 2);
    fail(&breaker).await.unwrap_err();
    tokio::time::advance(Duration::from_millis(30_001)).await;

    succeed(&breaker).await.unwrap();
    let state = breaker.state();
    assert_eq!(state.state, CircuitState::HalfOpen);
    assert_eq!(state.consecutive_successes, 1);

    succeed(&breaker).await.unwrap();
    let state = breaker.state();
    assert_eq!(state.state, CircuitState::Closed);
    assert_eq!(state.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn half_open_failure_reopens() {
    let breaker = breaker(3, Duration::from_secs(5), 2);
    for _ in 0..3 {
        fail(&breaker).await.unwrap_err();
    }
    tokio::time::advance(Duration::from_secs(6)).await;

    succeed(&breaker).await.unwrap();
    assert_eq!(breaker.state().state, CircuitState::HalfOpen);

    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state().state, CircuitState::Open);
    assert!(succeed(&breaker).await.unwrap_err().is_circuit_open());
}

#[tokio::test(start_paused = true)]
async fn reset_forces_closed() {
    let breaker = breaker(1, Duration::from_secs(60), 1);
    fail(&breaker).await.unwrap_err();
    assert_eq!(breaker.state().state, CircuitState::Open);

    breaker.reset();
    let state = breaker.state();
    assert_eq!(state.state, CircuitState::Closed);
    assert_eq!(state.consecutive_failures, 0);
    assert!(state.since_last_failure.is_none());
    assert_eq!(succeed(&breaker).await.unwrap(), 7);
}

#[test]
fn snapshot_serializes_state_name() {
    let breaker = CircuitBreaker::default();
    let json = serde_json::to_value(breaker.state()).unwrap();
    assert_eq!(json["state"], "closed");
    assert_eq!(json["consecutive_failures"], 0);
}
