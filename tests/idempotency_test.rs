use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use heimdall::{
    HeimdallError, IdempotencyConfig, IdempotencyTracker, Message, generate_key, stable_key,
};

async fn slow_answer(calls: &AtomicU32, answer: &str) -> heimdall::Result<String> {
    calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(answer.to_string())
}

#[tokio::test]
async fn concurrent_calls_share_one_execution() {
    let tracker = IdempotencyTracker::<String>::default();
    let calls = AtomicU32::new(0);

    let (a, b, c) = tokio::join!(
        tracker.execute("k", || slow_answer(&calls, "first")),
        tracker.execute("k", || slow_answer(&calls, "second")),
        tracker.execute("k", || slow_answer(&calls, "third")),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
}

#[tokio::test]
async fn completed_result_is_replayed() {
    let tracker = IdempotencyTracker::<String>::default();
    let calls = AtomicU32::new(0);

    let first = tracker
        .execute("k", || slow_answer(&calls, "one"))
        .await
        .unwrap();
    let second = tracker
        .execute("k", || slow_answer(&calls, "two"))
        .await
        .unwrap();

    assert_eq!(first, "one");
    assert_eq!(second, "one");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(tracker.contains("k"));
    assert_eq!(tracker.len().await, 1);
}

#[tokio::test]
async fn distinct_keys_run_independently() {
    let tracker = IdempotencyTracker::<String>::default();
    let calls = AtomicU32::new(0);

    let (a, b) = tokio::join!(
        tracker.execute("a", || slow_answer(&calls, "A")),
        tracker.execute("b", || slow_answer(&calls, "B")),
    );

    assert_eq!(a.unwrap(), "A");
    assert_eq!(b.unwrap(), "B");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failures_are_not_remembered() {
    let tracker = IdempotencyTracker::<String>::default();

    let err = tracker
        .execute("k", || async { Err(HeimdallError::Timeout) })
        .await
        .unwrap_err();
    assert!(matches!(err, HeimdallError::Timeout));
    assert!(!tracker.contains("k"));

    let ok = tracker
        .execute("k", || async { Ok("recovered".to_string()) })
        .await
        .unwrap();
    assert_eq!(ok, "recovered");
}

#[tokio::test]
async fn waiters_share_a_failure() {
    let tracker = IdempotencyTracker::<String>::default();
    let calls = AtomicU32::new(0);
    let failing = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err::<String, _>(HeimdallError::Api {
            status: 503,
            message: "down".into(),
        })
    };

    let (a, b) = tokio::join!(tracker.execute("k", failing), tracker.execute("k", failing));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(matches!(a, Err(HeimdallError::Api { status: 503, .. })));
    assert!(matches!(b, Err(HeimdallError::Api { status: 503, .. })));
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let tracker =
        IdempotencyTracker::<String>::new(&IdempotencyConfig::new().ttl(Duration::from_millis(100)));
    let calls = AtomicU32::new(0);

    tracker
        .execute("k", || slow_answer(&calls, "one"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    let again = tracker
        .execute("k", || slow_answer(&calls, "two"))
        .await
        .unwrap();

    assert_eq!(again, "two");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn clear_forgets_results() {
    let tracker = IdempotencyTracker::<String>::default();
    let calls = AtomicU32::new(0);

    tracker.execute("k", || slow_answer(&calls, "one")).await.unwrap();
    tracker.clear();
    tracker.execute("k", || slow_answer(&calls, "two")).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn generated_keys_never_deduplicate() {
    let messages = [Message::user("same")];
    let a = generate_key("chat", &messages).unwrap();
    let b = generate_key("chat", &messages).unwrap();
    assert_ne!(a, b);
}

#[test]
fn stable_keys_depend_on_arguments() {
    let a = stable_key("chat", &[Message::user("same")]).unwrap();
    assert_eq!(a, stable_key("chat", &[Message::user("same")]).unwrap());
    assert_ne!(a, stable_key("chat", &[Message::system("same")]).unwrap());
    assert!(a.starts_with("chat:"));
}
