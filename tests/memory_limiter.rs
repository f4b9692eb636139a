use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use shield::ratelimit::MemoryLimiterOptions;
use shield::{LimitConfig, Limiter, MemoryLimiter, Outcome};

fn config() -> LimitConfig {
    LimitConfig::new(2, Duration::from_millis(100)).unwrap()
}

async fn run(limiter: &MemoryLimiter, identifier: &str, calls: usize) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(calls);
    for _ in 0..calls {
        outcomes.push(limiter.allow(identifier).await.unwrap());
    }
    outcomes
}

#[tokio::test]
async fn test_allow_first_request() {
    let limiter = MemoryLimiter::new(config()).unwrap();

    assert_eq!(run(&limiter, "user_1", 1).await, vec![Outcome::allowed(1)]);

    limiter.close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_block_when_exceeding_limit() {
    let limiter = MemoryLimiter::new(config()).unwrap();

    assert_eq!(
        run(&limiter, "user_2", 3).await,
        vec![Outcome::allowed(1), Outcome::allowed(0), Outcome::blocked()]
    );

    limiter.close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_recover_after_window() {
    let limiter = MemoryLimiter::new(config()).unwrap();

    assert_eq!(
        run(&limiter, "user_3", 2).await,
        vec![Outcome::allowed(1), Outcome::allowed(0)]
    );

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(run(&limiter, "user_3", 1).await, vec![Outcome::allowed(1)]);

    limiter.close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_callers_never_exceed_limit() {
    let limiter = Arc::new(
        MemoryLimiter::new(LimitConfig::new(25, Duration::from_secs(60)).unwrap()).unwrap(),
    );

    let tasks = (0..200).map(|_| {
        let limiter = Arc::clone(&limiter);
        tokio::spawn(async move { limiter.allow("burst").await.unwrap() })
    });
    let outcomes: Vec<Outcome> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let allowed = outcomes.iter().filter(|o| o.allowed).count();
    assert_eq!(allowed, 25);
    assert!(outcomes.iter().filter(|o| !o.allowed).all(|o| o.remaining == 0));

    let mut remaining: Vec<u64> = outcomes
        .iter()
        .filter(|o| o.allowed)
        .map(|o| o.remaining)
        .collect();
    remaining.sort_unstable();
    assert_eq!(remaining, (0..25).collect::<Vec<u64>>());

    limiter.close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_background_reclamation_drops_idle_identifiers() {
    let limiter = MemoryLimiter::with_options(
        config(),
        MemoryLimiterOptions {
            reclaim_interval: Some(Duration::from_millis(50)),
            ..Default::default()
        },
    )
    .unwrap();

    run(&limiter, "idle", 1).await;
    assert_eq!(limiter.tracked_identifiers(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(limiter.tracked_identifiers(), 0);

    limiter.close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_no_reclamation_after_close() {
    let limiter = MemoryLimiter::with_options(
        config(),
        MemoryLimiterOptions {
            reclaim_interval: Some(Duration::from_millis(20)),
            ..Default::default()
        },
    )
    .unwrap();

    limiter.close(Duration::from_secs(1)).await.unwrap();

    // Admissions still work after close; only reclamation has stopped.
    run(&limiter, "after_close", 1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(limiter.tracked_identifiers(), 1);
}

#[tokio::test]
async fn test_allow_within_deadline() {
    let limiter = MemoryLimiter::new(config()).unwrap();

    let outcome = limiter
        .allow_within("user_4", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::allowed(1));

    limiter.close(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_usable_as_trait_object() {
    let limiter: Arc<dyn Limiter> = Arc::new(MemoryLimiter::new(config()).unwrap());

    assert_eq!(limiter.config().limit, 2);
    assert!(limiter.allow("dyn").await.unwrap().allowed);
    limiter.close(Duration::from_secs(1)).await.unwrap();
}
