mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::init_tracing;
use news_aggregator::types::*;
use news_aggregator::{CacheOrigin, FetchCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn ok(source_id: &str) -> FetchResult {
    FetchResult::success(source_id, Vec::new(), Utc::now())
}

fn counted(
    calls: &Arc<AtomicUsize>,
    result: FetchResult,
) -> impl FnOnce() -> std::future::Ready<FetchResult> {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(result)
    }
}

#[tokio::test(start_paused = true)]
async fn test_entry_is_reused_until_ttl_expires() {
    init_tracing();
    let cache = FetchCache::new(Duration::from_secs(60), Duration::from_secs(10), 16);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache.get_or_fetch("reuters", false, counted(&calls, ok("reuters"))).await;
    assert_eq!(first.origin, CacheOrigin::Fetched);

    tokio::time::advance(Duration::from_secs(59)).await;
    let second = cache.get_or_fetch("reuters", false, counted(&calls, ok("reuters"))).await;
    assert_eq!(second.origin, CacheOrigin::Hit);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    let third = cache.get_or_fetch("reuters", false, counted(&calls, ok("reuters"))).await;
    assert_eq!(third.origin, CacheOrigin::Fetched);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stats = cache.stats();
    info!("Cache stats: {:?}", stats);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
}

#[tokio::test(start_paused = true)]
async fn test_huge_ttl_stores_instead_of_overflowing() {
    let cache = FetchCache::new(Duration::from_secs(u64::MAX), Duration::MAX, 16);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache.get_or_fetch("ap", false, counted(&calls, ok("ap"))).await;
    assert_eq!(first.origin, CacheOrigin::Fetched);

    tokio::time::advance(Duration::from_secs(365 * 86_400)).await;
    let second = cache.get_or_fetch("ap", false, counted(&calls, ok("ap"))).await;
    assert_eq!(second.origin, CacheOrigin::Hit);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_fetch() {
    init_tracing();
    let cache = FetchCache::new(Duration::from_secs(60), Duration::from_secs(10), 16);
    let calls = Arc::new(AtomicUsize::new(0));

    let lookups = futures::future::join_all((0..10).map(|_| {
        let calls = Arc::clone(&calls);
        cache.get_or_fetch("bloomberg", false, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            ok("bloomberg")
        })
    }))
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let fetched = lookups.iter().filter(|l| l.origin == CacheOrigin::Fetched).count();
    let joined = lookups.iter().filter(|l| l.origin == CacheOrigin::Joined).count();
    assert_eq!(fetched, 1);
    assert_eq!(joined, 9);
    assert!(lookups.iter().all(|l| l.result.status == FetchStatus::Success));
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_cached_for_the_shorter_ttl() {
    init_tracing();
    let cache = FetchCache::new(Duration::from_secs(60), Duration::from_secs(10), 16);
    let calls = Arc::new(AtomicUsize::new(0));
    let failed = FetchResult::failure(
        "wsj",
        &AggregatorError::HttpStatus { status: 503 },
        Utc::now(),
    );

    let first = cache.get_or_fetch("wsj", false, counted(&calls, failed.clone())).await;
    assert_eq!(first.result.status, FetchStatus::Failed);

    tokio::time::advance(Duration::from_secs(5)).await;
    let second = cache.get_or_fetch("wsj", false, counted(&calls, failed.clone())).await;
    assert_eq!(second.origin, CacheOrigin::Hit);
    assert_eq!(second.result.status, FetchStatus::Failed);

    tokio::time::advance(Duration::from_secs(5)).await;
    let third = cache.get_or_fetch("wsj", false, counted(&calls, ok("wsj"))).await;
    assert_eq!(third.origin, CacheOrigin::Fetched);
    assert_eq!(third.result.status, FetchStatus::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_zero_failure_ttl_does_not_cache_failures() {
    let cache = FetchCache::new(Duration::from_secs(60), Duration::ZERO, 16);
    let failed =
        FetchResult::failure("ft", &AggregatorError::HttpStatus { status: 500 }, Utc::now());
    let calls = Arc::new(AtomicUsize::new(0));

    cache.get_or_fetch("ft", false, counted(&calls, failed.clone())).await;
    cache.get_or_fetch("ft", false, counted(&calls, failed)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(cache.peek("ft").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_forced_refresh_skips_live_entry() {
    init_tracing();
    let cache = FetchCache::new(Duration::from_secs(60), Duration::from_secs(10), 16);
    let calls = Arc::new(AtomicUsize::new(0));

    cache.get_or_fetch("npr", false, counted(&calls, ok("npr"))).await;
    let forced = cache.get_or_fetch("npr", true, counted(&calls, ok("npr"))).await;

    assert_eq!(forced.origin, CacheOrigin::Fetched);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_forced_refresh_joins_running_fetch() {
    let cache = FetchCache::new(Duration::from_secs(60), Duration::from_secs(10), 16);
    let calls = Arc::new(AtomicUsize::new(0));

    let slow = {
        let calls = Arc::clone(&calls);
        cache.get_or_fetch("bbc", false, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            ok("bbc")
        })
    };
    let forced = cache.get_or_fetch("bbc", true, counted(&calls, ok("bbc")));

    let (first, second) = tokio::join!(slow, forced);
    assert_eq!(first.origin, CacheOrigin::Fetched);
    assert_eq!(second.origin, CacheOrigin::Joined);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_capacity_evicts_oldest_fetch_first() {
    init_tracing();
    let cache = FetchCache::new(Duration::from_secs(600), Duration::from_secs(10), 2);
    let now = Utc::now();

    for (id, age_secs) in [("older", 30), ("oldest", 60), ("newest", 0)] {
        let result = FetchResult::success(id, Vec::new(), now - ChronoDuration::seconds(age_secs));
        cache.get_or_fetch(id, false, move || async move { result }).await;
    }

    assert_eq!(cache.len(), 2);
    assert!(cache.peek("oldest").is_none());
    assert!(cache.peek("older").is_some());
    assert!(cache.peek("newest").is_some());
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_purge_drops_expired_entries() {
    let cache = FetchCache::new(Duration::from_secs(60), Duration::from_secs(10), 16);
    cache.get_or_fetch("a", false, || async { ok("a") }).await;
    cache
        .get_or_fetch("b", false, || async {
            FetchResult::failure("b", &AggregatorError::Timeout { after_ms: 100 }, Utc::now())
        })
        .await;

    tokio::time::advance(Duration::from_secs(11)).await;
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.peek("a").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_leader_hands_over_to_waiter() {
    init_tracing();
    let cache = Arc::new(FetchCache::new(Duration::from_secs(60), Duration::from_secs(10), 16));

    let leader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .get_or_fetch("hn", false, || std::future::pending::<FetchResult>())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(cache.is_in_flight("hn"));

    let waiter = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_or_fetch("hn", false, || async { ok("hn") }).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    leader.abort();
    let lookup = waiter.await.expect("waiter task completes");

    assert_eq!(lookup.origin, CacheOrigin::Fetched);
    assert_eq!(lookup.result.status, FetchStatus::Success);
    assert!(!cache.is_in_flight("hn"));
}
