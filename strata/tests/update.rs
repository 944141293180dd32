//! Optimistic update semantics at the manager level.

use strata::{TieredCache, UpdateMode};
use strata_core::{CacheItem, EntryKey, UpdateOutcome};
use strata_handle::CacheHandle;
use strata_memory::MemoryHandle;

fn key(k: &str) -> EntryKey {
    EntryKey::new(k).unwrap()
}

async fn two_tier(mode: UpdateMode) -> (TieredCache<u64>, MemoryHandle<u64>, MemoryHandle<u64>) {
    let l1 = MemoryHandle::builder().name("mem0").build().unwrap();
    let l2 = MemoryHandle::builder().name("mem1").build().unwrap();
    let cache = TieredCache::builder()
        .update_mode(mode)
        .handle(l1.clone())
        .handle(l2.clone())
        .build()
        .await
        .unwrap();
    (cache, l1, l2)
}

#[tokio::test]
async fn update_runs_against_the_deepest_tier_holding_the_entry() {
    let (cache, l1, l2) = two_tier(UpdateMode::Up).await;
    cache.put(CacheItem::new("c", 1).unwrap()).await.unwrap();
    // Make the first tier stale to prove the authoritative tier wins.
    l1.put(CacheItem::new("c", 100).unwrap()).await.unwrap();

    let outcome = cache.update("c", |v| Some(v + 1), 5).await.unwrap();

    assert!(outcome.is_updated());
    assert_eq!(*l2.get(&key("c")).await.unwrap().unwrap().value(), 2);
    // Update mode Up rewrites the tier in front.
    assert_eq!(*l1.get(&key("c")).await.unwrap().unwrap().value(), 2);
}

#[tokio::test]
async fn update_falls_back_when_the_deepest_tier_lacks_the_entry() {
    let (cache, l1, l2) = two_tier(UpdateMode::Up).await;
    // Entry exists only in the first tier.
    l1.put(CacheItem::new("c", 10).unwrap()).await.unwrap();

    let outcome = cache.update("c", |v| Some(v + 1), 5).await.unwrap();

    assert!(outcome.is_updated());
    assert_eq!(*l1.get(&key("c")).await.unwrap().unwrap().value(), 11);
    assert!(l2.get(&key("c")).await.unwrap().is_none());
}

#[tokio::test]
async fn update_mode_none_leaves_earlier_tiers_untouched() {
    let (cache, l1, l2) = two_tier(UpdateMode::None).await;
    cache.put(CacheItem::new("c", 1).unwrap()).await.unwrap();

    let outcome = cache.update("c", |v| Some(v + 1), 5).await.unwrap();

    assert!(outcome.is_updated());
    assert_eq!(*l2.get(&key("c")).await.unwrap().unwrap().value(), 2);
    assert_eq!(
        *l1.get(&key("c")).await.unwrap().unwrap().value(),
        1,
        "stale until the first tier expires or re-fills"
    );
}

#[tokio::test]
async fn update_on_a_missing_key_reports_not_found_and_creates_nothing() {
    let (cache, l1, l2) = two_tier(UpdateMode::Up).await;

    let outcome = cache.update("missing", |v| Some(v + 1), 5).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::NotFound);
    assert!(cache.get("missing").await.unwrap().is_none());
    assert_eq!(l1.count().await.unwrap(), 0);
    assert_eq!(l2.count().await.unwrap(), 0);
}

#[tokio::test]
async fn factory_returning_none_aborts_without_writing() {
    let (cache, _l1, l2) = two_tier(UpdateMode::Up).await;
    cache.put(CacheItem::new("c", 1).unwrap()).await.unwrap();

    let outcome = cache.update("c", |_| None, 5).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::FactoryReturnedNone);
    assert_eq!(*l2.get(&key("c")).await.unwrap().unwrap().value(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_updates_count_exactly() {
    const TASKS: u64 = 5;
    const ITERATIONS: u64 = 100;

    let (cache, _l1, _l2) = two_tier(UpdateMode::Up).await;
    assert!(cache.add(CacheItem::new("c", 0).unwrap()).await.unwrap());

    let mut tasks = Vec::new();
    for _ in 0..TASKS {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            let mut attempts = 0u64;
            for _ in 0..ITERATIONS {
                match cache.update("c", |v| Some(v + 1), 1_000).await.unwrap() {
                    UpdateOutcome::Updated { attempts: a, .. } => attempts += a as u64,
                    other => panic!("update lost: {other:?}"),
                }
            }
            attempts
        }));
    }

    let mut total_attempts = 0;
    for task in tasks {
        total_attempts += task.await.unwrap();
    }

    let total = TASKS * ITERATIONS;
    assert_eq!(cache.get("c").await.unwrap(), Some(total));
    assert!(total_attempts >= total);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn read_modify_put_races_lose_updates() {
    const TASKS: u64 = 8;
    const ITERATIONS: u64 = 100;

    let (cache, _l1, _l2) = two_tier(UpdateMode::Up).await;
    cache.put(CacheItem::new("c", 0).unwrap()).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..TASKS {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..ITERATIONS {
                let current = cache.get("c").await.unwrap().unwrap();
                // Widen the race window the way a real caller would by
                // doing work between the read and the write.
                tokio::task::yield_now().await;
                cache
                    .put(CacheItem::new("c", current + 1).unwrap())
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let total = TASKS * ITERATIONS;
    let counted = cache.get("c").await.unwrap().unwrap();
    assert!(
        counted < total,
        "unguarded read-modify-write must drop increments ({counted} vs {total})"
    );
}
