//! Manager semantics across tiers.

use std::time::Duration;

use strata::{CacheError, CacheHandle, ConfigError, TieredCache, UpdateMode};
use strata_core::{CacheItem, EntryKey, Expiration};
use strata_memory::MemoryHandle;
use tokio::time::sleep;

fn key(k: &str) -> EntryKey {
    EntryKey::new(k).unwrap()
}

fn mem(name: &str) -> MemoryHandle<u32> {
    MemoryHandle::builder().name(name).build().unwrap()
}

async fn two_tier(mode: UpdateMode) -> (TieredCache<u32>, MemoryHandle<u32>, MemoryHandle<u32>) {
    let l1 = mem("mem0");
    let l2 = mem("mem1");
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
async fn put_is_visible_in_every_tier() {
    let (cache, l1, l2) = two_tier(UpdateMode::Up).await;
    cache.put(CacheItem::new("k", 7).unwrap()).await.unwrap();

    assert_eq!(cache.get("k").await.unwrap(), Some(7));
    assert_eq!(*l1.get(&key("k")).await.unwrap().unwrap().value(), 7);
    assert_eq!(*l2.get(&key("k")).await.unwrap().unwrap().value(), 7);
}

#[tokio::test]
async fn deep_hits_promote_into_earlier_tiers() {
    let (cache, l1, l2) = two_tier(UpdateMode::Up).await;
    // Written behind the manager's back, into the last tier only.
    l2.put(CacheItem::new("k", 7).unwrap()).await.unwrap();

    assert_eq!(cache.get("k").await.unwrap(), Some(7));
    assert_eq!(
        *l1.get(&key("k")).await.unwrap().unwrap().value(),
        7,
        "read-through fill must populate the first tier"
    );
}

#[tokio::test]
async fn promotion_refills_a_dropped_first_tier() {
    let (cache, l1, _l2) = two_tier(UpdateMode::Up).await;
    assert!(cache.add(CacheItem::new("a", 1).unwrap()).await.unwrap());

    assert!(l1.remove(&key("a")).await.unwrap());

    assert_eq!(cache.get("a").await.unwrap(), Some(1));
    assert_eq!(*l1.get(&key("a")).await.unwrap().unwrap().value(), 1);
}

#[tokio::test]
async fn update_mode_none_skips_promotion() {
    let (cache, l1, _l2) = two_tier(UpdateMode::None).await;
    assert!(cache.add(CacheItem::new("a", 1).unwrap()).await.unwrap());

    assert!(l1.remove(&key("a")).await.unwrap());

    assert_eq!(cache.get("a").await.unwrap(), Some(1));
    assert!(
        l1.get(&key("a")).await.unwrap().is_none(),
        "no fill under update mode none"
    );
}

#[tokio::test]
async fn add_refuses_to_overwrite() {
    let (cache, _l1, _l2) = two_tier(UpdateMode::Up).await;
    assert!(cache.add(CacheItem::new("a", 1).unwrap()).await.unwrap());
    assert!(!cache.add(CacheItem::new("a", 2).unwrap()).await.unwrap());

    assert_eq!(cache.get("a").await.unwrap(), Some(1));
}

#[tokio::test]
async fn remove_clears_every_tier() {
    let (cache, l1, l2) = two_tier(UpdateMode::Up).await;
    cache.put(CacheItem::new("k", 7).unwrap()).await.unwrap();

    assert!(cache.remove("k").await.unwrap());
    assert!(!cache.remove("k").await.unwrap());

    assert!(cache.get("k").await.unwrap().is_none());
    assert!(l1.get(&key("k")).await.unwrap().is_none());
    assert!(l2.get(&key("k")).await.unwrap().is_none());
}

#[tokio::test]
async fn clear_region_does_not_leak_into_other_namespaces() {
    let (cache, _l1, _l2) = two_tier(UpdateMode::Up).await;
    cache.put(CacheItem::new("k", 0).unwrap()).await.unwrap();
    cache
        .put(CacheItem::new_in("k", "r1", 1).unwrap())
        .await
        .unwrap();
    cache
        .put(CacheItem::new_in("k", "r2", 2).unwrap())
        .await
        .unwrap();

    cache.clear_region("r1").await.unwrap();

    assert!(cache.get_in("k", "r1").await.unwrap().is_none());
    assert_eq!(cache.get("k").await.unwrap(), Some(0));
    assert_eq!(cache.get_in("k", "r2").await.unwrap(), Some(2));
}

#[tokio::test]
async fn clear_empties_the_whole_stack() {
    let (cache, l1, l2) = two_tier(UpdateMode::Up).await;
    cache.put(CacheItem::new("a", 1).unwrap()).await.unwrap();
    cache
        .put(CacheItem::new_in("b", "r", 2).unwrap())
        .await
        .unwrap();

    cache.clear().await.unwrap();

    assert!(cache.get("a").await.unwrap().is_none());
    assert!(cache.get_in("b", "r").await.unwrap().is_none());
    assert_eq!(l1.count().await.unwrap(), 0);
    assert_eq!(l2.count().await.unwrap(), 0);
}

#[tokio::test]
async fn absolute_expiration_applies_through_the_manager() {
    let handle = mem("mem0");
    let cache = TieredCache::builder()
        .handle(handle.clone())
        .build()
        .await
        .unwrap();

    let item = CacheItem::new("a", 1)
        .unwrap()
        .with_expiration(Expiration::Absolute(Duration::from_millis(150)))
        .unwrap();
    assert!(cache.add(item).await.unwrap());

    sleep(Duration::from_millis(30)).await;
    assert_eq!(cache.get("a").await.unwrap(), Some(1));

    sleep(Duration::from_millis(150)).await;
    assert!(cache.get("a").await.unwrap().is_none());
}

#[tokio::test]
async fn expire_repolicies_the_entry_in_every_tier() {
    let (cache, l1, l2) = two_tier(UpdateMode::Up).await;
    cache.put(CacheItem::new("k", 7).unwrap()).await.unwrap();

    cache
        .expire("k", Expiration::Absolute(Duration::from_millis(100)))
        .await
        .unwrap();

    sleep(Duration::from_millis(150)).await;
    assert!(l1.get(&key("k")).await.unwrap().is_none());
    assert!(l2.get(&key("k")).await.unwrap().is_none());
    assert!(cache.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn per_tier_statistics_follow_reads() {
    let (cache, l1, l2) = two_tier(UpdateMode::None).await;
    cache.put(CacheItem::new("k", 7).unwrap()).await.unwrap();
    l1.remove(&key("k")).await.unwrap();

    // The first tier misses, the second hits; both saw the read.
    cache.get("k").await.unwrap();

    let first = l1.stats().snapshot();
    let second = l2.stats().snapshot();
    assert_eq!(first.get_calls, 1);
    assert_eq!(first.misses, 1);
    assert_eq!(first.hits, 0);
    assert_eq!(second.get_calls, 1);
    assert_eq!(second.hits, 1);
}

#[tokio::test]
async fn disposed_managers_reject_every_operation() {
    let (cache, _l1, _l2) = two_tier(UpdateMode::Up).await;
    cache.put(CacheItem::new("k", 7).unwrap()).await.unwrap();

    cache.dispose().await.unwrap();
    // Disposal is idempotent.
    cache.dispose().await.unwrap();

    assert!(matches!(cache.get("k").await, Err(CacheError::Disposed)));
    assert!(matches!(
        cache.put(CacheItem::new("k", 8).unwrap()).await,
        Err(CacheError::Disposed)
    ));
    assert!(matches!(cache.remove("k").await, Err(CacheError::Disposed)));
    assert!(matches!(cache.clear().await, Err(CacheError::Disposed)));
}

#[tokio::test]
async fn builder_rejects_an_empty_tier_stack() {
    let result = TieredCache::<u32>::builder().build().await;
    assert!(matches!(result, Err(ConfigError::NoHandles(_))));
}

#[tokio::test]
async fn builder_rejects_duplicate_handle_names() {
    let result = TieredCache::<u32>::builder()
        .handle(mem("same"))
        .handle(mem("same"))
        .build()
        .await;
    assert!(matches!(result, Err(ConfigError::DuplicateHandleName(_))));
}

#[tokio::test]
async fn builder_rejects_a_backplane_without_a_source_tier() {
    let result = TieredCache::<u32>::builder()
        .handle(mem("l1"))
        .backplane(strata::InProcessBackplane::attach("orphan"))
        .build()
        .await;
    assert!(matches!(result, Err(ConfigError::NoBackplaneSource(_))));
}

#[tokio::test]
async fn empty_keys_are_rejected() {
    let (cache, _l1, _l2) = two_tier(UpdateMode::Up).await;
    assert!(matches!(cache.get("").await, Err(CacheError::Item(_))));
    assert!(matches!(
        cache.get_in("k", "").await,
        Err(CacheError::Item(_))
    ));
    assert!(CacheItem::new("", 1u32).is_err());
}
