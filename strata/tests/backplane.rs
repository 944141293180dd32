//! Cross-manager coherency over the in-process backplane.
//!
//! Two managers share one handle instance as their last tier (the shared
//! store) and keep private first tiers, the same topology as two nodes in
//! front of one distributed store.

use std::time::Duration;

use strata::{InProcessBackplane, TieredCache, UpdateMode};
use strata_core::{CacheItem, EntryKey};
use strata_handle::CacheHandle;
use strata_memory::MemoryHandle;
use tokio::time::sleep;

fn key(k: &str) -> EntryKey {
    EntryKey::new(k).unwrap()
}

async fn node(
    name: &str,
    channel: &str,
    shared: &MemoryHandle<String>,
) -> (TieredCache<String>, MemoryHandle<String>) {
    let local = MemoryHandle::builder().name("local").build().unwrap();
    let cache = TieredCache::builder()
        .name(name)
        .update_mode(UpdateMode::Up)
        .handle(local.clone())
        .backplane_source_handle(shared.clone())
        .backplane(InProcessBackplane::attach(channel))
        .build()
        .await
        .unwrap();
    (cache, local)
}

/// Polls until `probe` returns true or the bound elapses.
async fn within(bound: Duration, mut probe: impl AsyncFnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + bound;
    loop {
        if probe().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn peer_writes_invalidate_local_tiers() {
    let shared = MemoryHandle::builder().name("shared").build().unwrap();
    let (a, _a_local) = node("a", "chan-invalidate", &shared).await;
    let (b, b_local) = node("b", "chan-invalidate", &shared).await;

    a.put(CacheItem::new("k", "v1".to_owned()).unwrap())
        .await
        .unwrap();
    assert_eq!(b.get("k").await.unwrap(), Some("v1".to_owned()));
    // The read promoted v1 into b's private tier.
    assert!(b_local.get(&key("k")).await.unwrap().is_some());

    a.put(CacheItem::new("k", "v2".to_owned()).unwrap())
        .await
        .unwrap();

    assert!(
        within(Duration::from_millis(500), async || {
            b.get("k").await.unwrap() == Some("v2".to_owned())
        })
        .await,
        "peer must stop serving the stale value within the delivery bound"
    );
}

#[tokio::test]
async fn own_writes_survive_loopback() {
    let shared = MemoryHandle::builder().name("shared").build().unwrap();
    let (a, a_local) = node("a", "chan-loopback", &shared).await;
    let (_b, _b_local) = node("b", "chan-loopback", &shared).await;

    a.put(CacheItem::new("k", "mine".to_owned()).unwrap())
        .await
        .unwrap();

    // Give a loopback, if any, time to arrive before checking.
    sleep(Duration::from_millis(100)).await;
    assert_eq!(
        *a_local.get(&key("k")).await.unwrap().unwrap().value(),
        "mine",
        "a node must not invalidate its own freshly written entry"
    );
}

#[tokio::test]
async fn removals_propagate_between_nodes() {
    let shared = MemoryHandle::builder().name("shared").build().unwrap();
    let (a, _a_local) = node("a", "chan-remove", &shared).await;
    let (b, _b_local) = node("b", "chan-remove", &shared).await;

    assert!(
        a.add(CacheItem::new("k", "v".to_owned()).unwrap())
            .await
            .unwrap()
    );
    assert_eq!(b.get("k").await.unwrap(), Some("v".to_owned()));

    assert!(a.remove("k").await.unwrap());

    assert!(
        within(Duration::from_millis(200), async || {
            b.get("k").await.unwrap().is_none()
        })
        .await,
        "removal must reach the peer within the delivery bound"
    );
}

#[tokio::test]
async fn region_clears_propagate_between_nodes() {
    let shared = MemoryHandle::builder().name("shared").build().unwrap();
    let (a, _a_local) = node("a", "chan-region", &shared).await;
    let (b, b_local) = node("b", "chan-region", &shared).await;

    a.put(CacheItem::new_in("k", "r1", "v".to_owned()).unwrap())
        .await
        .unwrap();
    a.put(CacheItem::new("plain", "v".to_owned()).unwrap())
        .await
        .unwrap();
    assert_eq!(b.get_in("k", "r1").await.unwrap(), Some("v".to_owned()));
    assert_eq!(b.get("plain").await.unwrap(), Some("v".to_owned()));

    a.clear_region("r1").await.unwrap();

    assert!(
        within(Duration::from_millis(200), async || {
            b_local
                .get(&EntryKey::new_in("k", "r1").unwrap())
                .await
                .unwrap()
                .is_none()
        })
        .await
    );
    assert!(b.get_in("k", "r1").await.unwrap().is_none());
    // The region-less namespace is untouched.
    assert_eq!(b.get("plain").await.unwrap(), Some("v".to_owned()));
}

#[tokio::test]
async fn full_clears_propagate_between_nodes() {
    let shared = MemoryHandle::builder().name("shared").build().unwrap();
    let (a, _a_local) = node("a", "chan-clear", &shared).await;
    let (b, b_local) = node("b", "chan-clear", &shared).await;

    a.put(CacheItem::new("k", "v".to_owned()).unwrap())
        .await
        .unwrap();
    assert_eq!(b.get("k").await.unwrap(), Some("v".to_owned()));

    a.clear().await.unwrap();

    assert!(
        within(Duration::from_millis(200), async || {
            b_local.count().await.unwrap() == 0
        })
        .await
    );
    assert!(b.get("k").await.unwrap().is_none());
}
