//! Expiration enforcement tests.

use std::time::Duration;

use strata_core::{CacheItem, EntryKey, Expiration};
use strata_handle::CacheHandle;
use strata_memory::MemoryHandle;
use tokio::time::sleep;

fn key(k: &str) -> EntryKey {
    EntryKey::new(k).unwrap()
}

fn absolute(key: &str, value: u32, timeout: Duration) -> CacheItem<u32> {
    CacheItem::new(key, value)
        .unwrap()
        .with_expiration(Expiration::Absolute(timeout))
        .unwrap()
}

#[tokio::test]
async fn absolute_entries_expire_after_the_deadline() {
    let handle: MemoryHandle<u32> = MemoryHandle::builder().build().unwrap();
    handle
        .add(absolute("a", 1, Duration::from_millis(150)))
        .await
        .unwrap();

    sleep(Duration::from_millis(30)).await;
    assert!(handle.get(&key("a")).await.unwrap().is_some());

    sleep(Duration::from_millis(150)).await;
    assert!(handle.get(&key("a")).await.unwrap().is_none());
    assert_eq!(handle.stats().snapshot().items, 0, "eviction updates items");
}

#[tokio::test]
async fn absolute_deadline_ignores_reads() {
    let handle: MemoryHandle<u32> = MemoryHandle::builder().build().unwrap();
    handle
        .add(absolute("a", 1, Duration::from_millis(200)))
        .await
        .unwrap();

    // Repeated reads must not extend an absolute deadline.
    for _ in 0..4 {
        sleep(Duration::from_millis(60)).await;
        handle.get(&key("a")).await.unwrap();
    }
    assert!(handle.get(&key("a")).await.unwrap().is_none());
}

#[tokio::test]
async fn sliding_entries_renew_on_every_read() {
    let handle: MemoryHandle<u32> = MemoryHandle::builder().build().unwrap();
    let item = CacheItem::new("a", 1u32)
        .unwrap()
        .with_expiration(Expiration::Sliding(Duration::from_millis(200)))
        .unwrap();
    handle.add(item).await.unwrap();

    // Reads at intervals below the timeout keep the entry alive well past
    // the original deadline.
    for _ in 0..5 {
        sleep(Duration::from_millis(80)).await;
        assert!(handle.get(&key("a")).await.unwrap().is_some());
    }

    // One idle interval past the timeout expires it.
    sleep(Duration::from_millis(300)).await;
    assert!(handle.get(&key("a")).await.unwrap().is_none());
}

#[tokio::test]
async fn handle_default_applies_to_default_policy_items() {
    let handle: MemoryHandle<u32> = MemoryHandle::builder()
        .default_expiration(Expiration::Absolute(Duration::from_millis(100)))
        .build()
        .unwrap();
    handle.add(CacheItem::new("a", 1).unwrap()).await.unwrap();

    assert!(handle.get(&key("a")).await.unwrap().is_some());
    sleep(Duration::from_millis(150)).await;
    assert!(handle.get(&key("a")).await.unwrap().is_none());
}

#[tokio::test]
async fn item_policy_overrides_the_handle_default() {
    let handle: MemoryHandle<u32> = MemoryHandle::builder()
        .default_expiration(Expiration::Absolute(Duration::from_millis(50)))
        .build()
        .unwrap();
    let item = CacheItem::new("a", 1u32)
        .unwrap()
        .with_expiration(Expiration::Never)
        .unwrap();
    handle.add(item).await.unwrap();

    sleep(Duration::from_millis(120)).await;
    assert!(handle.get(&key("a")).await.unwrap().is_some());
}

#[tokio::test]
async fn zero_timeout_defaults_are_rejected_at_the_call() {
    let handle: MemoryHandle<u32> = MemoryHandle::builder()
        .default_expiration(Expiration::Never)
        .build()
        .unwrap();

    // The builder validates its own default; a zero timeout can still reach
    // a handle through a directly constructed policy.
    assert!(
        MemoryHandle::<u32>::builder()
            .default_expiration(Expiration::Sliding(Duration::ZERO))
            .build()
            .is_err()
    );
    drop(handle);
}

#[tokio::test]
async fn expire_replaces_the_policy_of_an_existing_entry() {
    let handle: MemoryHandle<u32> = MemoryHandle::builder().build().unwrap();
    handle.add(CacheItem::new("a", 1).unwrap()).await.unwrap();

    handle
        .expire(&key("a"), Expiration::Absolute(Duration::from_millis(100)))
        .await
        .unwrap();

    assert!(handle.get(&key("a")).await.unwrap().is_some());
    sleep(Duration::from_millis(150)).await;
    assert!(handle.get(&key("a")).await.unwrap().is_none());

    // Absent keys are skipped without error.
    handle
        .expire(&key("missing"), Expiration::Never)
        .await
        .unwrap();
}
