//! Integration tests against a live Redis server.
//!
//! Run with: `cargo test -p strata-redis -- --ignored`
//! (requires a Redis instance at redis://127.0.0.1/)

use std::time::Duration;

use strata_backplane::{Backplane, BackplaneOp};
use strata_core::{CacheItem, EntryKey, Expiration, UpdateOutcome};
use strata_handle::CacheHandle;
use strata_redis::{RedisBackplane, RedisHandle};
use tokio::time::sleep;

fn key(k: &str) -> EntryKey {
    EntryKey::new(k).unwrap()
}

fn handle(namespace: &str) -> RedisHandle<String> {
    RedisHandle::builder()
        .server("redis://127.0.0.1/")
        .namespace(namespace)
        .build()
        .unwrap()
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn roundtrips_items_through_redis() {
    let handle = handle("strata-test-roundtrip");
    handle.clear().await.unwrap();

    let item = CacheItem::new("k", "value".to_owned()).unwrap();
    assert!(handle.add(item).await.unwrap());
    assert!(!handle.add(CacheItem::new("k", "other".to_owned()).unwrap()).await.unwrap());

    let found = handle.get(&key("k")).await.unwrap().unwrap();
    assert_eq!(found.value(), "value");
    assert_eq!(found.version(), 1);

    assert!(handle.remove(&key("k")).await.unwrap());
    assert!(handle.get(&key("k")).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn absolute_ttl_is_enforced_by_the_server() {
    let handle = handle("strata-test-ttl");
    handle.clear().await.unwrap();

    let item = CacheItem::new("k", "value".to_owned())
        .unwrap()
        .with_expiration(Expiration::Absolute(Duration::from_millis(200)))
        .unwrap();
    handle.put(item).await.unwrap();

    assert!(handle.get(&key("k")).await.unwrap().is_some());
    sleep(Duration::from_millis(300)).await;
    assert!(handle.get(&key("k")).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn cas_updates_detect_conflicts() {
    let handle = handle("strata-test-cas");
    handle.clear().await.unwrap();

    handle
        .put(CacheItem::new("c", "0".to_owned()).unwrap())
        .await
        .unwrap();

    let outcome = handle
        .update(
            &key("c"),
            &|current| current.parse::<u64>().ok().map(|n| (n + 1).to_string()),
            5,
        )
        .await
        .unwrap();
    match outcome {
        UpdateOutcome::Updated { item, .. } => assert_eq!(item.value(), "1"),
        other => panic!("expected Updated, got {other:?}"),
    }

    let missing = handle
        .update(&key("absent"), &|_| Some("x".to_owned()), 5)
        .await
        .unwrap();
    assert_eq!(missing, UpdateOutcome::NotFound);
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn region_clears_are_scoped() {
    let handle = handle("strata-test-regions");
    handle.clear().await.unwrap();

    handle
        .put(CacheItem::new_in("k", "r1", "one".to_owned()).unwrap())
        .await
        .unwrap();
    handle
        .put(CacheItem::new("k", "plain".to_owned()).unwrap())
        .await
        .unwrap();

    handle.clear_region("r1").await.unwrap();

    assert!(
        handle
            .get(&EntryKey::new_in("k", "r1").unwrap())
            .await
            .unwrap()
            .is_none()
    );
    assert!(handle.get(&key("k")).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn backplane_messages_reach_peers_but_not_the_sender() {
    let a = RedisBackplane::builder()
        .channel("strata-test-backplane")
        .build()
        .unwrap();
    let b = RedisBackplane::builder()
        .channel("strata-test-backplane")
        .build()
        .unwrap();

    let mut a_events = a.subscribe().await.unwrap();
    let mut b_events = b.subscribe().await.unwrap();
    // Give the pub/sub connections time to register.
    sleep(Duration::from_millis(100)).await;

    a.publish(BackplaneOp::changed(key("k"))).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(1), b_events.recv())
        .await
        .expect("peer must receive the message");
    assert_eq!(received, Some(BackplaneOp::changed(key("k"))));

    sleep(Duration::from_millis(100)).await;
    assert!(a_events.try_recv().is_err(), "loopback must be suppressed");
}
