//! Two-tier cache with read-through promotion and optimistic updates.
//!
//! Run with: `cargo run --example tiered`

use std::time::Duration;

use strata::{TieredCache, UpdateMode};
use strata_core::{CacheItem, Expiration};
use strata_memory::MemoryHandle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cache: TieredCache<u64> = TieredCache::builder()
        .name("counters")
        .update_mode(UpdateMode::Up)
        .handle(MemoryHandle::builder().name("l1").build()?)
        .handle(
            MemoryHandle::builder()
                .name("l2")
                .default_expiration(Expiration::Sliding(Duration::from_secs(300)))
                .build()?,
        )
        .build()
        .await?;

    cache.add(CacheItem::new("visits", 0)?).await?;

    for _ in 0..10 {
        cache.update("visits", |count| Some(count + 1), 16).await?;
    }

    println!("visits = {:?}", cache.get("visits").await?);

    cache
        .put(CacheItem::new_in("session", "users", 42)?)
        .await?;
    println!("users/session = {:?}", cache.get_in("session", "users").await?);

    cache.clear_region("users").await?;
    println!(
        "users/session after clear_region = {:?}",
        cache.get_in("session", "users").await?
    );

    cache.dispose().await?;
    Ok(())
}
