//! Two managers sharing a tier, kept coherent over the in-process backplane.
//!
//! Run with: `cargo run --example coherency`

use std::time::Duration;

use strata::{InProcessBackplane, TieredCache, UpdateMode};
use strata_core::CacheItem;
use strata_memory::MemoryHandle;

async fn node(
    name: &str,
    shared: &MemoryHandle<String>,
) -> Result<TieredCache<String>, Box<dyn std::error::Error>> {
    Ok(TieredCache::builder()
        .name(name)
        .update_mode(UpdateMode::Up)
        .handle(MemoryHandle::builder().name("local").build()?)
        .backplane_source_handle(shared.clone())
        .backplane(InProcessBackplane::attach("demo"))
        .build()
        .await?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let shared = MemoryHandle::builder().name("shared").build()?;
    let a = node("node-a", &shared).await?;
    let b = node("node-b", &shared).await?;

    a.put(CacheItem::new("motd", "hello from a".to_owned())?)
        .await?;
    println!("b sees: {:?}", b.get("motd").await?);

    a.put(CacheItem::new("motd", "updated by a".to_owned())?)
        .await?;

    // The change notification evicts b's local copy; the next read falls
    // through to the shared tier.
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("b sees: {:?}", b.get("motd").await?);

    a.dispose().await?;
    b.dispose().await?;
    Ok(())
}
