//! The uniform contract every backing store satisfies.
//!
//! A *handle* is one store in the tier stack — an in-process map, a
//! distributed key-value server, anything that can hold
//! [`CacheItem`](strata_core::CacheItem)s. The manager composes an ordered
//! list of handles into one logical cache; every handle exposes the same
//! operations through [`CacheHandle`] so the manager never needs to know
//! what is behind a tier.

use std::sync::Arc;

use async_trait::async_trait;
use strata_core::{CacheItem, EntryKey, Expiration, UpdateFn, UpdateOutcome};

use crate::error::HandleResult;
use crate::stats::CacheStats;

/// A shared, dynamically dispatched handle.
pub type SharedHandle<V> = Arc<dyn CacheHandle<V>>;

/// One backing store in the tier stack.
///
/// # Contract
///
/// - `get` enforces the handle's expiration policy: an expired entry is
///   treated as absent, and a sliding deadline is refreshed on every hit.
/// - `add` inserts only if the key is absent and reports whether it did.
/// - `put` upserts unconditionally.
/// - `update` runs a compare-and-swap loop local to this handle: the stored
///   version is compared against the version read before invoking the
///   factory, and the replacement is applied with a bumped version only when
///   they still match.
/// - Item versions are assigned and incremented by the handle, never by the
///   caller.
/// - Statistics recording happens inside the handle, against [`stats`].
///
/// # Dyn-compatibility
///
/// The trait is dyn-compatible; a blanket implementation is provided for
/// [`SharedHandle<V>`] so compositions can nest trait objects.
///
/// [`stats`]: CacheHandle::stats
#[async_trait]
pub trait CacheHandle<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Read an item, refreshing a sliding deadline on hit.
    ///
    /// Returns `Ok(None)` for absent and expired entries.
    async fn get(&self, key: &EntryKey) -> HandleResult<Option<CacheItem<V>>>;

    /// Insert the item only if the key is absent.
    ///
    /// Returns `true` when the item was inserted, `false` when an entry
    /// already exists (the existing entry is left untouched).
    async fn add(&self, item: CacheItem<V>) -> HandleResult<bool>;

    /// Insert or overwrite the item.
    async fn put(&self, item: CacheItem<V>) -> HandleResult<()>;

    /// Delete an entry. Returns `false` if it was absent.
    async fn remove(&self, key: &EntryKey) -> HandleResult<bool>;

    /// Delete every entry in every region.
    async fn clear(&self) -> HandleResult<()>;

    /// Delete every entry in the given region.
    async fn clear_region(&self, region: &str) -> HandleResult<()>;

    /// Replace the expiration policy of an existing entry.
    ///
    /// A no-op when the entry is absent.
    async fn expire(&self, key: &EntryKey, expiration: Expiration) -> HandleResult<()>;

    /// Compare-and-swap update loop local to this handle.
    ///
    /// Retries up to `max_retries` times on version conflicts.
    async fn update(
        &self,
        key: &EntryKey,
        factory: UpdateFn<'_, V>,
        max_retries: u32,
    ) -> HandleResult<UpdateOutcome<V>>;

    /// Current number of stored entries.
    async fn count(&self) -> HandleResult<u64>;

    /// Per-handle statistics counters.
    fn stats(&self) -> &CacheStats;

    /// Handle name, unique within a manager.
    fn name(&self) -> &str;

    /// Release resources held by the handle.
    async fn dispose(&self) -> HandleResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<V> CacheHandle<V> for SharedHandle<V>
where
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &EntryKey) -> HandleResult<Option<CacheItem<V>>> {
        (**self).get(key).await
    }

    async fn add(&self, item: CacheItem<V>) -> HandleResult<bool> {
        (**self).add(item).await
    }

    async fn put(&self, item: CacheItem<V>) -> HandleResult<()> {
        (**self).put(item).await
    }

    async fn remove(&self, key: &EntryKey) -> HandleResult<bool> {
        (**self).remove(key).await
    }

    async fn clear(&self) -> HandleResult<()> {
        (**self).clear().await
    }

    async fn clear_region(&self, region: &str) -> HandleResult<()> {
        (**self).clear_region(region).await
    }

    async fn expire(&self, key: &EntryKey, expiration: Expiration) -> HandleResult<()> {
        (**self).expire(key, expiration).await
    }

    async fn update(
        &self,
        key: &EntryKey,
        factory: UpdateFn<'_, V>,
        max_retries: u32,
    ) -> HandleResult<UpdateOutcome<V>> {
        (**self).update(key, factory, max_retries).await
    }

    async fn count(&self) -> HandleResult<u64> {
        (**self).count().await
    }

    fn stats(&self) -> &CacheStats {
        (**self).stats()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn dispose(&self) -> HandleResult<()> {
        (**self).dispose().await
    }
}
