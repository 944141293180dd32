//! Memory handle implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use smol_str::SmolStr;
use tracing::trace;

use strata_core::{CacheItem, EntryKey, Expiration, UpdateFn, UpdateOutcome};
use strata_handle::{CacheHandle, CacheStats, HandleResult};

use crate::builder::MemoryHandleBuilder;

/// Storage for one region; `None` keys the region-less namespace.
type RegionKey = Option<SmolStr>;
type RegionMap<V> = Arc<DashMap<SmolStr, CacheItem<V>>>;

struct Inner<V> {
    name: SmolStr,
    default_expiration: Expiration,
    stats: CacheStats,
    regions: DashMap<RegionKey, RegionMap<V>>,
}

/// In-process cache handle over sharded concurrent maps.
///
/// Each region gets its own map, which makes region clears O(1) and keeps
/// the region-less namespace fully separate from every named region.
/// Expiration is enforced lazily: an expired entry encountered by a read is
/// evicted and reported as a miss. Sliding deadlines are refreshed on every
/// hit, under the entry's shard lock.
///
/// `MemoryHandle` clones cheaply (the storage is shared), so the same
/// instance can be installed as a tier in several managers — the usual way
/// to emulate a shared tier inside one process.
///
/// # Example
///
/// ```
/// use strata_memory::MemoryHandle;
///
/// let handle: MemoryHandle<String> = MemoryHandle::builder().name("l1").build().unwrap();
/// assert_eq!(strata_handle::CacheHandle::name(&handle), "l1");
/// ```
#[derive(Clone)]
pub struct MemoryHandle<V> {
    inner: Arc<Inner<V>>,
}

impl<V> MemoryHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn builder() -> MemoryHandleBuilder<V> {
        MemoryHandleBuilder::default()
    }

    pub(crate) fn from_builder(builder: MemoryHandleBuilder<V>) -> Self {
        MemoryHandle {
            inner: Arc::new(Inner {
                stats: CacheStats::new(&builder.name, builder.stats_enabled),
                name: builder.name,
                default_expiration: builder.default_expiration,
                regions: DashMap::new(),
            }),
        }
    }

    /// The expiration applied to items that carry the default policy.
    pub fn default_expiration(&self) -> Expiration {
        self.inner.default_expiration
    }

    /// Looks up the region map without creating it.
    fn region(&self, region: Option<&str>) -> Option<RegionMap<V>> {
        self.inner
            .regions
            .get(&region.map(SmolStr::new))
            .map(|map| map.clone())
    }

    /// Looks up or lazily creates the region map.
    ///
    /// The outer guard is dropped before the caller touches the inner map.
    fn region_or_create(&self, region: Option<&str>) -> RegionMap<V> {
        self.inner
            .regions
            .entry(region.map(SmolStr::new))
            .or_default()
            .clone()
    }

    fn is_live(&self, item: &CacheItem<V>, now: chrono::DateTime<chrono::Utc>) -> bool {
        !item.is_expired_at(self.inner.default_expiration, now)
    }
}

#[async_trait]
impl<V> CacheHandle<V> for MemoryHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &EntryKey) -> HandleResult<Option<CacheItem<V>>> {
        let stats = &self.inner.stats;
        stats.record_get(key.region());

        let Some(map) = self.region(key.region()) else {
            stats.record_miss(key.region());
            return Ok(None);
        };

        match map.entry(SmolStr::new(key.key())) {
            Entry::Occupied(mut occupied) => {
                let now = Utc::now();
                if !self.is_live(occupied.get(), now) {
                    trace!(key = %key, "evicting expired entry on read");
                    occupied.remove();
                    stats.items_changed(key.region(), -1);
                    stats.record_miss(key.region());
                    return Ok(None);
                }
                // Read-touch extends a sliding deadline.
                let touched = occupied.get().touched(now);
                *occupied.get_mut() = touched.clone();
                stats.record_hit(key.region());
                Ok(Some(touched))
            }
            Entry::Vacant(_) => {
                stats.record_miss(key.region());
                Ok(None)
            }
        }
    }

    async fn add(&self, item: CacheItem<V>) -> HandleResult<bool> {
        item.expiration()
            .resolve(self.inner.default_expiration)
            .validate()?;
        let stats = &self.inner.stats;
        stats.record_add(item.region());

        let map = self.region_or_create(item.region());
        let now = Utc::now();
        match map.entry(SmolStr::new(item.key())) {
            Entry::Occupied(mut occupied) => {
                if self.is_live(occupied.get(), now) {
                    return Ok(false);
                }
                // An expired entry does not block the insert.
                *occupied.get_mut() = item.touched(now).with_version(1);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                stats.items_changed(item.region(), 1);
                vacant.insert(item.touched(now).with_version(1));
                Ok(true)
            }
        }
    }

    async fn put(&self, item: CacheItem<V>) -> HandleResult<()> {
        item.expiration()
            .resolve(self.inner.default_expiration)
            .validate()?;
        let stats = &self.inner.stats;
        stats.record_put(item.region());

        let map = self.region_or_create(item.region());
        let now = Utc::now();
        match map.entry(SmolStr::new(item.key())) {
            Entry::Occupied(mut occupied) => {
                let version = occupied.get().version() + 1;
                *occupied.get_mut() = item.touched(now).with_version(version);
            }
            Entry::Vacant(vacant) => {
                stats.items_changed(item.region(), 1);
                vacant.insert(item.touched(now).with_version(1));
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &EntryKey) -> HandleResult<bool> {
        let stats = &self.inner.stats;
        stats.record_remove(key.region());

        let Some(map) = self.region(key.region()) else {
            return Ok(false);
        };
        let removed = map.remove(&SmolStr::new(key.key())).is_some();
        if removed {
            stats.items_changed(key.region(), -1);
        }
        Ok(removed)
    }

    async fn clear(&self) -> HandleResult<()> {
        self.inner.regions.clear();
        self.inner.stats.record_clear();
        Ok(())
    }

    async fn clear_region(&self, region: &str) -> HandleResult<()> {
        let removed = self
            .inner
            .regions
            .remove(&Some(SmolStr::new(region)))
            .map(|(_, map)| map.len() as u64)
            .unwrap_or(0);
        self.inner.stats.record_clear_region(region, removed);
        Ok(())
    }

    async fn expire(&self, key: &EntryKey, expiration: Expiration) -> HandleResult<()> {
        expiration
            .resolve(self.inner.default_expiration)
            .validate()?;
        let Some(map) = self.region(key.region()) else {
            return Ok(());
        };
        if let Entry::Occupied(mut occupied) = map.entry(SmolStr::new(key.key())) {
            let now = Utc::now();
            if !self.is_live(occupied.get(), now) {
                // Logically absent; evict instead of resurrecting.
                occupied.remove();
                self.inner.stats.items_changed(key.region(), -1);
                return Ok(());
            }
            // Sliding deadlines restart from now; absolute ones keep their
            // creation anchor.
            let updated = occupied.get().touched(now).with_expiration(expiration)?;
            *occupied.get_mut() = updated;
        }
        Ok(())
    }

    async fn update(
        &self,
        key: &EntryKey,
        factory: UpdateFn<'_, V>,
        max_retries: u32,
    ) -> HandleResult<UpdateOutcome<V>> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;

            let Some(map) = self.region(key.region()) else {
                return Ok(UpdateOutcome::NotFound);
            };
            let now = Utc::now();
            let current = match map.get(&SmolStr::new(key.key())) {
                Some(entry) if self.is_live(&entry, now) => entry.clone(),
                _ => return Ok(UpdateOutcome::NotFound),
            };

            let Some(new_value) = factory(current.value()) else {
                return Ok(UpdateOutcome::FactoryReturnedNone);
            };

            // Version check and replacement are atomic under the shard lock.
            match map.entry(SmolStr::new(key.key())) {
                Entry::Occupied(mut occupied) => {
                    if occupied.get().version() == current.version() {
                        let stored = current
                            .with_value(new_value)
                            .touched(now)
                            .with_version(current.version() + 1);
                        *occupied.get_mut() = stored.clone();
                        return Ok(UpdateOutcome::Updated {
                            item: stored,
                            attempts,
                        });
                    }
                }
                Entry::Vacant(_) => return Ok(UpdateOutcome::NotFound),
            }

            if attempts > max_retries {
                trace!(key = %key, attempts, "update retries exhausted");
                return Ok(UpdateOutcome::RetriesExhausted { attempts });
            }
        }
    }

    async fn count(&self) -> HandleResult<u64> {
        let mut total = 0u64;
        for entry in self.inner.regions.iter() {
            total += entry.value().len() as u64;
        }
        Ok(total)
    }

    fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}
