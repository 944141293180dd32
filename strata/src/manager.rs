//! The tiered cache manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace, warn};

use strata_backplane::{Backplane, BackplaneOp, SharedBackplane};
use strata_core::{CacheItem, EntryKey, Expiration, UpdateFn, UpdateOutcome};
use strata_handle::{CacheHandle, SharedHandle};

use crate::error::{CacheError, ConfigError};

/// Policy governing how a write at one tier is reflected in the others.
///
/// The same policy gates read-through promotion: a hit in a deeper tier is
/// copied into shallower tiers only when the mode allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Leave other tiers untouched; they re-fill on their own reads.
    None,
    /// Fill the tiers in front of the written one.
    #[default]
    Up,
    /// Rewrite every other tier.
    Full,
}

/// One tier of the manager: a handle plus its coherency role.
#[derive(Clone)]
struct Tier<V> {
    handle: SharedHandle<V>,
    backplane_source: bool,
}

struct Inner<V> {
    name: SmolStr,
    tiers: Vec<Tier<V>>,
    update_mode: UpdateMode,
    backplane: Option<SharedBackplane>,
    /// Serializes multi-tier update propagation; plain reads and writes
    /// stay lock-free at the manager level.
    update_lock: Mutex<()>,
    disposed: AtomicBool,
    listener: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<V> Drop for Inner<V> {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.listener.lock()
            && let Some(task) = listener.take()
        {
            task.abort();
        }
    }
}

/// A multi-tier cache: an ordered stack of handles behind one uniform API.
///
/// Tier 0 is the fastest, most local store; the last tier is the most
/// shared, most durable one. Reads walk the tiers in order and the first
/// non-null entry wins; writes go through every tier in order. A hit in a
/// deeper tier is promoted into shallower tiers according to the configured
/// [`UpdateMode`].
///
/// When a backplane is attached, every local mutation is published after
/// all tiers have been written, and invalidations received from peer nodes
/// are applied to the tiers *not* marked as backplane source (the shared
/// tier already saw the change on the originating node).
///
/// The manager is cheap to clone and safe to share across tasks; no
/// operation is globally serialized except [`update`], which holds a
/// per-manager mutex so the multi-tier propagation appears atomic from this
/// manager's point of view.
///
/// # Example
///
/// ```
/// use strata::{TieredCache, UpdateMode};
/// use strata_core::CacheItem;
/// use strata_memory::MemoryHandle;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cache: TieredCache<String> = TieredCache::builder()
///     .handle(MemoryHandle::builder().name("l1").build()?)
///     .handle(MemoryHandle::builder().name("l2").build()?)
///     .update_mode(UpdateMode::Up)
///     .build()
///     .await?;
///
/// cache.put(CacheItem::new("greeting", "hello".to_owned())?).await?;
/// assert_eq!(cache.get("greeting").await?, Some("hello".to_owned()));
/// # Ok(())
/// # }
/// ```
///
/// [`update`]: TieredCache::update
#[derive(Clone)]
pub struct TieredCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> TieredCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> TieredCacheBuilder<V> {
        TieredCacheBuilder::new()
    }

    /// The manager name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The configured update mode.
    pub fn update_mode(&self) -> UpdateMode {
        self.inner.update_mode
    }

    fn ensure_live(&self) -> Result<(), CacheError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }

    async fn publish(&self, op: BackplaneOp) {
        if let Some(backplane) = &self.inner.backplane
            && let Err(error) = backplane.publish(op).await
        {
            // Delivery is best-effort; peers converge via expiration.
            warn!(cache = %self.inner.name, %error, "backplane publish failed");
        }
    }

    /// Copies a hit from `hit_index` into the tiers in front of it.
    ///
    /// Promotion is best-effort: a failing tier is logged and skipped.
    async fn promote(&self, hit_index: usize, item: &CacheItem<V>) {
        for tier in &self.inner.tiers[..hit_index] {
            if let Err(error) = tier.handle.add(item.clone()).await {
                warn!(
                    cache = %self.inner.name,
                    handle = tier.handle.name(),
                    %error,
                    "promotion failed"
                );
            }
        }
    }

    async fn lookup(&self, key: &EntryKey) -> Result<Option<CacheItem<V>>, CacheError> {
        self.ensure_live()?;
        for (index, tier) in self.inner.tiers.iter().enumerate() {
            if let Some(item) = tier.handle.get(key).await? {
                trace!(key = %key, handle = tier.handle.name(), "hit");
                if index > 0 && self.inner.update_mode != UpdateMode::None {
                    self.promote(index, &item).await;
                }
                return Ok(Some(item));
            }
        }
        trace!(key = %key, "miss in every tier");
        Ok(None)
    }

    /// Reads a value from the region-less namespace.
    ///
    /// Tiers are consulted in declared order and the first non-null entry
    /// wins, even if a deeper tier holds a newer value.
    pub async fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        Ok(self.get_item(key).await?.map(CacheItem::into_value))
    }

    /// Reads a value from the given region.
    pub async fn get_in(&self, key: &str, region: &str) -> Result<Option<V>, CacheError> {
        Ok(self.get_item_in(key, region).await?.map(CacheItem::into_value))
    }

    /// Reads the full item record from the region-less namespace.
    pub async fn get_item(&self, key: &str) -> Result<Option<CacheItem<V>>, CacheError> {
        self.lookup(&EntryKey::new(key)?).await
    }

    /// Reads the full item record from the given region.
    pub async fn get_item_in(
        &self,
        key: &str,
        region: &str,
    ) -> Result<Option<CacheItem<V>>, CacheError> {
        self.lookup(&EntryKey::new_in(key, region)?).await
    }

    /// Inserts the item into every tier, skipping tiers that already hold
    /// the key.
    ///
    /// Returns the was-new status of the first (primary) tier. Publishes a
    /// change notification once all tiers have been written.
    pub async fn add(&self, item: CacheItem<V>) -> Result<bool, CacheError> {
        self.ensure_live()?;
        let mut primary_added = true;
        for (index, tier) in self.inner.tiers.iter().enumerate() {
            let added = tier.handle.add(item.clone()).await?;
            if index == 0 {
                primary_added = added;
            }
        }
        self.publish(BackplaneOp::changed(item.entry_key())).await;
        Ok(primary_added)
    }

    /// Inserts or overwrites the item in every tier, in declared order.
    ///
    /// Publishes a change notification once all tiers have been written.
    pub async fn put(&self, item: CacheItem<V>) -> Result<(), CacheError> {
        self.ensure_live()?;
        for tier in &self.inner.tiers {
            tier.handle.put(item.clone()).await?;
        }
        self.publish(BackplaneOp::changed(item.entry_key())).await;
        Ok(())
    }

    /// Removes the entry from every tier.
    ///
    /// Returns `true` when at least one tier held the key.
    pub async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        self.remove_entry(EntryKey::new(key)?).await
    }

    /// Removes the entry from every tier, in the given region.
    pub async fn remove_in(&self, key: &str, region: &str) -> Result<bool, CacheError> {
        self.remove_entry(EntryKey::new_in(key, region)?).await
    }

    async fn remove_entry(&self, key: EntryKey) -> Result<bool, CacheError> {
        self.ensure_live()?;
        let mut removed = false;
        for tier in &self.inner.tiers {
            removed |= tier.handle.remove(&key).await?;
        }
        self.publish(BackplaneOp::removed(key)).await;
        Ok(removed)
    }

    /// Replaces the expiration policy of the entry in every tier that holds
    /// it; tiers without the entry are skipped.
    pub async fn expire(&self, key: &str, expiration: Expiration) -> Result<(), CacheError> {
        self.expire_entry(EntryKey::new(key)?, expiration).await
    }

    /// Region-scoped variant of [`expire`](TieredCache::expire).
    pub async fn expire_in(
        &self,
        key: &str,
        region: &str,
        expiration: Expiration,
    ) -> Result<(), CacheError> {
        self.expire_entry(EntryKey::new_in(key, region)?, expiration)
            .await
    }

    async fn expire_entry(&self, key: EntryKey, expiration: Expiration) -> Result<(), CacheError> {
        self.ensure_live()?;
        for tier in &self.inner.tiers {
            tier.handle.expire(&key, expiration).await?;
        }
        Ok(())
    }

    /// Clears every tier and notifies peer nodes.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.ensure_live()?;
        for tier in &self.inner.tiers {
            tier.handle.clear().await?;
        }
        self.publish(BackplaneOp::Cleared).await;
        Ok(())
    }

    /// Clears one region in every tier and notifies peer nodes.
    pub async fn clear_region(&self, region: &str) -> Result<(), CacheError> {
        self.ensure_live()?;
        for tier in &self.inner.tiers {
            tier.handle.clear_region(region).await?;
        }
        self.publish(BackplaneOp::cleared_region(region)).await;
        Ok(())
    }

    /// Optimistically updates the entry through a compare-and-swap loop.
    ///
    /// The swap runs at the most authoritative tier holding the entry (the
    /// deepest one, falling back toward the front while the entry is
    /// absent). `factory` receives the current value and returns the
    /// replacement, or `None` to abort without writing. Version conflicts
    /// retry up to `max_retries` times.
    ///
    /// On success the new value is propagated to the other tiers according
    /// to the update mode, and a change notification is published.
    pub async fn update<F>(
        &self,
        key: &str,
        factory: F,
        max_retries: u32,
    ) -> Result<UpdateOutcome<V>, CacheError>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        self.update_entry(EntryKey::new(key)?, &factory, max_retries)
            .await
    }

    /// Region-scoped variant of [`update`](TieredCache::update).
    pub async fn update_in<F>(
        &self,
        key: &str,
        region: &str,
        factory: F,
        max_retries: u32,
    ) -> Result<UpdateOutcome<V>, CacheError>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        self.update_entry(EntryKey::new_in(key, region)?, &factory, max_retries)
            .await
    }

    #[tracing::instrument(skip(self, factory), level = "trace", fields(cache = %self.inner.name))]
    async fn update_entry(
        &self,
        key: EntryKey,
        factory: UpdateFn<'_, V>,
        max_retries: u32,
    ) -> Result<UpdateOutcome<V>, CacheError> {
        self.ensure_live()?;
        let _guard = self.inner.update_lock.lock().await;

        let tiers = &self.inner.tiers;
        let mut outcome = UpdateOutcome::NotFound;
        let mut hit_index = tiers.len();
        for (index, tier) in tiers.iter().enumerate().rev() {
            match tier.handle.update(&key, factory, max_retries).await? {
                UpdateOutcome::NotFound => continue,
                other => {
                    outcome = other;
                    hit_index = index;
                    break;
                }
            }
        }

        if let UpdateOutcome::Updated { item, .. } = &outcome {
            for (index, tier) in tiers.iter().enumerate() {
                let fill = match self.inner.update_mode {
                    UpdateMode::None => false,
                    UpdateMode::Up => index < hit_index,
                    UpdateMode::Full => index != hit_index,
                };
                if fill {
                    tier.handle.put(item.clone()).await?;
                }
            }
            self.publish(BackplaneOp::changed(key)).await;
        }
        Ok(outcome)
    }

    /// Disposes the manager: stops the backplane listener and disposes
    /// every handle in reverse construction order.
    ///
    /// Disposal is idempotent; any other operation after the first
    /// `dispose` fails with [`CacheError::Disposed`].
    pub async fn dispose(&self) -> Result<(), CacheError> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(cache = %self.inner.name, "disposing");
        if let Ok(mut listener) = self.inner.listener.lock()
            && let Some(task) = listener.take()
        {
            task.abort();
        }
        for tier in self.inner.tiers.iter().rev() {
            tier.handle.dispose().await?;
        }
        Ok(())
    }
}

/// Applies peer invalidations to the tiers not marked as backplane source.
async fn run_invalidation_loop<V>(
    cache_name: SmolStr,
    mut events: mpsc::Receiver<BackplaneOp>,
    local_tiers: Vec<SharedHandle<V>>,
) where
    V: Clone + Send + Sync + 'static,
{
    while let Some(op) = events.recv().await {
        trace!(cache = %cache_name, ?op, "applying peer invalidation");
        for handle in &local_tiers {
            let result = match &op {
                // A peer change invalidates rather than fills, so the next
                // read re-fetches from the shared tier.
                BackplaneOp::Changed { key } | BackplaneOp::Removed { key } => {
                    handle.remove(key).await.map(|_| ())
                }
                BackplaneOp::Cleared => handle.clear().await,
                BackplaneOp::ClearedRegion { region } => handle.clear_region(region).await,
            };
            if let Err(error) = result {
                warn!(
                    cache = %cache_name,
                    handle = handle.name(),
                    %error,
                    "peer invalidation failed"
                );
            }
        }
    }
    trace!(cache = %cache_name, "invalidation loop ended");
}

/// Builder assembling a [`TieredCache`] from constructed handles.
///
/// Handles are appended in tier order: the first is the fastest, most
/// local store, the last the most shared one. Validation happens at
/// [`build`](TieredCacheBuilder::build).
pub struct TieredCacheBuilder<V> {
    name: SmolStr,
    update_mode: UpdateMode,
    tiers: Vec<Tier<V>>,
    backplane: Option<SharedBackplane>,
}

impl<V> TieredCacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn new() -> Self {
        TieredCacheBuilder {
            name: SmolStr::new_static("cache"),
            update_mode: UpdateMode::default(),
            tiers: Vec::new(),
            backplane: None,
        }
    }

    /// Sets the manager name, used in logs.
    ///
    /// # Default
    ///
    /// `"cache"`
    pub fn name(mut self, name: impl AsRef<str>) -> Self {
        self.name = SmolStr::new(name.as_ref());
        self
    }

    /// Selects the update mode.
    ///
    /// # Default
    ///
    /// [`UpdateMode::Up`]
    pub fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    /// Appends a handle as the next tier.
    pub fn handle(self, handle: impl CacheHandle<V> + 'static) -> Self {
        self.tier(Arc::new(handle), false)
    }

    /// Appends a handle as the next tier and marks it as the backplane
    /// source — the shared authority whose changes peers already see.
    pub fn backplane_source_handle(self, handle: impl CacheHandle<V> + 'static) -> Self {
        self.tier(Arc::new(handle), true)
    }

    /// Appends an already shared handle as the next tier.
    pub fn tier(mut self, handle: SharedHandle<V>, backplane_source: bool) -> Self {
        self.tiers.push(Tier {
            handle,
            backplane_source,
        });
        self
    }

    /// Attaches a backplane.
    pub fn backplane(self, backplane: impl Backplane + 'static) -> Self {
        self.shared_backplane(Arc::new(backplane))
    }

    /// Attaches an already shared backplane.
    pub fn shared_backplane(mut self, backplane: SharedBackplane) -> Self {
        self.backplane = Some(backplane);
        self
    }

    /// Validates the configuration and starts the manager.
    ///
    /// When a backplane is attached this subscribes to it and spawns the
    /// invalidation loop, so it must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NoHandles`] when no tier was added
    /// - [`ConfigError::DuplicateHandleName`] when two tiers share a name
    /// - [`ConfigError::NoBackplaneSource`] when a backplane is attached but
    ///   no tier is marked as its source
    pub async fn build(self) -> Result<TieredCache<V>, ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::NoHandles(self.name));
        }
        for (index, tier) in self.tiers.iter().enumerate() {
            let name = tier.handle.name();
            if self.tiers[..index].iter().any(|t| t.handle.name() == name) {
                return Err(ConfigError::DuplicateHandleName(SmolStr::new(name)));
            }
        }
        if self.backplane.is_some() && !self.tiers.iter().any(|tier| tier.backplane_source) {
            return Err(ConfigError::NoBackplaneSource(self.name));
        }

        let listener = match &self.backplane {
            Some(backplane) => {
                let events = backplane.subscribe().await.map_err(|error| {
                    ConfigError::Construction {
                        component: SmolStr::new_static("backplane"),
                        source: Box::new(error),
                    }
                })?;
                let local_tiers: Vec<SharedHandle<V>> = self
                    .tiers
                    .iter()
                    .filter(|tier| !tier.backplane_source)
                    .map(|tier| tier.handle.clone())
                    .collect();
                Some(tokio::spawn(run_invalidation_loop(
                    self.name.clone(),
                    events,
                    local_tiers,
                )))
            }
            None => None,
        };

        debug!(cache = %self.name, tiers = self.tiers.len(), "manager built");
        Ok(TieredCache {
            inner: Arc::new(Inner {
                name: self.name,
                tiers: self.tiers,
                update_mode: self.update_mode,
                backplane: self.backplane,
                update_lock: Mutex::new(()),
                disposed: AtomicBool::new(false),
                listener: std::sync::Mutex::new(listener),
            }),
        })
    }
}
