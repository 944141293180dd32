//! Per-handle, per-region statistics counters.
//!
//! Every handle owns one [`CacheStats`]. Counters are plain atomics, so
//! recording and reading are lock-free (reads may be approximate under
//! concurrent traffic). Named regions get their own lazily created counter
//! set in addition to the handle-wide totals; creating a region set takes a
//! short sharded-map lock, every later access is lock-free.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use dashmap::DashMap;
use smol_str::SmolStr;

use crate::metrics;

/// One set of operation counters.
#[derive(Debug, Default)]
struct CounterSet {
    hits: AtomicU64,
    misses: AtomicU64,
    items: AtomicI64,
    get_calls: AtomicU64,
    put_calls: AtomicU64,
    add_calls: AtomicU64,
    remove_calls: AtomicU64,
    clear_calls: AtomicU64,
    clear_region_calls: AtomicU64,
}

impl CounterSet {
    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            items: self.items.load(Ordering::Relaxed).max(0) as u64,
            get_calls: self.get_calls.load(Ordering::Relaxed),
            put_calls: self.put_calls.load(Ordering::Relaxed),
            add_calls: self.add_calls.load(Ordering::Relaxed),
            remove_calls: self.remove_calls.load(Ordering::Relaxed),
            clear_calls: self.clear_calls.load(Ordering::Relaxed),
            clear_region_calls: self.clear_region_calls.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a counter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Reads that found a live entry.
    pub hits: u64,
    /// Reads that found nothing (or an expired entry).
    pub misses: u64,
    /// Entries currently stored.
    pub items: u64,
    /// Number of read operations.
    pub get_calls: u64,
    /// Number of upsert operations.
    pub put_calls: u64,
    /// Number of insert-if-absent operations.
    pub add_calls: u64,
    /// Number of delete operations.
    pub remove_calls: u64,
    /// Number of full clears.
    pub clear_calls: u64,
    /// Number of region clears.
    pub clear_region_calls: u64,
}

/// Statistics counters for one handle.
///
/// Recording is a no-op when the handle was configured with statistics
/// disabled; the flag is checked before any atomic traffic.
#[derive(Debug)]
pub struct CacheStats {
    handle: SmolStr,
    enabled: bool,
    totals: CounterSet,
    regions: DashMap<SmolStr, Arc<CounterSet>>,
}

impl CacheStats {
    /// Creates counters for the named handle.
    pub fn new(handle: impl AsRef<str>, enabled: bool) -> Self {
        CacheStats {
            handle: SmolStr::new(handle.as_ref()),
            enabled,
            totals: CounterSet::default(),
            regions: DashMap::new(),
        }
    }

    /// Whether recording is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn region_set(&self, region: &str) -> Arc<CounterSet> {
        // Entry creation holds the shard lock only for the first reference.
        self.regions
            .entry(SmolStr::new(region))
            .or_default()
            .clone()
    }

    fn record(&self, region: Option<&str>, f: impl Fn(&CounterSet)) {
        if !self.enabled {
            return;
        }
        f(&self.totals);
        if let Some(region) = region {
            f(&self.region_set(region));
        }
    }

    /// Records a read operation.
    pub fn record_get(&self, region: Option<&str>) {
        self.record(region, |c| {
            c.get_calls.fetch_add(1, Ordering::Relaxed);
        });
    }

    /// Records a read that found a live entry.
    pub fn record_hit(&self, region: Option<&str>) {
        self.record(region, |c| {
            c.hits.fetch_add(1, Ordering::Relaxed);
        });
        metrics::record_hit(&self.handle);
    }

    /// Records a read that found nothing.
    pub fn record_miss(&self, region: Option<&str>) {
        self.record(region, |c| {
            c.misses.fetch_add(1, Ordering::Relaxed);
        });
        metrics::record_miss(&self.handle);
    }

    /// Records an upsert operation.
    pub fn record_put(&self, region: Option<&str>) {
        self.record(region, |c| {
            c.put_calls.fetch_add(1, Ordering::Relaxed);
        });
        metrics::record_write(&self.handle);
    }

    /// Records an insert-if-absent operation.
    pub fn record_add(&self, region: Option<&str>) {
        self.record(region, |c| {
            c.add_calls.fetch_add(1, Ordering::Relaxed);
        });
        metrics::record_write(&self.handle);
    }

    /// Records a delete operation.
    pub fn record_remove(&self, region: Option<&str>) {
        self.record(region, |c| {
            c.remove_calls.fetch_add(1, Ordering::Relaxed);
        });
        metrics::record_remove(&self.handle);
    }

    /// Records a full clear and resets the stored-item counters.
    pub fn record_clear(&self) {
        if !self.enabled {
            return;
        }
        self.totals.clear_calls.fetch_add(1, Ordering::Relaxed);
        self.totals.items.store(0, Ordering::Relaxed);
        for entry in self.regions.iter() {
            entry.value().items.store(0, Ordering::Relaxed);
        }
        metrics::record_items(&self.handle, 0);
    }

    /// Records a region clear of `removed` entries.
    pub fn record_clear_region(&self, region: &str, removed: u64) {
        if !self.enabled {
            return;
        }
        self.totals
            .clear_region_calls
            .fetch_add(1, Ordering::Relaxed);
        self.totals.items.fetch_sub(removed as i64, Ordering::Relaxed);
        let set = self.region_set(region);
        set.clear_region_calls.fetch_add(1, Ordering::Relaxed);
        set.items.store(0, Ordering::Relaxed);
        metrics::record_items(
            &self.handle,
            self.totals.items.load(Ordering::Relaxed).max(0) as u64,
        );
    }

    /// Adjusts the stored-item count by `delta`.
    pub fn items_changed(&self, region: Option<&str>, delta: i64) {
        self.record(region, |c| {
            c.items.fetch_add(delta, Ordering::Relaxed);
        });
        if self.enabled {
            metrics::record_items(
                &self.handle,
                self.totals.items.load(Ordering::Relaxed).max(0) as u64,
            );
        }
    }

    /// Snapshot of the handle-wide totals.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.totals.snapshot()
    }

    /// Snapshot of one region's counters.
    ///
    /// The region counter set is created lazily, so this returns the zero
    /// snapshot for regions that never saw traffic.
    pub fn region_snapshot(&self, region: &str) -> StatsSnapshot {
        self.regions
            .get(region)
            .map(|set| set.snapshot())
            .unwrap_or_default()
    }
}
