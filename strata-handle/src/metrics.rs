//! Handle metrics for the strata caching stack.
//!
//! This module exports the per-handle statistics through the `metrics`
//! facade. Enable the `metrics` feature to use it; without the feature every
//! recording function is a no-op.
//!
//! ## Naming Pattern
//!
//! All metrics follow the pattern: `strata_handle_{event}_{metric_type}`,
//! labeled with the handle name.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Metric name for the cache hit counter.
    pub static ref HANDLE_HITS: &'static str = {
        metrics::describe_counter!(
            "strata_handle_hits_total",
            "Total number of cache hits per handle."
        );
        "strata_handle_hits_total"
    };

    /// Metric name for the cache miss counter.
    pub static ref HANDLE_MISSES: &'static str = {
        metrics::describe_counter!(
            "strata_handle_misses_total",
            "Total number of cache misses per handle."
        );
        "strata_handle_misses_total"
    };

    /// Metric name for the write counter (puts and adds).
    pub static ref HANDLE_WRITES: &'static str = {
        metrics::describe_counter!(
            "strata_handle_writes_total",
            "Total number of cache write operations per handle."
        );
        "strata_handle_writes_total"
    };

    /// Metric name for the remove counter.
    pub static ref HANDLE_REMOVES: &'static str = {
        metrics::describe_counter!(
            "strata_handle_removes_total",
            "Total number of cache remove operations per handle."
        );
        "strata_handle_removes_total"
    };

    /// Metric name for the stored-items gauge.
    pub static ref HANDLE_ITEMS: &'static str = {
        metrics::describe_gauge!(
            "strata_handle_items",
            "Number of entries currently stored per handle."
        );
        "strata_handle_items"
    };
}

/// Record a cache hit.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_hit(handle: &str) {
    metrics::counter!(*HANDLE_HITS, "handle" => handle.to_string()).increment(1);
}

/// Record a cache hit (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_hit(_handle: &str) {}

/// Record a cache miss.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_miss(handle: &str) {
    metrics::counter!(*HANDLE_MISSES, "handle" => handle.to_string()).increment(1);
}

/// Record a cache miss (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_miss(_handle: &str) {}

/// Record a write operation.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_write(handle: &str) {
    metrics::counter!(*HANDLE_WRITES, "handle" => handle.to_string()).increment(1);
}

/// Record a write operation (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_write(_handle: &str) {}

/// Record a remove operation.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_remove(handle: &str) {
    metrics::counter!(*HANDLE_REMOVES, "handle" => handle.to_string()).increment(1);
}

/// Record a remove operation (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_remove(_handle: &str) {}

/// Record the current stored-item count.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_items(handle: &str, items: u64) {
    metrics::gauge!(*HANDLE_ITEMS, "handle" => handle.to_string()).set(items as f64);
}

/// Record the current stored-item count (no-op when `metrics` feature disabled).
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_items(_handle: &str, _items: u64) {}
