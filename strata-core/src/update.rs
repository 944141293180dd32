//! Optimistic update results.

use crate::item::CacheItem;

/// Factory closure driven by the compare-and-swap update loop.
///
/// The closure receives the current value and returns the replacement, or
/// `None` to abort the update without writing.
pub type UpdateFn<'a, V> = &'a (dyn Fn(&V) -> Option<V> + Send + Sync);

/// Outcome of a compare-and-swap update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome<V> {
    /// The update was applied; `item` is the stored result and `attempts`
    /// counts how often the factory ran (1 in the absence of conflicts).
    Updated {
        /// The item as stored after the successful swap.
        item: CacheItem<V>,
        /// Number of compare-and-swap attempts, including the successful one.
        attempts: u32,
    },
    /// The factory returned `None`; nothing was written.
    FactoryReturnedNone,
    /// No entry exists under the key; nothing was written.
    NotFound,
    /// Every permitted attempt lost a version race.
    RetriesExhausted {
        /// Number of compare-and-swap attempts made before giving up.
        attempts: u32,
    },
}

impl<V> UpdateOutcome<V> {
    /// Whether the update was applied.
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated { .. })
    }

    /// The stored item for applied updates, `None` otherwise.
    pub fn into_item(self) -> Option<CacheItem<V>> {
        match self {
            UpdateOutcome::Updated { item, .. } => Some(item),
            _ => None,
        }
    }

    /// Number of compare-and-swap attempts made, where known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            UpdateOutcome::Updated { attempts, .. }
            | UpdateOutcome::RetriesExhausted { attempts } => Some(*attempts),
            UpdateOutcome::FactoryReturnedNone | UpdateOutcome::NotFound => None,
        }
    }
}
