//! The cached item record.

use chrono::{DateTime, Utc};
use smol_str::SmolStr;

use crate::error::ItemError;
use crate::expiration::Expiration;
use crate::key::EntryKey;

/// An immutable record of one cached entry.
///
/// A `CacheItem` bundles the entry's identity (`key` + optional `region`),
/// its value, its [`Expiration`] policy, creation and last-access timestamps,
/// and a version counter used for optimistic concurrency.
///
/// Items are value objects: the mutating operations ([`with_value`],
/// [`with_expiration`], [`touched`]) return a new item sharing the identity
/// fields. Once an item has been observed by any reader its key, region and
/// creation instant never change.
///
/// The version is owned by the handle that stores the item — it is assigned
/// on insert and bumped on every replacing write, which is what the
/// compare-and-swap update loop keys on.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use strata_core::{CacheItem, Expiration};
///
/// let item = CacheItem::new("greeting", "hello".to_owned())
///     .unwrap()
///     .with_expiration(Expiration::Absolute(Duration::from_secs(60)))
///     .unwrap();
///
/// assert_eq!(item.key(), "greeting");
/// assert_eq!(item.region(), None);
/// assert_eq!(item.value(), "hello");
///
/// let renamed = item.with_value("goodbye".to_owned());
/// assert_eq!(renamed.created(), item.created());
/// ```
///
/// [`with_value`]: CacheItem::with_value
/// [`with_expiration`]: CacheItem::with_expiration
/// [`touched`]: CacheItem::touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem<V> {
    key: SmolStr,
    region: Option<SmolStr>,
    value: V,
    expiration: Expiration,
    created: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    version: u64,
}

impl<V> CacheItem<V> {
    /// Creates an item in the region-less namespace with the default
    /// expiration policy.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::EmptyKey`] if `key` is empty.
    pub fn new(key: impl AsRef<str>, value: V) -> Result<Self, ItemError> {
        let entry_key = EntryKey::new(key)?;
        Ok(Self::from_entry_key(entry_key, value))
    }

    /// Creates an item inside the given region with the default expiration
    /// policy.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::EmptyKey`] or [`ItemError::EmptyRegion`] if
    /// either identity component is empty.
    pub fn new_in(
        key: impl AsRef<str>,
        region: impl AsRef<str>,
        value: V,
    ) -> Result<Self, ItemError> {
        let entry_key = EntryKey::new_in(key, region)?;
        Ok(Self::from_entry_key(entry_key, value))
    }

    fn from_entry_key(entry_key: EntryKey, value: V) -> Self {
        let now = Utc::now();
        let region = entry_key.region().map(SmolStr::new);
        CacheItem {
            key: SmolStr::new(entry_key.key()),
            region,
            value,
            expiration: Expiration::Default,
            created: now,
            last_accessed: now,
            version: 0,
        }
    }

    /// Rehydrates an item from fields read out of a backing store.
    ///
    /// Handle implementations backed by remote stores use this to rebuild
    /// the item exactly as it was written — original creation instant,
    /// last-access stamp and handle-assigned version included.
    pub fn restore(
        key: EntryKey,
        value: V,
        expiration: Expiration,
        created: DateTime<Utc>,
        last_accessed: DateTime<Utc>,
        version: u64,
    ) -> Self {
        let region = key.region().map(SmolStr::new);
        CacheItem {
            key: SmolStr::new(key.key()),
            region,
            value,
            expiration,
            created,
            last_accessed,
            version,
        }
    }

    /// The key component of the item's identity.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The region component of the item's identity, if any.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// The `(key, region)` identity as an [`EntryKey`].
    pub fn entry_key(&self) -> EntryKey {
        EntryKey::from_parts(self.key.clone(), self.region.clone())
    }

    /// The cached value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the item and returns the value.
    pub fn into_value(self) -> V {
        self.value
    }

    /// The expiration policy carried by this item.
    pub fn expiration(&self) -> Expiration {
        self.expiration
    }

    /// When the item was first constructed.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// When the item was last read or written.
    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    /// The handle-assigned version, bumped on every replacing write.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns a new item with the value replaced; identity, timestamps and
    /// version are preserved.
    pub fn with_value(&self, value: V) -> Self
    where
        V: Clone,
    {
        CacheItem {
            value,
            ..self.clone()
        }
    }

    /// Returns a new item with the expiration policy replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::ZeroTimeout`] for absolute or sliding policies
    /// with a zero timeout.
    pub fn with_expiration(self, expiration: Expiration) -> Result<Self, ItemError> {
        expiration.validate()?;
        Ok(CacheItem { expiration, ..self })
    }

    /// Returns a new item stamped as accessed at `now`.
    ///
    /// Handles call this on read-touch and on write; it is what extends a
    /// sliding deadline.
    pub fn touched(&self, now: DateTime<Utc>) -> Self
    where
        V: Clone,
    {
        CacheItem {
            last_accessed: now,
            ..self.clone()
        }
    }

    /// Returns a new item with the given version.
    ///
    /// Versions are owned by handle implementations; the manager never
    /// assigns one.
    pub fn with_version(&self, version: u64) -> Self
    where
        V: Clone,
    {
        CacheItem {
            version,
            ..self.clone()
        }
    }

    /// Whether the item is past its deadline at `now`, given the handle's
    /// default policy.
    pub fn is_expired_at(&self, handle_default: Expiration, now: DateTime<Utc>) -> bool {
        self.expiration
            .resolve(handle_default)
            .is_expired_at(self.created, self.last_accessed, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn identity_survives_value_replacement() {
        let item = CacheItem::new_in("k", "r", 1u32).unwrap();
        let replaced = item.with_value(2);
        assert_eq!(replaced.key(), "k");
        assert_eq!(replaced.region(), Some("r"));
        assert_eq!(replaced.created(), item.created());
        assert_eq!(replaced.version(), item.version());
        assert_eq!(*replaced.value(), 2);
    }

    #[test]
    fn with_expiration_validates_timeout() {
        let item = CacheItem::new("k", 1u32).unwrap();
        assert!(
            item.clone()
                .with_expiration(Expiration::Absolute(Duration::ZERO))
                .is_err()
        );
        let item = item
            .with_expiration(Expiration::Sliding(Duration::from_millis(100)))
            .unwrap();
        assert_eq!(
            item.expiration(),
            Expiration::Sliding(Duration::from_millis(100))
        );
    }

    #[test]
    fn touched_extends_sliding_deadline() {
        let item = CacheItem::new("k", 1u32)
            .unwrap()
            .with_expiration(Expiration::Sliding(Duration::from_secs(10)))
            .unwrap();
        let later = item.created() + chrono::Duration::seconds(8);
        let touched = item.touched(later);

        let at = item.created() + chrono::Duration::seconds(12);
        assert!(item.is_expired_at(Expiration::Default, at));
        assert!(!touched.is_expired_at(Expiration::Default, at));
    }

    #[test]
    fn default_policy_defers_to_handle() {
        let item = CacheItem::new("k", 1u32).unwrap();
        let at = item.created() + chrono::Duration::seconds(2);
        assert!(item.is_expired_at(Expiration::Absolute(Duration::from_secs(1)), at));
        assert!(!item.is_expired_at(Expiration::Never, at));
    }
}
