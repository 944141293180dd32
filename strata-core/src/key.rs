//! Entry identity: key plus optional region.
//!
//! Every cached entry is addressed by an [`EntryKey`], the pair of a
//! non-empty key and an optional non-empty region. The pair is the global
//! identity across all tiers: two handles holding an item under the same
//! `(key, region)` hold the same logical entry. Entries without a region
//! live in their own namespace, distinct from every named region.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

use crate::error::ItemError;

/// Identity of a cached entry: a key, optionally namespaced by a region.
///
/// `EntryKey` uses [`SmolStr`] internally, so short keys are stored inline
/// and cloning is cheap.
///
/// # Example
///
/// ```
/// use strata_core::EntryKey;
///
/// let plain = EntryKey::new("user:42").unwrap();
/// let scoped = EntryKey::new_in("user:42", "sessions").unwrap();
///
/// assert_ne!(plain, scoped);
/// assert_eq!(scoped.region(), Some("sessions"));
/// assert_eq!(format!("{scoped}"), "sessions/user:42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    key: SmolStr,
    region: Option<SmolStr>,
}

impl EntryKey {
    /// Creates a key in the region-less namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::EmptyKey`] if `key` is empty.
    pub fn new(key: impl AsRef<str>) -> Result<Self, ItemError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(ItemError::EmptyKey);
        }
        Ok(EntryKey {
            key: SmolStr::new(key),
            region: None,
        })
    }

    /// Creates a key inside the given region.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::EmptyKey`] or [`ItemError::EmptyRegion`] if either
    /// component is empty.
    pub fn new_in(key: impl AsRef<str>, region: impl AsRef<str>) -> Result<Self, ItemError> {
        let mut entry_key = EntryKey::new(key)?;
        let region = region.as_ref();
        if region.is_empty() {
            return Err(ItemError::EmptyRegion);
        }
        entry_key.region = Some(SmolStr::new(region));
        Ok(entry_key)
    }

    /// Builds a key from parts that were already validated.
    pub(crate) fn from_parts(key: SmolStr, region: Option<SmolStr>) -> Self {
        EntryKey { key, region }
    }

    /// The key component.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The region component, if any.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}/{}", region, self.key),
            None => write!(f, "{}", self.key),
        }
    }
}
