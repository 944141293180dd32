//! Expiration policies for cached items.
//!
//! Every [`CacheItem`](crate::CacheItem) carries an [`Expiration`] describing
//! when the entry stops being served:
//!
//! - [`Expiration::Never`] — the entry never expires on its own
//! - [`Expiration::Absolute`] — fixed wall-clock deadline counted from insertion
//! - [`Expiration::Sliding`] — deadline extends on every successful read
//! - [`Expiration::Default`] — defer to the storing handle's configured policy
//!
//! The deadline itself is evaluated by each handle against the item's
//! timestamps, so an item promoted between tiers keeps its original absolute
//! deadline (the creation instant travels with the item).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ItemError;

/// Expiration policy of a cached item.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use strata_core::Expiration;
///
/// let policy = Expiration::Sliding(Duration::from_secs(30));
/// assert_eq!(policy.timeout(), Some(Duration::from_secs(30)));
/// assert!(policy.validate().is_ok());
///
/// // Zero timeouts are a configuration error.
/// assert!(Expiration::Absolute(Duration::ZERO).validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", content = "timeout", rename_all = "snake_case")]
pub enum Expiration {
    /// Defer to the expiration the storing handle is configured with.
    #[default]
    Default,
    /// The entry never expires.
    Never,
    /// The entry expires a fixed duration after it was created.
    Absolute(Duration),
    /// The entry expires when it has not been read for the given duration.
    Sliding(Duration),
}

impl Expiration {
    /// Returns the timeout for absolute and sliding policies, `None` otherwise.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Expiration::Absolute(timeout) | Expiration::Sliding(timeout) => Some(*timeout),
            Expiration::Default | Expiration::Never => None,
        }
    }

    /// Whether this policy defers to the handle's configured default.
    pub fn is_default(&self) -> bool {
        matches!(self, Expiration::Default)
    }

    /// Rejects absolute and sliding policies with a zero timeout.
    pub fn validate(&self) -> Result<(), ItemError> {
        match self {
            Expiration::Absolute(timeout) if timeout.is_zero() => {
                Err(ItemError::ZeroTimeout("absolute"))
            }
            Expiration::Sliding(timeout) if timeout.is_zero() => {
                Err(ItemError::ZeroTimeout("sliding"))
            }
            _ => Ok(()),
        }
    }

    /// Resolves `Default` against a handle's configured policy.
    ///
    /// Any concrete policy wins over the handle default.
    pub fn resolve(&self, handle_default: Expiration) -> Expiration {
        match self {
            Expiration::Default => match handle_default {
                // A handle configured with `Default` has no opinion either.
                Expiration::Default => Expiration::Never,
                concrete => concrete,
            },
            concrete => *concrete,
        }
    }

    /// Computes the instant at which an entry with this policy expires.
    ///
    /// `created` anchors absolute deadlines, `last_accessed` anchors sliding
    /// ones. Returns `None` for `Never` and unresolved `Default` policies.
    pub fn deadline(
        &self,
        created: DateTime<Utc>,
        last_accessed: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Expiration::Absolute(timeout) => {
                Some(created + chrono::Duration::from_std(*timeout).ok()?)
            }
            Expiration::Sliding(timeout) => {
                Some(last_accessed + chrono::Duration::from_std(*timeout).ok()?)
            }
            Expiration::Default | Expiration::Never => None,
        }
    }

    /// Whether an entry with the given timestamps is past its deadline.
    pub fn is_expired_at(
        &self,
        created: DateTime<Utc>,
        last_accessed: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        self.deadline(created, last_accessed)
            .is_some_and(|deadline| deadline <= now)
    }
}
