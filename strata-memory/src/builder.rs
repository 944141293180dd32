//! Builder for [`MemoryHandle`].

use std::marker::PhantomData;

use smol_str::SmolStr;
use strata_core::{Expiration, ItemError};

use crate::handle::MemoryHandle;

/// Builder for creating and configuring a [`MemoryHandle`].
///
/// Use [`MemoryHandle::builder`] to create a new builder instance.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use strata_core::Expiration;
/// use strata_memory::MemoryHandle;
///
/// let handle: MemoryHandle<u64> = MemoryHandle::builder()
///     .name("l1")
///     .default_expiration(Expiration::Sliding(Duration::from_secs(300)))
///     .build()
///     .unwrap();
/// ```
pub struct MemoryHandleBuilder<V> {
    pub(crate) name: SmolStr,
    pub(crate) default_expiration: Expiration,
    pub(crate) stats_enabled: bool,
    _value: PhantomData<fn() -> V>,
}

impl<V> Default for MemoryHandleBuilder<V> {
    fn default() -> Self {
        MemoryHandleBuilder {
            name: SmolStr::new_static("memory"),
            default_expiration: Expiration::Never,
            stats_enabled: true,
            _value: PhantomData,
        }
    }
}

impl<V> MemoryHandleBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Sets the handle name (unique within a manager).
    ///
    /// # Default
    ///
    /// `"memory"`
    pub fn name(mut self, name: impl AsRef<str>) -> Self {
        self.name = SmolStr::new(name.as_ref());
        self
    }

    /// Sets the expiration applied to items carrying the default policy.
    ///
    /// # Default
    ///
    /// [`Expiration::Never`]
    pub fn default_expiration(mut self, expiration: Expiration) -> Self {
        self.default_expiration = expiration;
        self
    }

    /// Enables or disables statistics recording.
    ///
    /// # Default
    ///
    /// Enabled.
    pub fn stats_enabled(mut self, enabled: bool) -> Self {
        self.stats_enabled = enabled;
        self
    }

    /// Builds the handle.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::ZeroTimeout`] when the configured default
    /// expiration carries a zero timeout.
    pub fn build(self) -> Result<MemoryHandle<V>, ItemError> {
        self.default_expiration.validate()?;
        Ok(MemoryHandle::from_builder(self))
    }
}
