//! Error types for cache manager operations and construction.

use smol_str::SmolStr;
use strata_core::ItemError;
use strata_handle::HandleError;
use thiserror::Error;

/// Error type for operations on a [`TieredCache`](crate::TieredCache).
///
/// Absent entries are not errors: reads return `None`, removals return
/// `false` and updates report
/// [`UpdateOutcome::NotFound`](strata_core::UpdateOutcome::NotFound).
#[derive(Debug, Error)]
pub enum CacheError {
    /// A handle failed while executing the operation.
    ///
    /// Handle failures are propagated, not retried; callers that need
    /// retry-on-conflict semantics use the update operation.
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// Invalid key, region or expiration passed into an operation.
    #[error(transparent)]
    Item(#[from] ItemError),

    /// The manager has been disposed; no further operations are possible.
    #[error("cache manager has been disposed")]
    Disposed,
}

/// Error raised while building a manager from configuration.
///
/// Construction errors are fatal and name the offending component.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration declares no handles.
    #[error("cache `{0}` has no handles configured")]
    NoHandles(SmolStr),

    /// A backplane is configured but no handle is marked as its source.
    #[error("cache `{0}` has a backplane but no handle marked as backplane source")]
    NoBackplaneSource(SmolStr),

    /// Two handles share a name.
    #[error("duplicate handle name `{0}`")]
    DuplicateHandleName(SmolStr),

    /// A custom handle kind names a provider missing from the registry.
    #[error("unknown handle provider `{0}`")]
    UnknownProvider(SmolStr),

    /// The configuration names a component this build was compiled without.
    #[error("`{0}` support is not compiled into this build")]
    NotAvailable(SmolStr),

    /// A component could not be constructed from its configuration.
    #[error("failed to construct `{component}`: {source}")]
    Construction {
        /// Name of the component that failed to build.
        component: SmolStr,
        /// The underlying construction failure.
        source: Box<dyn std::error::Error + Send>,
    },

    /// Invalid expiration settings in the configuration.
    #[error(transparent)]
    Item(#[from] ItemError),
}

impl ConfigError {
    /// Wraps a component build failure with the component's name.
    pub fn construction(
        component: impl AsRef<str>,
        source: impl std::error::Error + Send + 'static,
    ) -> Self {
        ConfigError::Construction {
            component: SmolStr::new(component.as_ref()),
            source: Box::new(source),
        }
    }
}
