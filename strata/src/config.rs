//! Declarative manager configuration.
//!
//! [`CacheConfig`] is the serde model describing a complete manager: the
//! ordered handle list, the update mode and an optional backplane. It can be
//! deserialized from any serde format and turned into a running
//! [`TieredCache`] with [`CacheConfig::build`].
//!
//! Built-in handle kinds cover the in-process memory store and Redis;
//! anything else plugs in through a [`HandleRegistry`] keyed by provider
//! identifier.
//!
//! ```
//! use strata::config::CacheConfig;
//!
//! let config: CacheConfig = serde_json::from_str(
//!     r#"{
//!         "name": "sessions",
//!         "update_mode": "up",
//!         "handles": [
//!             { "name": "l1", "type": "memory" },
//!             { "name": "l2", "type": "memory", "backplane_source": true }
//!         ],
//!         "backplane": { "type": "in_process", "channel": "sessions" }
//!     }"#,
//! )
//! .unwrap();
//! assert_eq!(config.handles.len(), 2);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use strata_backplane::{InProcessBackplane, SharedBackplane};
use strata_core::Expiration;
use strata_handle::SharedHandle;
use strata_memory::MemoryHandle;

use crate::error::ConfigError;
use crate::manager::{TieredCache, TieredCacheBuilder, UpdateMode};

fn default_name() -> String {
    "cache".to_owned()
}

fn default_channel() -> String {
    "strata".to_owned()
}

fn default_namespace() -> String {
    "strata".to_owned()
}

fn default_true() -> bool {
    true
}

/// Complete declarative description of one manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Manager name, used in logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Update-mode policy.
    #[serde(default)]
    pub update_mode: UpdateMode,
    /// Ordered handle configurations; the first entry is tier 0.
    pub handles: Vec<HandleConfig>,
    /// Optional coherency backplane.
    #[serde(default)]
    pub backplane: Option<BackplaneConfig>,
}

/// Configuration of a single handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleConfig {
    /// Handle name, unique within the manager.
    pub name: String,
    /// Whether this handle is the backplane source tier.
    #[serde(default)]
    pub backplane_source: bool,
    /// Whether statistics are recorded for this handle.
    #[serde(default = "default_true")]
    pub stats: bool,
    /// Expiration applied to items carrying the default policy.
    #[serde(default)]
    pub expiration: Expiration,
    /// The concrete handle kind.
    #[serde(flatten)]
    pub kind: HandleKind,
}

/// The concrete store behind a handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandleKind {
    /// In-process memory store.
    Memory(MemoryConfig),
    /// Redis-backed distributed store.
    Redis(RedisConfig),
    /// A handle resolved through a [`HandleRegistry`].
    Custom(CustomConfig),
}

/// Settings of the in-process memory handle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryConfig {}

/// Settings of the Redis handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub connection_string: String,
    /// Key namespace prefix.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Value serialization format.
    #[serde(default)]
    pub serializer: SerializerKind,
}

/// Value serialization format for byte-backed handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializerKind {
    /// Compact binary encoding.
    #[default]
    Bincode,
    /// Human-readable JSON encoding.
    Json,
}

/// Settings of a registry-resolved handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomConfig {
    /// Provider identifier looked up in the registry.
    pub provider: String,
    /// Opaque provider-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The coherency backplane transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackplaneConfig {
    /// Named broadcast channel within this process.
    InProcess {
        /// Channel name shared by the coordinating managers.
        #[serde(default = "default_channel")]
        channel: String,
    },
    /// Redis pub/sub channel.
    Redis {
        /// Redis connection URL.
        connection_string: String,
        /// Pub/sub channel name shared by the coordinating nodes.
        #[serde(default = "default_channel")]
        channel: String,
    },
}

/// Factory closure producing a handle from its configuration.
pub type HandleFactory<V> = Arc<
    dyn Fn(&HandleConfig, &serde_json::Value) -> Result<SharedHandle<V>, ConfigError>
        + Send
        + Sync,
>;

/// Registry of custom handle providers, keyed by identifier.
///
/// Providers receive the full [`HandleConfig`] (name, expiration default,
/// statistics flag) plus the opaque `params` value from the configuration.
pub struct HandleRegistry<V> {
    factories: HashMap<SmolStr, HandleFactory<V>>,
}

impl<V> Default for HandleRegistry<V> {
    fn default() -> Self {
        HandleRegistry {
            factories: HashMap::new(),
        }
    }
}

impl<V> HandleRegistry<V> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under the given identifier.
    pub fn register<F>(mut self, provider: impl AsRef<str>, factory: F) -> Self
    where
        F: Fn(&HandleConfig, &serde_json::Value) -> Result<SharedHandle<V>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.factories
            .insert(SmolStr::new(provider.as_ref()), Arc::new(factory));
        self
    }

    fn build(
        &self,
        provider: &str,
        config: &HandleConfig,
        params: &serde_json::Value,
    ) -> Result<SharedHandle<V>, ConfigError> {
        let factory = self
            .factories
            .get(provider)
            .ok_or_else(|| ConfigError::UnknownProvider(SmolStr::new(provider)))?;
        factory(config, params)
    }
}

impl CacheConfig {
    /// Builds a running manager, resolving only built-in handle kinds.
    pub async fn build<V>(self) -> Result<TieredCache<V>, ConfigError>
    where
        V: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.build_with_registry(&HandleRegistry::new()).await
    }

    /// Builds a running manager, resolving custom handle kinds through the
    /// given registry.
    ///
    /// Components are constructed in a fixed order — backplane first, then
    /// each handle in declared order — and the first failure aborts the
    /// build with an error naming the component.
    pub async fn build_with_registry<V>(
        self,
        registry: &HandleRegistry<V>,
    ) -> Result<TieredCache<V>, ConfigError>
    where
        V: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let backplane = match &self.backplane {
            Some(config) => Some(build_backplane(config)?),
            None => None,
        };

        let mut builder: TieredCacheBuilder<V> = TieredCache::builder()
            .name(&self.name)
            .update_mode(self.update_mode);
        for handle_config in &self.handles {
            let handle = build_handle(handle_config, registry)?;
            builder = builder.tier(handle, handle_config.backplane_source);
        }
        if let Some(backplane) = backplane {
            builder = builder.shared_backplane(backplane);
        }
        builder.build().await
    }
}

fn build_backplane(config: &BackplaneConfig) -> Result<SharedBackplane, ConfigError> {
    match config {
        BackplaneConfig::InProcess { channel } => {
            Ok(Arc::new(InProcessBackplane::attach(channel)))
        }
        #[cfg(feature = "redis")]
        BackplaneConfig::Redis {
            connection_string,
            channel,
        } => {
            let backplane = strata_redis::RedisBackplane::builder()
                .server(connection_string.clone())
                .channel(channel)
                .build()
                .map_err(|error| ConfigError::construction("backplane", error))?;
            Ok(Arc::new(backplane))
        }
        #[cfg(not(feature = "redis"))]
        BackplaneConfig::Redis { .. } => {
            Err(ConfigError::NotAvailable(SmolStr::new_static("redis")))
        }
    }
}

fn build_handle<V>(
    config: &HandleConfig,
    registry: &HandleRegistry<V>,
) -> Result<SharedHandle<V>, ConfigError>
where
    V: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
{
    match &config.kind {
        HandleKind::Memory(MemoryConfig {}) => {
            let handle = MemoryHandle::<V>::builder()
                .name(&config.name)
                .default_expiration(config.expiration)
                .stats_enabled(config.stats)
                .build()?;
            Ok(Arc::new(handle))
        }
        #[cfg(feature = "redis")]
        HandleKind::Redis(redis) => {
            let builder = strata_redis::RedisHandle::<V>::builder()
                .server(redis.connection_string.clone())
                .name(&config.name)
                .namespace(&redis.namespace)
                .default_expiration(config.expiration)
                .stats_enabled(config.stats);
            let handle: SharedHandle<V> = match redis.serializer {
                SerializerKind::Bincode => Arc::new(
                    builder
                        .build()
                        .map_err(|error| ConfigError::construction(&config.name, error))?,
                ),
                SerializerKind::Json => Arc::new(
                    builder
                        .serializer(strata_handle::JsonSerializer)
                        .build()
                        .map_err(|error| ConfigError::construction(&config.name, error))?,
                ),
            };
            Ok(handle)
        }
        #[cfg(not(feature = "redis"))]
        HandleKind::Redis(_) => Err(ConfigError::NotAvailable(SmolStr::new_static("redis"))),
        HandleKind::Custom(custom) => registry.build(&custom.provider, config, &custom.params),
    }
}
