//! Redis handle implementation.

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{Client, Script, aio::ConnectionManager};
use smol_str::SmolStr;
use tokio::sync::OnceCell;
use tracing::trace;

use strata_core::{CacheItem, EntryKey, Expiration, UpdateFn, UpdateOutcome};
use strata_handle::{BincodeSerializer, CacheHandle, CacheStats, HandleResult, Serializer};

use crate::error::Error;

/// Inserts the entry only when the key is absent. Expired entries are gone
/// from Redis already, so EXISTS is the whole check.
const ADD_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'v', ARGV[1], 'ver', 1, 'c', ARGV[2], 'a', ARGV[3], 'm', ARGV[4], 't', ARGV[5])
if tonumber(ARGV[6]) > 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[6])
end
redis.call('SADD', KEYS[2], KEYS[1])
redis.call('SADD', KEYS[3], ARGV[7])
return 1
"#;

/// Upserts the entry; HINCRBY doubles as both version bump and hash
/// creation. Returns the stored version (1 for a fresh insert).
const PUT_SCRIPT: &str = r#"
local ver = redis.call('HINCRBY', KEYS[1], 'ver', 1)
redis.call('HSET', KEYS[1], 'v', ARGV[1], 'c', ARGV[2], 'a', ARGV[3], 'm', ARGV[4], 't', ARGV[5])
if tonumber(ARGV[6]) > 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[6])
else
  redis.call('PERSIST', KEYS[1])
end
redis.call('SADD', KEYS[2], KEYS[1])
redis.call('SADD', KEYS[3], ARGV[7])
return ver
"#;

/// Version-checked replace. Returns -1 when the entry is gone, -2 on a
/// version conflict, the new version on success.
const CAS_SCRIPT: &str = r#"
local ver = redis.call('HGET', KEYS[1], 'ver')
if not ver then
  return -1
end
if ver ~= ARGV[1] then
  return -2
end
redis.call('HSET', KEYS[1], 'v', ARGV[2], 'ver', ARGV[3], 'a', ARGV[4])
if tonumber(ARGV[5]) > 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[5])
end
return tonumber(ARGV[3])
"#;

/// Replaces the expiration fields of an existing entry.
const EXPIRE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], 'm', ARGV[1], 't', ARGV[2], 'a', ARGV[3])
if tonumber(ARGV[4]) > 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[4])
else
  redis.call('PERSIST', KEYS[1])
end
return 1
"#;

/// Deletes the entry and drops it from the region index.
const REMOVE_SCRIPT: &str = r#"
redis.call('SREM', KEYS[2], KEYS[1])
return redis.call('DEL', KEYS[1])
"#;

/// Drops every entry of one region together with its index set.
const CLEAR_REGION_SCRIPT: &str = r#"
local members = redis.call('SMEMBERS', KEYS[1])
for i = 1, #members do
  redis.call('DEL', members[i])
end
redis.call('DEL', KEYS[1])
redis.call('SREM', KEYS[2], ARGV[1])
return #members
"#;

fn encode_mode(expiration: Expiration) -> (&'static str, u64) {
    match expiration {
        Expiration::Default => ("default", 0),
        Expiration::Never => ("never", 0),
        Expiration::Absolute(timeout) => ("absolute", timeout.as_millis() as u64),
        Expiration::Sliding(timeout) => ("sliding", timeout.as_millis() as u64),
    }
}

fn decode_mode(mode: &str, timeout_ms: u64) -> Result<Expiration, Error> {
    let timeout = std::time::Duration::from_millis(timeout_ms);
    match mode {
        "default" => Ok(Expiration::Default),
        "never" => Ok(Expiration::Never),
        "absolute" => Ok(Expiration::Absolute(timeout)),
        "sliding" => Ok(Expiration::Sliding(timeout)),
        _ => Err(Error::MalformedEntry("unknown expiration mode")),
    }
}

/// Distributed cache handle backed by Redis.
///
/// Each entry is a Redis hash holding the serialized value, the
/// handle-assigned version, both timestamps and the expiration policy.
/// Absolute and sliding deadlines map onto native Redis TTLs, so the server
/// evicts expired entries without any sweep on this side; a sliding read
/// re-arms the TTL. Regions are tracked through index sets, which makes
/// `clear_region` and `count` possible without scanning the keyspace.
///
/// Compare-and-swap updates run a Lua script comparing the stored version
/// in a single round trip, mapping the store's atomicity onto the item
/// version the update loop keys on.
///
/// # Type Parameters
///
/// * `V` - Cached value type; serialized through `S`.
/// * `S` - Value serializer. Default: [`BincodeSerializer`].
///
/// # Examples
///
/// ```no_run
/// use strata_redis::RedisHandle;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let handle: RedisHandle<String> = RedisHandle::builder()
///     .server("redis://localhost:6379/")
///     .name("shared")
///     .build()?;
/// # Ok(())
/// # }
/// ```
///
/// # Caveats
///
/// - **Network latency**: every operation is at least one round trip.
/// - **Region index drift**: entries evicted by the server's TTL stay in
///   their region index set until the next `clear`/`clear_region`, so
///   [`count`](CacheHandle::count) may overshoot under heavy expiration.
/// - The connection is established lazily on first use.
#[derive(Clone)]
pub struct RedisHandle<V, S = BincodeSerializer>
where
    S: Serializer,
{
    client: Client,
    connection: OnceCell<ConnectionManager>,
    serializer: S,
    name: SmolStr,
    namespace: SmolStr,
    default_expiration: Expiration,
    stats: std::sync::Arc<CacheStats>,
    _value: PhantomData<fn() -> V>,
}

impl<V> RedisHandle<V, BincodeSerializer>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn builder() -> RedisHandleBuilder<V, BincodeSerializer> {
        RedisHandleBuilder::default()
    }
}

impl<V, S> RedisHandle<V, S>
where
    V: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
    S: Serializer,
{
    /// Returns the multiplexed connection manager, connecting on first use.
    pub async fn connection(&self) -> Result<&ConnectionManager, Error> {
        trace!("get connection manager");
        self.connection
            .get_or_try_init(|| {
                trace!("initialize new redis connection manager");
                self.client.get_connection_manager()
            })
            .await
            .map_err(Error::from)
    }

    fn entry_storage_key(&self, key: &EntryKey) -> String {
        format!(
            "{}:{}:{}",
            self.namespace,
            key.region().unwrap_or_default(),
            key.key()
        )
    }

    fn region_index_key(&self, region: Option<&str>) -> String {
        format!("{}:regions:{}", self.namespace, region.unwrap_or_default())
    }

    fn regions_key(&self) -> String {
        format!("{}:regions", self.namespace)
    }

    /// Milliseconds until the resolved deadline, or 0 for entries that
    /// never expire.
    fn expire_millis(&self, item: &CacheItem<V>, now: DateTime<Utc>) -> u64 {
        let resolved = item.expiration().resolve(self.default_expiration);
        match resolved.deadline(item.created(), now) {
            Some(deadline) => (deadline - now).num_milliseconds().max(1) as u64,
            None => 0,
        }
    }

    async fn read_entry(&self, key: &EntryKey) -> HandleResult<Option<CacheItem<V>>> {
        let mut con = self.connection().await?.clone();
        let storage_key = self.entry_storage_key(key);

        let fields: HashMap<String, Vec<u8>> = redis::cmd("HGETALL")
            .arg(&storage_key)
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        if fields.is_empty() {
            return Ok(None);
        }

        let value_bytes = fields
            .get("v")
            .ok_or(Error::MalformedEntry("missing value field"))?;
        let value: V = self.serializer.deserialize(value_bytes)?;
        let version = parse_number(&fields, "ver")?;
        let created = parse_timestamp(&fields, "c")?;
        let last_accessed = parse_timestamp(&fields, "a")?;
        let mode = parse_text(&fields, "m")?;
        let timeout_ms = parse_number(&fields, "t")?;
        let expiration = decode_mode(&mode, timeout_ms)?;

        Ok(Some(CacheItem::restore(
            key.clone(),
            value,
            expiration,
            created,
            last_accessed,
            version,
        )))
    }

    async fn write_with(
        &self,
        script: &str,
        item: &CacheItem<V>,
        now: DateTime<Utc>,
    ) -> HandleResult<i64> {
        let mut con = self.connection().await?.clone();
        let key = item.entry_key();
        let (mode, timeout_ms) = encode_mode(item.expiration());
        let payload = self.serializer.serialize(item.value())?;

        let stored: i64 = Script::new(script)
            .key(self.entry_storage_key(&key))
            .key(self.region_index_key(key.region()))
            .key(self.regions_key())
            .arg(payload.as_ref())
            .arg(item.created().timestamp_millis())
            .arg(now.timestamp_millis())
            .arg(mode)
            .arg(timeout_ms)
            .arg(self.expire_millis(item, now))
            .arg(key.region().unwrap_or_default())
            .invoke_async(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(stored)
    }
}

fn parse_number(fields: &HashMap<String, Vec<u8>>, field: &'static str) -> Result<u64, Error> {
    let raw = fields
        .get(field)
        .ok_or(Error::MalformedEntry("missing numeric field"))?;
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(Error::MalformedEntry("unparsable numeric field"))
}

fn parse_timestamp(
    fields: &HashMap<String, Vec<u8>>,
    field: &'static str,
) -> Result<DateTime<Utc>, Error> {
    let millis = parse_number(fields, field)? as i64;
    DateTime::from_timestamp_millis(millis).ok_or(Error::MalformedEntry("timestamp out of range"))
}

fn parse_text(fields: &HashMap<String, Vec<u8>>, field: &'static str) -> Result<String, Error> {
    let raw = fields
        .get(field)
        .ok_or(Error::MalformedEntry("missing text field"))?;
    String::from_utf8(raw.clone()).map_err(|_| Error::MalformedEntry("non-utf8 text field"))
}

#[async_trait]
impl<V, S> CacheHandle<V> for RedisHandle<V, S>
where
    V: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
    S: Serializer,
{
    async fn get(&self, key: &EntryKey) -> HandleResult<Option<CacheItem<V>>> {
        self.stats.record_get(key.region());

        let Some(item) = self.read_entry(key).await? else {
            self.stats.record_miss(key.region());
            return Ok(None);
        };

        let now = Utc::now();
        let touched = item.touched(now);
        if let Expiration::Sliding(timeout) =
            item.expiration().resolve(self.default_expiration)
        {
            // Re-arm the server-side TTL and the access stamp.
            let mut con = self.connection().await?.clone();
            let storage_key = self.entry_storage_key(key);
            redis::pipe()
                .cmd("HSET")
                .arg(&storage_key)
                .arg("a")
                .arg(now.timestamp_millis())
                .ignore()
                .cmd("PEXPIRE")
                .arg(&storage_key)
                .arg(timeout.as_millis() as u64)
                .ignore()
                .query_async::<()>(&mut con)
                .await
                .map_err(Error::from)?;
        }

        self.stats.record_hit(key.region());
        Ok(Some(touched))
    }

    async fn add(&self, item: CacheItem<V>) -> HandleResult<bool> {
        item.expiration()
            .resolve(self.default_expiration)
            .validate()?;
        self.stats.record_add(item.region());

        let now = Utc::now();
        let added = self.write_with(ADD_SCRIPT, &item.touched(now), now).await?;
        if added == 1 {
            self.stats.items_changed(item.region(), 1);
        }
        Ok(added == 1)
    }

    async fn put(&self, item: CacheItem<V>) -> HandleResult<()> {
        item.expiration()
            .resolve(self.default_expiration)
            .validate()?;
        self.stats.record_put(item.region());

        let now = Utc::now();
        let version = self.write_with(PUT_SCRIPT, &item.touched(now), now).await?;
        if version == 1 {
            self.stats.items_changed(item.region(), 1);
        }
        Ok(())
    }

    async fn remove(&self, key: &EntryKey) -> HandleResult<bool> {
        self.stats.record_remove(key.region());

        let mut con = self.connection().await?.clone();
        let removed: i64 = Script::new(REMOVE_SCRIPT)
            .key(self.entry_storage_key(key))
            .key(self.region_index_key(key.region()))
            .invoke_async(&mut con)
            .await
            .map_err(Error::from)?;
        if removed > 0 {
            self.stats.items_changed(key.region(), -1);
        }
        Ok(removed > 0)
    }

    async fn clear(&self) -> HandleResult<()> {
        let mut con = self.connection().await?.clone();
        let regions: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.regions_key())
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;

        for region in regions {
            Script::new(CLEAR_REGION_SCRIPT)
                .key(format!("{}:regions:{}", self.namespace, region))
                .key(self.regions_key())
                .arg(&region)
                .invoke_async::<i64>(&mut con)
                .await
                .map_err(Error::from)?;
        }
        self.stats.record_clear();
        Ok(())
    }

    async fn clear_region(&self, region: &str) -> HandleResult<()> {
        let mut con = self.connection().await?.clone();
        let removed: i64 = Script::new(CLEAR_REGION_SCRIPT)
            .key(self.region_index_key(Some(region)))
            .key(self.regions_key())
            .arg(region)
            .invoke_async(&mut con)
            .await
            .map_err(Error::from)?;
        self.stats.record_clear_region(region, removed.max(0) as u64);
        Ok(())
    }

    async fn expire(&self, key: &EntryKey, expiration: Expiration) -> HandleResult<()> {
        expiration
            .resolve(self.default_expiration)
            .validate()?;
        let Some(current) = self.read_entry(key).await? else {
            return Ok(());
        };

        let now = Utc::now();
        let updated = current.touched(now).with_expiration(expiration)?;
        let (mode, timeout_ms) = encode_mode(expiration);
        let mut con = self.connection().await?.clone();
        Script::new(EXPIRE_SCRIPT)
            .key(self.entry_storage_key(key))
            .arg(mode)
            .arg(timeout_ms)
            .arg(now.timestamp_millis())
            .arg(self.expire_millis(&updated, now))
            .invoke_async::<i64>(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn update(
        &self,
        key: &EntryKey,
        factory: UpdateFn<'_, V>,
        max_retries: u32,
    ) -> HandleResult<UpdateOutcome<V>> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;

            let Some(current) = self.read_entry(key).await? else {
                return Ok(UpdateOutcome::NotFound);
            };
            let Some(new_value) = factory(current.value()) else {
                return Ok(UpdateOutcome::FactoryReturnedNone);
            };

            let now = Utc::now();
            let stored = current
                .with_value(new_value)
                .touched(now)
                .with_version(current.version() + 1);
            let payload = self.serializer.serialize(stored.value())?;

            let mut con = self.connection().await?.clone();
            let result: i64 = Script::new(CAS_SCRIPT)
                .key(self.entry_storage_key(key))
                .arg(current.version())
                .arg(payload.as_ref())
                .arg(stored.version())
                .arg(now.timestamp_millis())
                .arg(self.expire_millis(&stored, now))
                .invoke_async(&mut con)
                .await
                .map_err(Error::from)?;

            match result {
                -1 => return Ok(UpdateOutcome::NotFound),
                -2 => {
                    if attempts > max_retries {
                        trace!(key = %key, attempts, "update retries exhausted");
                        return Ok(UpdateOutcome::RetriesExhausted { attempts });
                    }
                }
                _ => {
                    return Ok(UpdateOutcome::Updated {
                        item: stored,
                        attempts,
                    });
                }
            }
        }
    }

    async fn count(&self) -> HandleResult<u64> {
        let mut con = self.connection().await?.clone();
        let regions: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.regions_key())
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;

        let mut total = 0u64;
        for region in regions {
            let members: i64 = redis::cmd("SCARD")
                .arg(format!("{}:regions:{}", self.namespace, region))
                .query_async(&mut con)
                .await
                .map_err(Error::from)?;
            total += members.max(0) as u64;
        }
        Ok(total)
    }

    fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for creating and configuring a [`RedisHandle`].
///
/// Use [`RedisHandle::builder`] to create a new builder instance.
///
/// # Examples
///
/// ```no_run
/// use strata_handle::JsonSerializer;
/// use strata_redis::RedisHandle;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let handle: RedisHandle<u64, JsonSerializer> = RedisHandle::builder()
///     .server("redis://redis.example.com:6379/0")
///     .name("shared")
///     .namespace("orders")
///     .serializer(JsonSerializer)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedisHandleBuilder<V, S = BincodeSerializer>
where
    S: Serializer,
{
    connection_info: String,
    serializer: S,
    name: SmolStr,
    namespace: SmolStr,
    default_expiration: Expiration,
    stats_enabled: bool,
    _value: PhantomData<fn() -> V>,
}

impl<V> Default for RedisHandleBuilder<V, BincodeSerializer> {
    fn default() -> Self {
        RedisHandleBuilder {
            connection_info: "redis://127.0.0.1/".to_owned(),
            serializer: BincodeSerializer,
            name: SmolStr::new_static("redis"),
            namespace: SmolStr::new_static("strata"),
            default_expiration: Expiration::Never,
            stats_enabled: true,
            _value: PhantomData,
        }
    }
}

impl<V, S> RedisHandleBuilder<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: Serializer,
{
    /// Sets the Redis server connection URL.
    ///
    /// The URL format is
    /// `redis://[<username>][:<password>@]<host>[:<port>][/<database>]`.
    ///
    /// # Default
    ///
    /// `redis://127.0.0.1/`
    pub fn server(mut self, connection_info: impl Into<String>) -> Self {
        self.connection_info = connection_info.into();
        self
    }

    /// Sets the handle name (unique within a manager).
    ///
    /// # Default
    ///
    /// `"redis"`
    pub fn name(mut self, name: impl AsRef<str>) -> Self {
        self.name = SmolStr::new(name.as_ref());
        self
    }

    /// Sets the key namespace prefix, isolating this cache from other users
    /// of the same Redis database.
    ///
    /// # Default
    ///
    /// `"strata"`
    pub fn namespace(mut self, namespace: impl AsRef<str>) -> Self {
        self.namespace = SmolStr::new(namespace.as_ref());
        self
    }

    /// Sets the value serializer.
    ///
    /// # Default
    ///
    /// [`BincodeSerializer`] (compact binary, recommended for production)
    pub fn serializer<NewS>(self, serializer: NewS) -> RedisHandleBuilder<V, NewS>
    where
        NewS: Serializer,
    {
        RedisHandleBuilder {
            connection_info: self.connection_info,
            serializer,
            name: self.name,
            namespace: self.namespace,
            default_expiration: self.default_expiration,
            stats_enabled: self.stats_enabled,
            _value: PhantomData,
        }
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

    /// Builds the handle with the configured settings.
    ///
    /// The actual Redis connection is established lazily on the first
    /// operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Redis`] if the connection URL is invalid and
    /// [`Error::Item`] if the default expiration carries a zero timeout.
    pub fn build(self) -> Result<RedisHandle<V, S>, Error> {
        self.default_expiration.validate()?;
        Ok(RedisHandle {
            client: Client::open(self.connection_info)?,
            connection: OnceCell::new(),
            serializer: self.serializer,
            stats: std::sync::Arc::new(CacheStats::new(&self.name, self.stats_enabled)),
            name: self.name,
            namespace: self.namespace,
            default_expiration: self.default_expiration,
            _value: PhantomData,
        })
    }
}
