//! Redis pub/sub backplane implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use redis::{Client, aio::ConnectionManager};
use smol_str::SmolStr;
use tokio::sync::{OnceCell, mpsc};
use tracing::{trace, warn};

use strata_backplane::{Backplane, BackplaneError, BackplaneMessage, BackplaneOp, BackplaneResult};

use crate::error::Error;

/// Forwarding buffer per subscription.
const SUBSCRIPTION_CAPACITY: usize = 64;

static NODE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn encode(message: &BackplaneMessage) -> BackplaneResult<Vec<u8>> {
    bincode::serde::encode_to_vec(message, bincode::config::standard())
        .map_err(|e| BackplaneError::Codec(Box::new(e)))
}

fn decode(payload: &[u8]) -> BackplaneResult<BackplaneMessage> {
    bincode::serde::decode_from_slice(payload, bincode::config::standard())
        .map(|(message, _)| message)
        .map_err(|e| BackplaneError::Codec(Box::new(e)))
}

/// Coherency backplane over Redis pub/sub.
///
/// Every instance publishes bincode-encoded invalidation messages on the
/// configured channel and stamps them with its own node identity;
/// subscriptions drop messages carrying the local identity, so a node never
/// re-applies its own operations. Delivery inherits Redis pub/sub semantics:
/// best-effort, per-channel FIFO, no replay for absent subscribers.
///
/// # Examples
///
/// ```no_run
/// use strata_redis::RedisBackplane;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backplane = RedisBackplane::builder()
///     .server("redis://localhost:6379/")
///     .channel("strata-orders")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedisBackplane {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    channel: SmolStr,
    node_id: SmolStr,
}

impl RedisBackplane {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn builder() -> RedisBackplaneBuilder {
        RedisBackplaneBuilder::default()
    }

    /// The pub/sub channel this backplane is attached to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    async fn connection(&self) -> Result<&ConnectionManager, Error> {
        self.connection
            .get_or_try_init(|| {
                trace!("initialize new redis connection manager");
                self.client.get_connection_manager()
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl Backplane for RedisBackplane {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn publish(&self, op: BackplaneOp) -> BackplaneResult<()> {
        trace!(channel = %self.channel, node = %self.node_id, ?op, "publish");
        let payload = encode(&BackplaneMessage {
            sender: self.node_id.clone(),
            op,
        })?;
        let mut con = self.connection().await?.clone();
        redis::cmd("PUBLISH")
            .arg(&*self.channel)
            .arg(payload)
            .query_async::<()>(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn subscribe(&self) -> BackplaneResult<mpsc::Receiver<BackplaneOp>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(Error::from)?;
        pubsub
            .subscribe(&*self.channel)
            .await
            .map_err(Error::from)?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let own_id = self.node_id.clone();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(message) = stream.next().await {
                let decoded = match decode(message.get_payload_bytes()) {
                    Ok(decoded) => decoded,
                    Err(error) => {
                        warn!(channel = %channel, %error, "dropping malformed backplane message");
                        continue;
                    }
                };
                if decoded.sender == own_id {
                    continue;
                }
                if tx.send(decoded.op).await.is_err() {
                    // Subscriber dropped its receiver.
                    break;
                }
            }
            trace!(channel = %channel, "backplane subscription ended");
        });
        Ok(rx)
    }
}

/// Builder for creating and configuring a [`RedisBackplane`].
pub struct RedisBackplaneBuilder {
    connection_info: String,
    channel: SmolStr,
}

impl Default for RedisBackplaneBuilder {
    fn default() -> Self {
        RedisBackplaneBuilder {
            connection_info: "redis://127.0.0.1/".to_owned(),
            channel: SmolStr::new_static("strata"),
        }
    }
}

impl RedisBackplaneBuilder {
    /// Sets the Redis server connection URL.
    ///
    /// # Default
    ///
    /// `redis://127.0.0.1/`
    pub fn server(mut self, connection_info: impl Into<String>) -> Self {
        self.connection_info = connection_info.into();
        self
    }

    /// Sets the pub/sub channel name.
    ///
    /// Managers that should invalidate each other must share the channel.
    ///
    /// # Default
    ///
    /// `"strata"`
    pub fn channel(mut self, channel: impl AsRef<str>) -> Self {
        self.channel = SmolStr::new(channel.as_ref());
        self
    }

    /// Builds the backplane with the configured settings.
    ///
    /// The publish connection is established lazily on first use; the
    /// subscription connection is opened per [`subscribe`] call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Redis`] if the connection URL is invalid.
    ///
    /// [`subscribe`]: strata_backplane::Backplane::subscribe
    pub fn build(self) -> Result<RedisBackplane, Error> {
        let node_id = SmolStr::new(format!(
            "{}-{}-{}",
            std::process::id(),
            Utc::now().timestamp_millis(),
            NODE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        Ok(RedisBackplane {
            client: Client::open(self.connection_info)?,
            connection: OnceCell::new(),
            channel: self.channel,
            node_id,
        })
    }
}
