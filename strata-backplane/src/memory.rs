//! In-process backplane over named broadcast channels.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use lazy_static::lazy_static;
use smol_str::SmolStr;
use tokio::sync::{broadcast, mpsc};
use tracing::{trace, warn};

use crate::backplane::Backplane;
use crate::error::BackplaneResult;
use crate::message::{BackplaneMessage, BackplaneOp};

/// Broadcast buffer per channel; subscribers that fall further behind lag
/// and drop messages, which best-effort delivery permits.
const CHANNEL_CAPACITY: usize = 256;

/// Forwarding buffer per subscription.
const SUBSCRIPTION_CAPACITY: usize = 64;

lazy_static! {
    /// Process-global registry of named channels, so every backplane
    /// instance attached to the same name shares one broadcast domain.
    static ref CHANNELS: DashMap<SmolStr, broadcast::Sender<BackplaneMessage>> = DashMap::new();
}

static NODE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Backplane connecting cache managers within a single process.
///
/// Instances attached to the same channel name see each other's messages;
/// distinct channel names are fully isolated. This is the transport used by
/// single-process deployments that run several managers over one shared
/// tier, and by tests exercising cross-manager coherency.
///
/// # Example
///
/// ```
/// use strata_backplane::InProcessBackplane;
///
/// let a = InProcessBackplane::attach("orders");
/// let b = InProcessBackplane::attach("orders");
/// assert_ne!(a.node_id(), b.node_id());
/// ```
pub struct InProcessBackplane {
    channel: SmolStr,
    node_id: SmolStr,
    sender: broadcast::Sender<BackplaneMessage>,
}

impl InProcessBackplane {
    /// Attaches a new backplane instance to the named channel.
    ///
    /// The channel is created on first attach and lives for the process
    /// lifetime.
    pub fn attach(channel: impl AsRef<str>) -> Self {
        let channel = SmolStr::new(channel.as_ref());
        let sender = CHANNELS
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        let node_id = SmolStr::new(format!(
            "{}-{}",
            std::process::id(),
            NODE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        InProcessBackplane {
            channel,
            node_id,
            sender,
        }
    }

    /// The channel name this instance is attached to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Public node-id accessor for non-trait callers.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

#[async_trait]
impl Backplane for InProcessBackplane {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn publish(&self, op: BackplaneOp) -> BackplaneResult<()> {
        trace!(channel = %self.channel, node = %self.node_id, ?op, "publish");
        // A send error only means nobody is subscribed right now.
        let _ = self.sender.send(BackplaneMessage {
            sender: self.node_id.clone(),
            op,
        });
        Ok(())
    }

    async fn subscribe(&self) -> BackplaneResult<mpsc::Receiver<BackplaneOp>> {
        let mut source = self.sender.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let own_id = self.node_id.clone();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(message) => {
                        if message.sender == own_id {
                            continue;
                        }
                        if tx.send(message.op).await.is_err() {
                            // Subscriber dropped its receiver.
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(channel = %channel, missed, "backplane subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::EntryKey;

    fn changed(key: &str) -> BackplaneOp {
        BackplaneOp::changed(EntryKey::new(key).unwrap())
    }

    #[tokio::test]
    async fn delivers_to_peers_on_the_same_channel() {
        let a = InProcessBackplane::attach("test-peers");
        let b = InProcessBackplane::attach("test-peers");

        let mut events = b.subscribe().await.unwrap();
        a.publish(changed("k")).await.unwrap();

        assert_eq!(events.recv().await, Some(changed("k")));
    }

    #[tokio::test]
    async fn suppresses_loopback() {
        let a = InProcessBackplane::attach("test-loopback");
        let b = InProcessBackplane::attach("test-loopback");

        let mut own = a.subscribe().await.unwrap();
        a.publish(changed("mine")).await.unwrap();
        b.publish(changed("theirs")).await.unwrap();

        // The subscriber sees only the peer's message.
        assert_eq!(own.recv().await, Some(changed("theirs")));
        assert!(own.try_recv().is_err());
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let a = InProcessBackplane::attach("test-iso-1");
        let b = InProcessBackplane::attach("test-iso-2");
        let c = InProcessBackplane::attach("test-iso-2");

        let mut events = c.subscribe().await.unwrap();
        a.publish(BackplaneOp::Cleared).await.unwrap();
        b.publish(changed("k")).await.unwrap();

        assert_eq!(events.recv().await, Some(changed("k")));
        assert!(events.try_recv().is_err());
    }
}
