//! The backplane contract.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BackplaneResult;
use crate::message::BackplaneOp;

/// A shared, dynamically dispatched backplane.
pub type SharedBackplane = Arc<dyn Backplane>;

/// A pub/sub coordination channel between cache nodes.
///
/// Publishing stamps the message with this instance's [`node_id`]; the
/// transport is responsible for loopback suppression, so a subscription
/// never yields operations this instance published itself.
///
/// Subscriptions are single-consumer queues rather than multicast
/// callbacks: each call to [`subscribe`] returns an independent receiver
/// that one task drains. Handlers must stay lightweight and idempotent —
/// delivery is best-effort and messages may be duplicated or dropped.
///
/// [`node_id`]: Backplane::node_id
/// [`subscribe`]: Backplane::subscribe
#[async_trait]
pub trait Backplane: Send + Sync {
    /// Opaque identity of this backplane instance, used for loopback
    /// suppression.
    fn node_id(&self) -> &str;

    /// Broadcasts an operation to peer nodes on the channel.
    async fn publish(&self, op: BackplaneOp) -> BackplaneResult<()>;

    /// Opens a subscription yielding operations published by *other* nodes.
    async fn subscribe(&self) -> BackplaneResult<mpsc::Receiver<BackplaneOp>>;
}

#[async_trait]
impl Backplane for SharedBackplane {
    fn node_id(&self) -> &str {
        (**self).node_id()
    }

    async fn publish(&self, op: BackplaneOp) -> BackplaneResult<()> {
        (**self).publish(op).await
    }

    async fn subscribe(&self) -> BackplaneResult<mpsc::Receiver<BackplaneOp>> {
        (**self).subscribe().await
    }
}
