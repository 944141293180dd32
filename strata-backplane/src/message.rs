//! Invalidation messages exchanged over a backplane channel.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use strata_core::EntryKey;

/// A coherency operation broadcast to peer nodes.
///
/// Subscribers translate each operation into the idempotent inverse on
/// their local tiers: `Changed` and `Removed` evict the entry, `Cleared`
/// and `ClearedRegion` drop the affected namespace. `Changed` deliberately
/// maps to a local remove rather than a local write, so duplicated or
/// reordered deliveries cannot resurrect stale data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BackplaneOp {
    /// An entry was written (added, put or updated) on the origin node.
    Changed {
        /// Identity of the written entry.
        key: EntryKey,
    },
    /// An entry was removed on the origin node.
    Removed {
        /// Identity of the removed entry.
        key: EntryKey,
    },
    /// The origin node cleared the whole cache.
    Cleared,
    /// The origin node cleared one region.
    ClearedRegion {
        /// The cleared region.
        region: SmolStr,
    },
}

impl BackplaneOp {
    /// Change notification for the given entry.
    pub fn changed(key: EntryKey) -> Self {
        BackplaneOp::Changed { key }
    }

    /// Removal notification for the given entry.
    pub fn removed(key: EntryKey) -> Self {
        BackplaneOp::Removed { key }
    }

    /// Region-clear notification.
    pub fn cleared_region(region: impl AsRef<str>) -> Self {
        BackplaneOp::ClearedRegion {
            region: SmolStr::new(region.as_ref()),
        }
    }
}

/// One message on the wire: the operation plus the originator identity.
///
/// The sender id is an opaque per-instance identifier; transports use it to
/// suppress loopback so a node never re-applies its own operations. The
/// channel name is part of the transport address, not the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackplaneMessage {
    /// Identity of the publishing backplane instance.
    pub sender: SmolStr,
    /// The coherency operation.
    pub op: BackplaneOp,
}
