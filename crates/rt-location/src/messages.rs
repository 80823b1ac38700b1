//! Wire messages the location manager's own protocol handlers exchange:
//! lookups (with hop-capped chasing), replies, and migration notifications
//! to the home node. Plain [`rt_types::Payload`] types like any user
//! message — the location manager just happens to be their sender and
//! handler, the same convention `rt-epoch::messages` uses.

use rt_types::{NodeId, VirtualProxy};
use serde::{Deserialize, Serialize};

/// A resolution request, forwarded along the chain of prior owners until
/// it reaches whoever currently holds the entity. `hops` is incremented on every forward and checked against the
/// node's configured cap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct LookupRequest {
    pub(crate) proxy: VirtualProxy,
    pub(crate) requester: NodeId,
    pub(crate) ask_serial: u64,
    pub(crate) hops: u32,
}

/// The current owner's answer, sent directly back to the original
/// requester (never relayed through the chain that was chased).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct LookupReply {
    pub(crate) proxy: VirtualProxy,
    pub(crate) ask_serial: u64,
    pub(crate) owner: NodeId,
}

/// Sent by a migrating owner to the entity's home node so the
/// authoritative record stays current.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct MigrationNotify {
    pub(crate) proxy: VirtualProxy,
    pub(crate) new_owner: NodeId,
}
