//! Wire shapes for the collection manager's own handlers. The payload
//! bytes inside each are the user's already-packed message/element type;
//! the manager only needs to know enough to route and buffer correctly.

use rt_types::{Index, VirtualProxy};
use serde::{Deserialize, Serialize};

/// A per-element send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionMessage {
    pub(crate) index: Index,
    pub(crate) bytes: Vec<u8>,
}

/// A broadcast fanned out over the node spanning tree; delivered to every
/// locally-owned element on arrival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionBroadcast {
    pub(crate) bytes: Vec<u8>,
}

/// State transfer for a migrating element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionMigrate {
    pub(crate) index: Index,
    pub(crate) proxy: VirtualProxy,
    pub(crate) bytes: Vec<u8>,
}
