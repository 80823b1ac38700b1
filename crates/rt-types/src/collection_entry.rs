//! Collection entry and location-record data shapes.

use crate::index::Index;
use crate::node::NodeId;
use crate::proxy::VirtualProxy;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Lifecycle state of a [`CollectionEntryMeta`].
///
/// "While an entry is in transit, messages to that index are buffered at
/// the last known node; the location service replays them on arrival."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryLifecycle {
    Resident,
    InTransit,
    Destroyed,
}

/// Bookkeeping the collection manager keeps per element, separate from
/// the element payload itself (which is owned by an arena in
/// `rt-collection`; migration serializes the slot, not the pointer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionEntryMeta {
    pub index: Index,
    pub proxy: VirtualProxy,
    pub migratable: bool,
    pub lifecycle: EntryLifecycle,
    /// Messages buffered while the entry is in transit, replayed in order
    /// on arrival at the new home.
    pub buffered: VecDeque<Vec<u8>>,
}

impl CollectionEntryMeta {
    #[must_use]
    pub fn new(index: Index, proxy: VirtualProxy, migratable: bool) -> Self {
        Self {
            index,
            proxy,
            migratable,
            lifecycle: EntryLifecycle::Resident,
            buffered: VecDeque::new(),
        }
    }
}

/// For each registered entity ID, at most one node holds the *home*
/// record; any node that has ever resolved the entity may hold a *cache*
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationRecord {
    /// This node is the authoritative home; `current` is the latest
    /// known owner (may equal the home node itself, or a forward target
    /// after migration).
    Home { current: NodeId },
    /// A soft, possibly-stale cache of a remote lookup.
    Cache { node: NodeId },
    /// The entity used to live here but has migrated away; forward
    /// lookups/deliveries to `forward_to`.
    Forward { forward_to: NodeId },
}
