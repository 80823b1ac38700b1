//! Virtual proxies: 64-bit identifiers for a virtual entity bound to a
//! node. Packed: {is-collection?, is-migratable?, is-remote?,
//! home-node, identifier}. The bits determine the routing rule;
//! once assigned, only `home-node` may change via location
//! updates, never by message receipt. Layout, MSB to LSB:
//!
//! ```text
//! bit  63            62             61          60..45     44..0
//!     is-collection  is-migratable  is-remote   home-node  identifier
//! ```

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

const IS_COLLECTION_SHIFT: u64 = 63;
const IS_MIGRATABLE_SHIFT: u64 = 62;
const IS_REMOTE_SHIFT: u64 = 61;
const HOME_NODE_SHIFT: u64 = 45;
const HOME_NODE_BITS: u64 = 16;
const IDENTIFIER_BITS: u64 = 45;

const HOME_NODE_MASK: u64 = (1 << HOME_NODE_BITS) - 1;
const IDENTIFIER_MASK: u64 = (1 << IDENTIFIER_BITS) - 1;

/// Construction-time description of a [`VirtualProxy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyFields {
    pub is_collection: bool,
    pub is_migratable: bool,
    pub is_remote: bool,
    pub home_node: NodeId,
    pub identifier: u64,
}

/// A 64-bit identifier for a virtual entity (virtual context or collection
/// element) bound to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VirtualProxy(pub u64);

impl VirtualProxy {
    /// # Panics
    ///
    /// Panics if `home_node` or `identifier` overflow their bit widths.
    #[must_use]
    pub fn pack(fields: ProxyFields) -> Self {
        assert!(
            u64::from(fields.home_node.as_u32()) <= HOME_NODE_MASK,
            "home node overflows proxy bits"
        );
        assert!(
            fields.identifier <= IDENTIFIER_MASK,
            "identifier overflows proxy bits"
        );

        let mut bits = 0u64;
        bits |= u64::from(fields.is_collection) << IS_COLLECTION_SHIFT;
        bits |= u64::from(fields.is_migratable) << IS_MIGRATABLE_SHIFT;
        bits |= u64::from(fields.is_remote) << IS_REMOTE_SHIFT;
        bits |= (u64::from(fields.home_node.as_u32()) & HOME_NODE_MASK) << HOME_NODE_SHIFT;
        bits |= fields.identifier & IDENTIFIER_MASK;
        Self(bits)
    }

    #[must_use]
    pub fn unpack(self) -> ProxyFields {
        ProxyFields {
            is_collection: (self.0 >> IS_COLLECTION_SHIFT) & 1 == 1,
            is_migratable: (self.0 >> IS_MIGRATABLE_SHIFT) & 1 == 1,
            is_remote: (self.0 >> IS_REMOTE_SHIFT) & 1 == 1,
            home_node: self.home_node(),
            identifier: self.identifier(),
        }
    }

    #[must_use]
    pub fn is_collection(self) -> bool {
        (self.0 >> IS_COLLECTION_SHIFT) & 1 == 1
    }

    #[must_use]
    pub fn is_migratable(self) -> bool {
        (self.0 >> IS_MIGRATABLE_SHIFT) & 1 == 1
    }

    #[must_use]
    pub fn is_remote(self) -> bool {
        (self.0 >> IS_REMOTE_SHIFT) & 1 == 1
    }

    #[must_use]
    pub fn home_node(self) -> NodeId {
        NodeId::new(((self.0 >> HOME_NODE_SHIFT) & HOME_NODE_MASK) as u32)
    }

    #[must_use]
    pub fn identifier(self) -> u64 {
        self.0 & IDENTIFIER_MASK
    }

    /// Rebind the home node after a migration. This is the *only* legal
    /// way the home-node bits may change — never as a side effect of
    /// receiving a message.
    #[must_use]
    pub fn with_home_node(self, new_home: NodeId) -> Self {
        let cleared = self.0 & !(HOME_NODE_MASK << HOME_NODE_SHIFT);
        Self(cleared | ((u64::from(new_home.as_u32()) & HOME_NODE_MASK) << HOME_NODE_SHIFT))
    }
}

impl fmt::Display for VirtualProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "proxy(home={},id={},coll={})",
            self.home_node(),
            self.identifier(),
            self.is_collection()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let fields = ProxyFields {
            is_collection: true,
            is_migratable: true,
            is_remote: false,
            home_node: NodeId::new(3),
            identifier: 777,
        };
        let p = VirtualProxy::pack(fields);
        assert_eq!(p.unpack(), fields);
    }

    #[test]
    fn with_home_node_changes_only_home_bits() {
        let p = VirtualProxy::pack(ProxyFields {
            is_collection: false,
            is_migratable: true,
            is_remote: true,
            home_node: NodeId::new(1),
            identifier: 42,
        });
        let moved = p.with_home_node(NodeId::new(9));
        assert_eq!(moved.home_node(), NodeId::new(9));
        assert_eq!(moved.identifier(), p.identifier());
        assert_eq!(moved.is_collection(), p.is_collection());
        assert_eq!(moved.is_migratable(), p.is_migratable());
        assert_eq!(moved.is_remote(), p.is_remote());
    }
}
