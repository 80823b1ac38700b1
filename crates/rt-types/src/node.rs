//! The node identifier: a small integer in `0..num_nodes`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A process in the fixed job: a small integer `0..N`
/// identifying a process in the fixed job. `N` never changes
/// during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Sentinel for "no node" / "uninitialized destination" fields in packed
/// tokens.
pub const UNINITIALIZED_NODE: NodeId = NodeId(u32::MAX);

impl NodeId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_uninitialized(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// The fixed size of the job: total number of nodes, `N`.
///
/// Stored as a plain value rather than a global: the ambient epoch stack
/// (and by extension all process-wide counts) is a property of the
/// runtime context, not of a process-wide variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumNodes(pub u32);

impl NumNodes {
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// `3 * log2(N)`, the default hop-cap for location lookups.
    #[must_use]
    pub fn default_hop_cap(self) -> u32 {
        let n = self.0.max(2);
        let log2_n = u32::BITS - (n - 1).leading_zeros();
        (3 * log2_n).max(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_round_trips() {
        assert!(UNINITIALIZED_NODE.is_uninitialized());
        assert!(!NodeId::new(0).is_uninitialized());
    }

    #[test]
    fn hop_cap_grows_with_log_n() {
        assert_eq!(NumNodes(4).default_hop_cap(), 6);
        assert_eq!(NumNodes(1024).default_hop_cap(), 30);
    }
}
