//! Binomial spanning-tree topology shared by broadcast fan-out and spanning-tree reduction: "children are
//! `2*this+1` and `2*this+2` bounded to N; parent is `(this-1)/2`; root is
//! 0 unless the broadcast is scoped to a group, which overrides the tree."
//!
//! Pure index arithmetic with no manager state, so both the message engine
//! (broadcast) and the reduction manager (spanning-tree combine) depend on
//! this single definition instead of maintaining two copies of the shape.

use crate::node::{NodeId, NumNodes};

/// The default whole-job root: node 0.
#[must_use]
pub const fn default_root() -> NodeId {
    NodeId(0)
}

/// This node's children in the binomial tree rooted at `root`, bounded to
/// `num_nodes`. The tree is always shaped relative to node 0; `root`
/// merely relabels which node plays the role of node 0 (rank rotation),
/// matching a sender-rooted broadcast where any node may initiate.
#[must_use]
pub fn children(this: NodeId, root: NodeId, num_nodes: NumNodes) -> Vec<NodeId> {
    let n = num_nodes.get();
    let rel = relative_rank(this, root, n);
    let mut out = Vec::with_capacity(2);
    for child_rel in [2 * rel + 1, 2 * rel + 2] {
        if child_rel < n {
            out.push(absolute_rank(child_rel, root, n));
        }
    }
    out
}

/// This node's parent in the binomial tree rooted at `root`, or `None` if
/// `this == root`.
#[must_use]
pub fn parent(this: NodeId, root: NodeId, num_nodes: NumNodes) -> Option<NodeId> {
    let n = num_nodes.get();
    let rel = relative_rank(this, root, n);
    if rel == 0 {
        return None;
    }
    let parent_rel = (rel - 1) / 2;
    Some(absolute_rank(parent_rel, root, n))
}

fn relative_rank(node: NodeId, root: NodeId, n: u32) -> u32 {
    (node.as_u32() + n - root.as_u32()) % n
}

fn absolute_rank(rel: u32, root: NodeId, n: u32) -> NodeId {
    NodeId::new((rel + root.as_u32()) % n)
}
