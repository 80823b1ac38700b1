//! Reduction state shape, keyed by `(group, id)`.

use serde::{Deserialize, Serialize};

/// A group identifier: the default group (all nodes, binomial tree) or a
/// named subset with its own tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u64);

/// The whole-job default group.
pub const DEFAULT_GROUP: GroupId = GroupId(0);

/// A reduction identifier, unique per contribution round within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReductionId(pub u64);

/// Lifecycle phase of a reduction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionPhase {
    Init,
    Accumulating,
    Forwarded,
    Delivered,
}
