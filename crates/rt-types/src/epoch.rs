//! Epoch IDs: a 64-bit causal-scope identifier carrying packed flags:
//! rooted?, category(2), and either {home-node, sequence} (rooted) or
//! {sequence} (collective). Layout, MSB to LSB:
//!
//! ```text
//! bit  63     62..61     60..45          44..0
//!     rooted  category   home-node*      sequence
//! ```
//!
//! `*` only meaningful when `rooted` is set; zero for collective epochs.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

const ROOTED_SHIFT: u64 = 63;
const CATEGORY_SHIFT: u64 = 61;
const CATEGORY_BITS: u64 = 2;
const HOME_NODE_SHIFT: u64 = 45;
const HOME_NODE_BITS: u64 = 16;
const SEQUENCE_BITS: u64 = 45;

const CATEGORY_MASK: u64 = (1 << CATEGORY_BITS) - 1;
const HOME_NODE_MASK: u64 = (1 << HOME_NODE_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Sentinel value meaning "no causal scope".
pub const NO_EPOCH: EpochId = EpochId(u64::MAX);

/// The detection algorithm an epoch uses, encoded in the `category` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u64)]
pub enum EpochCategory {
    /// Four-counter wave algorithm, used for collective epochs.
    FourCounterWave = 0,
    /// Dijkstra–Scholten credit accounting, used for rooted epochs.
    DijkstraScholten = 1,
}

impl EpochCategory {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => Self::FourCounterWave,
            1 => Self::DijkstraScholten,
            other => panic!("unknown epoch category bits: {other}"),
        }
    }
}

/// A 64-bit identifier for a causal scope of related messages.
///
/// Invariants: the home node of a rooted epoch is the
/// unique authority for its termination; for a collective epoch, all
/// nodes participate symmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpochId(pub u64);

impl EpochId {
    /// Construct a rooted epoch id: Dijkstra-Scholten category, home node,
    /// and a sequence number allocated by that home node.
    ///
    /// # Panics
    ///
    /// Panics if `sequence` overflows the 45-bit sequence field — a fatal
    /// resource-exhaustion condition.
    #[must_use]
    pub fn rooted(home_node: NodeId, sequence: u64) -> Self {
        assert!(
            sequence <= SEQUENCE_MASK,
            "epoch sequence overflow: {sequence} > {SEQUENCE_MASK}"
        );
        let mut bits = 1u64 << ROOTED_SHIFT;
        bits |= (EpochCategory::DijkstraScholten as u64 & CATEGORY_MASK) << CATEGORY_SHIFT;
        bits |= (u64::from(home_node.as_u32()) & HOME_NODE_MASK) << HOME_NODE_SHIFT;
        bits |= sequence & SEQUENCE_MASK;
        Self(bits)
    }

    /// Construct a collective epoch id: four-counter category, globally
    /// unique sequence number, no home node.
    ///
    /// # Panics
    ///
    /// Panics if `sequence` overflows the 45-bit sequence field.
    #[must_use]
    pub fn collective(sequence: u64) -> Self {
        assert!(
            sequence <= SEQUENCE_MASK,
            "epoch sequence overflow: {sequence} > {SEQUENCE_MASK}"
        );
        let mut bits = (EpochCategory::FourCounterWave as u64 & CATEGORY_MASK) << CATEGORY_SHIFT;
        bits |= sequence & SEQUENCE_MASK;
        Self(bits)
    }

    #[must_use]
    pub fn is_no_epoch(self) -> bool {
        self == NO_EPOCH
    }

    #[must_use]
    pub fn is_rooted(self) -> bool {
        !self.is_no_epoch() && (self.0 >> ROOTED_SHIFT) & 1 == 1
    }

    #[must_use]
    pub fn category(self) -> EpochCategory {
        EpochCategory::from_bits((self.0 >> CATEGORY_SHIFT) & CATEGORY_MASK)
    }

    /// The home node, valid only when [`Self::is_rooted`].
    #[must_use]
    pub fn home_node(self) -> NodeId {
        NodeId::new(((self.0 >> HOME_NODE_SHIFT) & HOME_NODE_MASK) as u32)
    }

    #[must_use]
    pub fn sequence(self) -> u64 {
        self.0 & SEQUENCE_MASK
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_no_epoch() {
            write!(f, "epoch(none)")
        } else if self.is_rooted() {
            write!(f, "epoch(rooted@{},{})", self.home_node(), self.sequence())
        } else {
            write!(f, "epoch(collective,{})", self.sequence())
        }
    }
}
