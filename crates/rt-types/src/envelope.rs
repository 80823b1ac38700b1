//! The message envelope: a fixed-size header prefixing every active
//! message on the wire. Fields: destination node, handler ID, type bits
//! (put/packed-put/pipe/term/epoch/group/broadcast), reference count,
//! epoch ID, tag, optional group ID, optional trace event. The
//! envelope is trivially copyable and its size is a compile-time
//! constant across all nodes in a run.

use crate::epoch::{EpochId, NO_EPOCH};
use crate::handler::HandlerId;
use crate::node::{NodeId, UNINITIALIZED_NODE};
use serde::{Deserialize, Serialize};

/// Bit flags describing what kind of message this envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvelopeTypeBits {
    pub put: bool,
    pub packed_put: bool,
    pub pipe: bool,
    pub term: bool,
    pub epoch: bool,
    pub group: bool,
    pub broadcast: bool,
}

/// A 32-bit wire tag disambiguating concurrent conversations between the
/// same sender/receiver pair (e.g. RDMA request/response correlation).
pub type Tag = u32;
pub const NO_TAG: Tag = 0;

/// A monotonic event identifier for a local send, used by
/// [`crate::wire`] consumers to attach completion continuations.
pub type TraceEvent = u64;

/// The fixed-size header prefixing every active message.
///
/// Trivially copyable: every field is a plain value, no heap pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub dest: NodeId,
    pub handler: HandlerId,
    pub type_bits: EnvelopeTypeBits,
    pub ref_count: u32,
    pub epoch: EpochId,
    pub tag: Tag,
    pub group: Option<u64>,
    pub trace_event: Option<TraceEvent>,
    /// Root of the spanning-tree broadcast this envelope belongs to, if
    /// any. Carried unchanged across every relay hop so each receiving
    /// node can compute its own `children(this_node, bcast_root, N)`
    ///. `None` for
    /// ordinary point-to-point and group sends.
    pub bcast_root: Option<NodeId>,
}

impl Envelope {
    #[must_use]
    pub fn new(dest: NodeId, handler: HandlerId) -> Self {
        Self {
            dest,
            handler,
            type_bits: EnvelopeTypeBits::default(),
            ref_count: 1,
            epoch: NO_EPOCH,
            tag: NO_TAG,
            group: None,
            trace_event: None,
            bcast_root: None,
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.dest != UNINITIALIZED_NODE
    }

    #[must_use]
    pub fn with_epoch(mut self, epoch: EpochId) -> Self {
        self.epoch = epoch;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = tag;
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: u64) -> Self {
        self.group = Some(group);
        self.type_bits.group = true;
        self
    }

    #[must_use]
    pub fn as_broadcast(mut self, root: NodeId) -> Self {
        self.type_bits.broadcast = true;
        self.bcast_root = Some(root);
        self
    }

    /// Whether this envelope participates in termination accounting.
    /// `no_epoch` messages are never counted.
    #[must_use]
    pub fn is_epoch_tracked(&self) -> bool {
        !self.epoch.is_no_epoch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_envelope_is_untracked_until_stamped() {
        let env = Envelope::new(NodeId::new(2), HandlerId(0));
        assert!(!env.is_epoch_tracked());
        let stamped = env.with_epoch(EpochId::collective(1));
        assert!(stamped.is_epoch_tracked());
    }

    #[test]
    fn envelope_is_copy() {
        fn assert_copy<T: Copy>() {}
        assert_copy::<Envelope>();
    }
}
