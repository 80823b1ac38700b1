//! The message engine: `send`, `broadcast`,
//! `send_in_group`, `send_sized`, `post_continuation`, built as methods on
//! [`Engine`] since both components share the ready queue and ambient
//! epoch stack.

use crate::scheduler::Engine;
use rt_types::{children as tree_children, Envelope, GroupId, HandlerId, NodeId, Payload};
use serde::{Deserialize, Serialize};

/// The on-wire shape of every active message: the fixed-size envelope
/// header plus the already-packed payload bytes.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    envelope: Envelope,
    payload: Vec<u8>,
}

pub(crate) fn decode_wire_message(bytes: &[u8]) -> Result<(Envelope, Vec<u8>), rt_types::WireError> {
    let msg: WireMessage = bincode::deserialize(bytes).map_err(rt_types::WireError::Encode)?;
    Ok((msg.envelope, msg.payload))
}

fn encode_wire_message(envelope: Envelope, payload: Vec<u8>) -> Vec<u8> {
    bincode::serialize(&WireMessage { envelope, payload }).expect("envelope/payload encoding cannot fail")
}

impl Engine {
    /// Stamp `envelope` with the ambient epoch if it doesn't already carry
    /// one, and bump that epoch's local producer count.
    fn stamp_and_account(&self, mut envelope: Envelope) -> Envelope {
        if envelope.epoch.is_no_epoch() {
            envelope = envelope.with_epoch(self.ambient_epoch());
        }
        if envelope.is_epoch_tracked() {
            self.accounting().record_produced(envelope.epoch);
        }
        envelope
    }

    /// Ship `envelope` + `payload` to `envelope.dest`: dispatch inline if
    /// that's this node, otherwise post to the transport
    ///. Returns a completion event
    /// usable with [`Engine::post_continuation`].
    fn transmit(&self, envelope: Envelope, payload: Vec<u8>) -> u64 {
        let event = self.alloc_event();
        rt_telemetry::MESSAGES_SENT.inc();
        if envelope.dest == self.this_node() {
            self.push_ready(crate::scheduler::WorkUnit {
                envelope,
                payload,
                from_node: self.this_node(),
            });
            self.mark_event_completed(event);
            return event;
        }

        let bytes = encode_wire_message(envelope, payload);
        let handle = self
            .transport()
            .post_send(envelope.dest, envelope.tag, bytes)
            .unwrap_or_else(|e| panic!("transport send to {} failed: {e}", envelope.dest));
        if self.transport().send_completed(handle) {
            self.mark_event_completed(event);
        }
        event
    }

    /// Point-to-point active message.
    pub fn send<T: Payload>(&self, dest: NodeId, handler: HandlerId, msg: &T) -> u64 {
        let envelope = self.stamp_and_account(Envelope::new(dest, handler));
        let payload = msg.pack().expect("payload serialization cannot fail for in-process transports");
        self.transmit(envelope, payload)
    }

    /// Explicit-size variant for messages with trailing, separately-sized
    /// data, e.g. an RDMA get reply shipping its result
    /// buffer after a small typed header.
    pub fn send_sized<T: Payload>(&self, dest: NodeId, handler: HandlerId, header: &T, trailing: &[u8]) -> u64 {
        let envelope = self.stamp_and_account(Envelope::new(dest, handler));
        let mut payload = header.pack().expect("payload serialization cannot fail for in-process transports");
        payload.extend_from_slice(trailing);
        self.transmit(envelope, payload)
    }

    /// Multicast to an explicit set of targets, used by group-scoped
    /// fan-out in `rt-collection`/`rt-reduce`/`rt-epoch` (a previously
    /// constructed group's own tree, or the epoch manager's own
    /// hop-by-hop wave relay). Every hop is itself a send and is counted
    /// for termination. Not used for whole-job
    /// broadcast — see [`Self::broadcast`], which carries a
    /// `bcast_root` so the scheduler can keep relaying it down the
    /// spanning tree on its own.
    pub fn multicast<T: Payload>(
        &self,
        targets: &[NodeId],
        handler: HandlerId,
        msg: &T,
        group: Option<GroupId>,
    ) -> Vec<u64> {
        let payload = msg.pack().expect("payload serialization cannot fail for in-process transports");
        targets
            .iter()
            .map(|&target| {
                let mut envelope = Envelope::new(target, handler);
                if let Some(g) = group {
                    envelope = envelope.with_group(g.0);
                }
                let envelope = self.stamp_and_account(envelope);
                self.transmit(envelope, payload.clone())
            })
            .collect()
    }

    /// Fan out over the whole-job binomial spanning tree, rooted at this
    /// node. Each envelope carries the root, so the
    /// scheduler re-forwards it to the recipient's own children on
    /// dispatch (`crate::scheduler::Engine::dispatch_unit`) — the
    /// fan-out is not this one hop, it's the whole tree.
    pub fn broadcast<T: Payload>(&self, handler: HandlerId, msg: &T) -> Vec<u64> {
        rt_telemetry::BROADCASTS_SENT.inc();
        let root = self.this_node();
        let payload = msg.pack().expect("payload serialization cannot fail for in-process transports");
        self.broadcast_hop(root, handler, &payload)
    }

    /// Send one hop of a spanning-tree broadcast: to `root`'s (or a
    /// relaying node's) children, with `root` carried along so each of
    /// them can compute its own children in turn. Used both by
    /// [`Self::broadcast`] (the first hop) and by
    /// `crate::scheduler::Engine::dispatch_unit` (every relay hop).
    pub(crate) fn broadcast_hop(&self, root: NodeId, handler: HandlerId, payload: &[u8]) -> Vec<u64> {
        let targets = tree_children(self.this_node(), root, self.num_nodes());
        targets
            .into_iter()
            .map(|target| {
                let envelope = Envelope::new(target, handler).as_broadcast(root);
                let envelope = self.stamp_and_account(envelope);
                self.transmit(envelope, payload.to_vec())
            })
            .collect()
    }

    /// Multicast over a previously constructed group's tree
    ///. The tree shape itself is owned by the group
    /// registry in `rt-collection`/`rt-reduce`; this is the primitive they
    /// build on.
    pub fn send_in_group<T: Payload>(&self, group: GroupId, targets: &[NodeId], handler: HandlerId, msg: &T) -> Vec<u64> {
        self.multicast(targets, handler, msg, Some(group))
    }
}
