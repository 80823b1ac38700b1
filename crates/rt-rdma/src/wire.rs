//! Wire shapes for the message-based half of the RDMA manager (`get`/
//! `put` against a registered handle, as opposed to the window-based
//! channel half in [`crate::channel`]): [`GetRequest`], a
//! [`GetReplyHeader`]/[`PutRequestHeader`] pair for the data-bearing
//! replies, and [`PutAck`] for put completion. Carried over `rt-transport`'s point-to-point
//! send, as active messages, rather than literal MPI two-sided sends —
//! the runtime already treats the transport as a black box.

use rt_types::{NodeId, RdmaHandle, Tag, WireError};
use serde::{Deserialize, Serialize};

/// "op, requesting node, handle, bytes, offset": a get request routed
/// to whichever node actually owns the requested slice (the handle's
/// home for a non-collective handle, `routed_node` for a collective
/// one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GetRequest {
    pub(crate) handle: RdmaHandle,
    pub(crate) requester: NodeId,
    pub(crate) routed_node: NodeId,
    pub(crate) bytes: usize,
    pub(crate) offset: usize,
    pub(crate) tag: Tag,
}

/// Fixed-width header for a get reply; the requested bytes travel as
/// unframed trailing data appended by [`rt_engine::Engine::send_sized`]
/// rather than embedded as a `Vec<u8>` field — a get reply's
/// payload is large and arbitrary enough that a second `bincode`
/// framing layer around it is wasted work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GetReplyHeader {
    pub(crate) tag: Tag,
}

/// Header for a put request; the bytes to absorb travel as trailing
/// data the same way a get reply's do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PutRequestHeader {
    pub(crate) handle: RdmaHandle,
    pub(crate) requester: NodeId,
    pub(crate) routed_node: NodeId,
    pub(crate) offset: usize,
    pub(crate) tag: Tag,
}

/// `RDMAOpFinishedMessage`/`PutBackMessage`: acknowledges a put so the
/// requester's continuation can fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PutAck {
    pub(crate) tag: Tag,
}

/// Channel control messages. The
/// non-target always initiates; the target owns the backing window.
/// Which direction a channel carries traffic in. Public: callers name it
/// when acquiring a channel's lock directly ([`crate::RdmaManager::lock`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOp {
    Put,
    Get,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CreateChannel {
    pub(crate) serial: u64,
    pub(crate) requester: NodeId,
    pub(crate) op: ChannelOp,
    pub(crate) window_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChannelReady {
    pub(crate) serial: u64,
    pub(crate) window_id: u64,
}

/// Split a `header.pack() + trailing` payload (the wire shape
/// [`rt_engine::Engine::send_sized`] produces) back into its typed
/// header and raw trailing bytes. Uses a streaming `bincode` reader so
/// the header's encoded length need not be known up front — unlike a
/// plain [`rt_types::Payload`] round trip, which decodes the whole
/// buffer as one value, a sized message's header decode consumes only
/// its own prefix and leaves the rest untouched.
pub(crate) fn split_sized<H>(bytes: &[u8]) -> Result<(H, Vec<u8>), WireError>
where
    H: serde::de::DeserializeOwned,
{
    let mut cursor = std::io::Cursor::new(bytes);
    let header: H = bincode::deserialize_from(&mut cursor).map_err(WireError::Encode)?;
    let pos = cursor.position() as usize;
    Ok((header, bytes[pos..].to_vec()))
}
