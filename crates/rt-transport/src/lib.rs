//! # rt-transport
//!
//! The behavioral contract the core requires from the underlying
//! message-passing library: "non-blocking point-to-point
//! messages with unique tags, non-blocking collectives, one-sided windows
//! with passive-target synchronization, and a barrier." The core never
//! mandates a specific transport API; this crate defines the [`Transport`]
//! trait plus [`local::LocalTransport`], an in-process multi-node reference
//! backend used by `rt-tests` and by single-process demos.

pub mod local;

use rt_types::{NodeId, NumNodes, Tag};
use thiserror::Error;

/// Fatal transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("node {0} is not a member of this job")]
    UnknownNode(NodeId),
    #[error("transport window {0} is not registered")]
    UnknownWindow(u64),
}

/// Opaque completion token for an outstanding non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendHandle(pub u64);

/// Opaque token for an in-flight non-blocking barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierHandle(pub u64);

/// A registered one-sided memory window. `owner` is the node whose memory
/// backs the window for a non-collective registration; for a collective
/// registration every node registers its own slice under the same `id` and
/// addresses a peer's slice by passing that peer's `NodeId` to `window_get`/
/// `window_put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle {
    pub id: u64,
    pub collective: bool,
}

/// Passive-target lock mode, mirroring MPI's `MPI_Win_lock` shared/exclusive
/// distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// The behavioral contract consumed by the message engine and RDMA manager.
/// No specific wire format or network library is mandated; every method here
/// is non-blocking except where the method name says otherwise (`probe`/
/// `try_recv`/`*_poll` return immediately; only `_blocking` helpers spin).
pub trait Transport: Send + Sync {
    fn this_node(&self) -> NodeId;
    fn num_nodes(&self) -> NumNodes;

    /// Post a point-to-point send. Returns immediately; completion is
    /// observed later via [`Self::send_completed`].
    fn post_send(&self, to: NodeId, tag: Tag, bytes: Vec<u8>) -> Result<SendHandle, TransportError>;

    /// Non-blocking completion poll for a previously posted send.
    fn send_completed(&self, handle: SendHandle) -> bool;

    /// `iprobe`: true if a message is ready to be received without
    /// consuming it.
    fn probe(&self) -> bool;

    /// Non-blocking receive: pops the oldest ready message, if any.
    fn try_recv(&self) -> Option<(NodeId, Tag, Vec<u8>)>;

    /// Begin a non-blocking barrier (`ibarrier`).
    fn barrier_start(&self) -> BarrierHandle;

    /// Poll a barrier for completion.
    fn barrier_poll(&self, handle: &BarrierHandle) -> bool;

    /// Register a local window over `bytes` of memory at this (home) node.
    fn window_register(&self, bytes: usize) -> WindowHandle;

    /// Register this node's slice of a collective window under a
    /// collectively-agreed `id` (every node must call this the same number
    /// of times, in the same order, as every other node — the id is derived
    /// from call order, not negotiated over the wire).
    fn window_register_collective(&self, id: u64, local_bytes: usize) -> WindowHandle;

    /// Acquire a passive-target lock on `target`'s slice of `window`.
    fn window_lock(&self, window: WindowHandle, target: NodeId, mode: LockMode);

    /// Release a previously acquired lock.
    fn window_unlock(&self, window: WindowHandle, target: NodeId);

    /// Ensure all outstanding puts/gets to `target` under `window` are
    /// visible; a no-op completion barrier for passive-target sync.
    fn window_flush(&self, window: WindowHandle, target: NodeId);

    /// One-sided read of `len` bytes at `offset` from `target`'s slice.
    fn window_get(&self, window: WindowHandle, target: NodeId, offset: usize, len: usize) -> Result<Vec<u8>, TransportError>;

    /// One-sided write of `data` at `offset` into `target`'s slice.
    fn window_put(&self, window: WindowHandle, target: NodeId, offset: usize, data: &[u8]) -> Result<(), TransportError>;
}
