//! The seam between the message engine and the epoch manager
//! (`rt-epoch`, a separate crate that depends on this one to send its
//! wave/credit protocol messages). The engine needs to bump an epoch's
//! producer/consumer counters on every send/receive, but cannot depend on `rt-epoch`
//! without a cycle — so it depends on this trait instead, and `rt-runtime`
//! wires the real `EpochManager` in as a trait object at process startup.

use rt_types::{EpochId, NodeId};

/// Termination-accounting hooks the message engine calls on every send and
/// dispatch. A `no_epoch` message must never reach these methods — callers
/// check [`rt_types::Envelope::is_epoch_tracked`] first. `record_consumed` carries
/// the sender so Dijkstra-Scholten rooted epochs can establish the
/// receiving node's engager edge.
pub trait EpochAccounting: Send + Sync {
    fn record_produced(&self, epoch: EpochId);
    fn record_consumed(&self, epoch: EpochId, from: NodeId);
}

/// A no-op implementation for standalone engine tests that don't wire a
/// real epoch manager.
#[derive(Default)]
pub struct NullAccounting;

impl EpochAccounting for NullAccounting {
    fn record_produced(&self, _epoch: EpochId) {}
    fn record_consumed(&self, _epoch: EpochId, _from: NodeId) {}
}
