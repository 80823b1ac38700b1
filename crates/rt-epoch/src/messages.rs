//! Wire messages the epoch manager's own protocol handlers exchange:
//! wave submissions/continuations/termination for the four-counter
//! algorithm, and credit acknowledgements for Dijkstra-Scholten. These
//! are plain `Payload` types like any user message — the epoch manager
//! just happens to be their sender and handler.

use rt_types::EpochId;
use serde::{Deserialize, Serialize};

/// A child reporting its subtree's producer/consumer totals to its parent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct WaveSubmit {
    pub(crate) epoch: EpochId,
    pub(crate) producer: u64,
    pub(crate) consumer: u64,
}

/// The root (or a relaying interior node) signalling the tree to start
/// collecting the next wave.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct WaveContinue {
    pub(crate) epoch: EpochId,
    pub(crate) wave: u64,
}

/// The root broadcasting that termination was detected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct WaveTerminated {
    pub(crate) epoch: EpochId,
}

/// A node acknowledging one unit of credit back to its engager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct DsAck {
    pub(crate) epoch: EpochId,
}
