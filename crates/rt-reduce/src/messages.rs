//! The single wire message a reduction's combine phase ever sends: a
//! child's accumulated value, forwarded up toward the root one tree hop
//! at a time.

use rt_types::{GroupId, ReductionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ReduceContribution {
    pub(crate) group: GroupId,
    pub(crate) id: ReductionId,
    pub(crate) root: rt_types::NodeId,
    pub(crate) bytes: Vec<u8>,
}
