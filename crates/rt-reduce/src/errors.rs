//! Recoverable reduction errors. A missing contribution is explicitly
//! *not* one of these — the reduction simply never completes, so there is no
//! variant for it.

use rt_types::{GroupId, ReductionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("group {0:?} has no registered membership")]
    UnknownGroup(GroupId),
    #[error("node is not a member of group {0:?}")]
    NotAGroupMember(GroupId),
    #[error("reduction ({0:?}, {1:?}) already has a local contribution")]
    AlreadyContributed(GroupId, ReductionId),
}
