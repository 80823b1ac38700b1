//! Recoverable epoch-manager errors. Programming errors (sending under a
//! closed epoch, unbalanced push/pop) stay `panic!`/`debug_assert!`
//! since they indicate a bug rather than a recoverable condition; this
//! type covers the rest.

use rt_types::EpochId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EpochError {
    #[error("epoch {0} is not known to this node's epoch manager")]
    UnknownEpoch(EpochId),
    #[error("epoch {0} already terminated; cannot add a dependency or continuation to it")]
    AlreadyTerminated(EpochId),
    #[error("sent under epoch {0}, which this node has already closed")]
    SendUnderClosedEpoch(EpochId),
}
