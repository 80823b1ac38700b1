//! Recoverable RDMA-manager errors. Out-of-range byte offsets and
//! absorbing a put/serving a get against a handle that was never
//! registered on this node are programming-error classes,
//! modeled as `panic!` at the point of detection rather
//! than as variants here. The variants below back non-panicking
//! readiness probes ([`crate::RdmaManager::require_get_ready`],
//! [`crate::RdmaManager::require_put_ready`]) a caller can use ahead of
//! a round trip, mirroring `rt_location`'s `require_known`.

use rt_types::RdmaHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RdmaError {
    #[error("rdma handle {0} has no region registered on this node")]
    UnknownHandle(RdmaHandle),
    #[error("rdma handle {0} has no associated get callback")]
    NoGetCallback(RdmaHandle),
    #[error("rdma handle {0} has no associated put callback")]
    NoPutCallback(RdmaHandle),
    #[error("rdma channel {0} is not open on this node")]
    UnknownChannel(u64),
}
