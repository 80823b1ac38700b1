//! Recoverable location-manager errors. The hop-cap escalation is a programming-error
//! class per §7 ("location cache exceeded hop cap") — modeled as a
//! `panic!` at the point of detection, not as a variant here.

use rt_types::{NodeId, VirtualProxy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("entity {0} has no registered home record on this node")]
    NotRegisteredHere(VirtualProxy),
    #[error("entity {0} migrated away from {1} with no forward record")]
    NoForwardRecord(VirtualProxy, NodeId),
}
