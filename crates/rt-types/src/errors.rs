//! Recoverable error types shared across managers.
//!
//! Failures split into programming errors (fatal, modeled
//! as `panic!` at the call site, never surfaced here), transport errors
//! (fatal, also not modeled as `Result`), and transient routing state
//! (recoverable, handled internally by the responsible manager). These
//! enums cover the latter plus whatever a manager's public API needs to
//! report back to its caller.

use thiserror::Error;

/// Errors from dispatching through the handler registry.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The handler id is not registered on this node. This is a
    /// programming error; callers that can't guarantee
    /// registration should check first rather than rely on recovery.
    #[error("handler {0} is not registered")]
    Unregistered(crate::handler::HandlerId),
}

/// Errors raised while serializing or deserializing a payload.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("serialization failed: {0}")]
    Encode(#[from] bincode::Error),
}

/// Node operational states, surfaced by the runtime for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Running,
    Idle,
    Terminated,
}
