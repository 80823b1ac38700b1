//! # rt-rdma
//!
//! The RDMA manager: handle registration, `associate_get`/
//! `associate_put` callback tables, message-based `get`/`put` against a
//! registered handle, and per-pair channels with explicit passive-target
//! synchronization over [`rt_transport::Transport`]'s one-sided windows.
//! One [`RdmaManager`] per node, wired onto an [`rt_engine::Engine`] the
//! same way every other manager crate registers its own protocol handlers
//! at construction time.

mod channel;
pub mod errors;
mod manager;
mod wire;

pub use channel::ChannelId;
pub use errors::RdmaError;
pub use manager::RdmaManager;
pub use wire::ChannelOp;
