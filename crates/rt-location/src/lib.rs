//! # rt-location
//!
//! The location manager: registration, home/cache
//! resolution, hop-capped forwarding, and migration bookkeeping for
//! virtual proxies. One [`LocationManager`] per node, wired onto an
//! [`rt_engine::Engine`] the same way `rt-epoch`'s `EpochManager` wires
//! itself in — registering its own protocol handlers at construction time.

mod errors;
mod manager;
mod messages;

pub use errors::LocationError;
pub use manager::{require_known, LocationManager};
