//! # rt-collection
//!
//! The collection manager and object-group manager: indexed entity containers distributed across nodes, migrated
//! through [`rt_location::LocationManager`] and reduced through
//! [`rt_reduce::ReductionManager`], plus the simpler one-instance-per-node
//! object group that skips location lookup entirely.

pub mod builder;
pub mod collection;
pub mod errors;
pub mod load_model;
mod messages;
pub mod objgroup;
pub mod phase;

pub use builder::CollectionBuilder;
pub use collection::{CollectionManager, MapFn};
pub use errors::CollectionError;
pub use load_model::{LoadModel, UniformLoadModel};
pub use objgroup::ObjGroupManager;
pub use phase::PhaseTracker;
