//! # rt-types
//!
//! The core data model shared by every manager: node identifiers, the
//! packed handler/envelope/epoch/proxy/handle tokens, collection indices,
//! and the serialization contract. Single source of truth for wire-level
//! types.

pub mod collection_entry;
pub mod envelope;
pub mod epoch;
pub mod errors;
pub mod handler;
pub mod index;
pub mod node;
pub mod proxy;
pub mod rdma_handle;
pub mod reduction;
pub mod tree;
pub mod wire;

pub use collection_entry::{CollectionEntryMeta, EntryLifecycle, LocationRecord};
pub use envelope::{Envelope, EnvelopeTypeBits, Tag, TraceEvent, NO_TAG};
pub use epoch::{EpochCategory, EpochId, NO_EPOCH};
pub use errors::{DispatchError, NodeState, WireError};
pub use handler::{HandlerFields, HandlerId, RegistryKind, MAX_IDENTIFIERS_PER_KIND};
pub use index::{block_map, Index, Linearization};
pub use node::{NodeId, NumNodes, UNINITIALIZED_NODE};
pub use proxy::{ProxyFields, VirtualProxy};
pub use rdma_handle::{RdmaHandle, RdmaHandleFields, RdmaOpType};
pub use reduction::{GroupId, ReductionId, ReductionPhase, DEFAULT_GROUP};
pub use tree::{children, default_root, parent};
pub use wire::{Copyable, Payload};
