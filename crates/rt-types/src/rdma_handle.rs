//! RDMA handles: a 64-bit token identifying a registered memory region.
//! Packed: {is-sized?, is-collective?, is-handler-based?,
//! op-type(4), home-node, identifier}. The op-type bits
//! determine which callback tables are consulted on a get or put.
//!
//! ```text
//! bit  63        62             61                60..57    56..41     40..0
//!     is-sized  is-collective  is-handler-based  op-type   home-node  identifier
//! ```

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

const IS_SIZED_SHIFT: u64 = 63;
const IS_COLLECTIVE_SHIFT: u64 = 62;
const IS_HANDLER_BASED_SHIFT: u64 = 61;
const OP_TYPE_SHIFT: u64 = 57;
const OP_TYPE_BITS: u64 = 4;
const HOME_NODE_SHIFT: u64 = 41;
const HOME_NODE_BITS: u64 = 16;
const IDENTIFIER_BITS: u64 = 41;

const OP_TYPE_MASK: u64 = (1 << OP_TYPE_BITS) - 1;
const HOME_NODE_MASK: u64 = (1 << HOME_NODE_BITS) - 1;
const IDENTIFIER_MASK: u64 = (1 << IDENTIFIER_BITS) - 1;

/// Which callback table a get/put is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u64)]
pub enum RdmaOpType {
    Get = 0,
    Put = 1,
    GetCollective = 2,
    PutCollective = 3,
}

impl RdmaOpType {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => Self::Get,
            1 => Self::Put,
            2 => Self::GetCollective,
            3 => Self::PutCollective,
            other => panic!("unknown RDMA op-type bits: {other}"),
        }
    }
}

/// Construction-time description of an [`RdmaHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdmaHandleFields {
    pub is_sized: bool,
    pub is_collective: bool,
    pub is_handler_based: bool,
    pub op_type: RdmaOpType,
    pub home_node: NodeId,
    pub identifier: u64,
}

/// A 64-bit token identifying a registered RDMA region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RdmaHandle(pub u64);

impl RdmaHandle {
    /// # Panics
    ///
    /// Panics if `home_node` or `identifier` overflow their bit widths.
    #[must_use]
    pub fn pack(fields: RdmaHandleFields) -> Self {
        assert!(
            u64::from(fields.home_node.as_u32()) <= HOME_NODE_MASK,
            "home node overflows handle bits"
        );
        assert!(
            fields.identifier <= IDENTIFIER_MASK,
            "identifier overflows handle bits"
        );

        let mut bits = 0u64;
        bits |= u64::from(fields.is_sized) << IS_SIZED_SHIFT;
        bits |= u64::from(fields.is_collective) << IS_COLLECTIVE_SHIFT;
        bits |= u64::from(fields.is_handler_based) << IS_HANDLER_BASED_SHIFT;
        bits |= (fields.op_type as u64 & OP_TYPE_MASK) << OP_TYPE_SHIFT;
        bits |= (u64::from(fields.home_node.as_u32()) & HOME_NODE_MASK) << HOME_NODE_SHIFT;
        bits |= fields.identifier & IDENTIFIER_MASK;
        Self(bits)
    }

    #[must_use]
    pub fn unpack(self) -> RdmaHandleFields {
        RdmaHandleFields {
            is_sized: self.is_sized(),
            is_collective: self.is_collective(),
            is_handler_based: self.is_handler_based(),
            op_type: self.op_type(),
            home_node: self.home_node(),
            identifier: self.identifier(),
        }
    }

    #[must_use]
    pub fn is_sized(self) -> bool {
        (self.0 >> IS_SIZED_SHIFT) & 1 == 1
    }

    #[must_use]
    pub fn is_collective(self) -> bool {
        (self.0 >> IS_COLLECTIVE_SHIFT) & 1 == 1
    }

    #[must_use]
    pub fn is_handler_based(self) -> bool {
        (self.0 >> IS_HANDLER_BASED_SHIFT) & 1 == 1
    }

    #[must_use]
    pub fn op_type(self) -> RdmaOpType {
        RdmaOpType::from_bits((self.0 >> OP_TYPE_SHIFT) & OP_TYPE_MASK)
    }

    #[must_use]
    pub fn home_node(self) -> NodeId {
        NodeId::new(((self.0 >> HOME_NODE_SHIFT) & HOME_NODE_MASK) as u32)
    }

    #[must_use]
    pub fn identifier(self) -> u64 {
        self.0 & IDENTIFIER_MASK
    }
}

impl fmt::Display for RdmaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rdma({:?}@{},{})", self.op_type(), self.home_node(), self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let fields = RdmaHandleFields {
            is_sized: true,
            is_collective: false,
            is_handler_based: true,
            op_type: RdmaOpType::Put,
            home_node: NodeId::new(5),
            identifier: 123_456,
        };
        let h = RdmaHandle::pack(fields);
        assert_eq!(h.unpack(), fields);
    }
}
