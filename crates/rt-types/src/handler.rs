//! Handler IDs: a 32-bit opaque token packed with orthogonal bit-fields:
//! `{auto?, functor?, traced?, control(20), base-msg-derived?,
//! registry-kind(4), identifier(N)}`. Layout, MSB to LSB:
//!
//! ```text
//! bit  31   30   29   28..9      8        7..4          3..0
//!     auto func trace  control  base-msg  registry-kind  identifier
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

const AUTO_SHIFT: u32 = 31;
const FUNCTOR_SHIFT: u32 = 30;
const TRACED_SHIFT: u32 = 29;
const CONTROL_SHIFT: u32 = 9;
const CONTROL_BITS: u32 = 20;
const BASE_DERIVED_SHIFT: u32 = 8;
const KIND_SHIFT: u32 = 4;
const KIND_BITS: u32 = 4;
const IDENTIFIER_BITS: u32 = 4;

const CONTROL_MASK: u32 = (1 << CONTROL_BITS) - 1;
const KIND_MASK: u32 = (1 << KIND_BITS) - 1;
const IDENTIFIER_MASK: u32 = (1 << IDENTIFIER_BITS) - 1;

/// The maximum number of handlers that may be registered per
/// [`RegistryKind`] before [`HandlerId::pack`] would overflow the
/// identifier field. Resource exhaustion past this point is fatal.
pub const MAX_IDENTIFIERS_PER_KIND: u32 = 1 << IDENTIFIER_BITS;

/// Partition of registered handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum RegistryKind {
    Plain = 0,
    Map = 1,
    VirtualContext = 2,
    ObjGroup = 3,
    Collection = 4,
    CollectionMember = 5,
    RdmaGet = 6,
    RdmaPut = 7,
    SeedMap = 8,
}

impl RegistryKind {
    const ALL: [RegistryKind; 9] = [
        Self::Plain,
        Self::Map,
        Self::VirtualContext,
        Self::ObjGroup,
        Self::Collection,
        Self::CollectionMember,
        Self::RdmaGet,
        Self::RdmaPut,
        Self::SeedMap,
    ];

    /// Recover a `RegistryKind` from its packed bit value.
    ///
    /// # Panics
    ///
    /// Panics if `bits` does not correspond to a known kind; an
    /// unregistered/garbled handler ID is a programming error
    /// rather than something a caller can recover from.
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|k| *k as u32 == bits)
            .unwrap_or_else(|| panic!("unknown registry kind bits: {bits}"))
    }
}

/// Fields that uniquely determine a [`HandlerId`]'s 32-bit encoding.
///
/// Testable Property 3: packing is a bijection between this
/// tuple and the packed `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerFields {
    pub auto: bool,
    pub functor: bool,
    pub traced: bool,
    pub control: u32,
    pub base_msg_derived: bool,
    pub kind: RegistryKind,
    pub identifier: u32,
}

/// A 32-bit opaque token identifying a registered handler.
///
/// Invariant: two handlers with equal bits denote the same
/// target function on every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerId(pub u32);

impl HandlerId {
    /// Packs `fields` into a `HandlerId`.
    ///
    /// # Panics
    ///
    /// Panics if `control` or `identifier` overflow their bit widths —
    /// resource exhaustion is a fatal programming error, not a recoverable
    /// condition.
    #[must_use]
    pub fn pack(fields: HandlerFields) -> Self {
        assert!(
            fields.control <= CONTROL_MASK,
            "control field overflow: {} > {CONTROL_MASK}",
            fields.control
        );
        assert!(
            fields.identifier < MAX_IDENTIFIERS_PER_KIND,
            "identifier field overflow: {} >= {MAX_IDENTIFIERS_PER_KIND}",
            fields.identifier
        );

        let mut bits = 0u32;
        bits |= u32::from(fields.auto) << AUTO_SHIFT;
        bits |= u32::from(fields.functor) << FUNCTOR_SHIFT;
        bits |= u32::from(fields.traced) << TRACED_SHIFT;
        bits |= (fields.control & CONTROL_MASK) << CONTROL_SHIFT;
        bits |= u32::from(fields.base_msg_derived) << BASE_DERIVED_SHIFT;
        bits |= (fields.kind as u32 & KIND_MASK) << KIND_SHIFT;
        bits |= fields.identifier & IDENTIFIER_MASK;
        Self(bits)
    }

    /// Unpacks the full field tuple back out. Inverse of [`Self::pack`].
    #[must_use]
    pub fn unpack(self) -> HandlerFields {
        HandlerFields {
            auto: (self.0 >> AUTO_SHIFT) & 1 == 1,
            functor: (self.0 >> FUNCTOR_SHIFT) & 1 == 1,
            traced: (self.0 >> TRACED_SHIFT) & 1 == 1,
            control: (self.0 >> CONTROL_SHIFT) & CONTROL_MASK,
            base_msg_derived: (self.0 >> BASE_DERIVED_SHIFT) & 1 == 1,
            kind: RegistryKind::from_bits((self.0 >> KIND_SHIFT) & KIND_MASK),
            identifier: self.0 & IDENTIFIER_MASK,
        }
    }

    #[must_use]
    pub fn is_trace(self) -> bool {
        self.unpack().traced
    }

    #[must_use]
    pub fn is_functor(self) -> bool {
        self.unpack().functor
    }

    #[must_use]
    pub fn is_objgroup(self) -> bool {
        self.unpack().kind == RegistryKind::ObjGroup
    }

    #[must_use]
    pub fn kind(self) -> RegistryKind {
        self.unpack().kind
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler({:#010x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_kind() -> impl Strategy<Value = RegistryKind> {
        prop_oneof![
            Just(RegistryKind::Plain),
            Just(RegistryKind::Map),
            Just(RegistryKind::VirtualContext),
            Just(RegistryKind::ObjGroup),
            Just(RegistryKind::Collection),
            Just(RegistryKind::CollectionMember),
            Just(RegistryKind::RdmaGet),
            Just(RegistryKind::RdmaPut),
            Just(RegistryKind::SeedMap),
        ]
    }

    proptest! {
        #[test]
        fn pack_unpack_round_trips(
            auto in any::<bool>(),
            functor in any::<bool>(),
            traced in any::<bool>(),
            control in 0u32..(1 << CONTROL_BITS),
            base_msg_derived in any::<bool>(),
            kind in arb_kind(),
            identifier in 0u32..MAX_IDENTIFIERS_PER_KIND,
        ) {
            let fields = HandlerFields { auto, functor, traced, control, base_msg_derived, kind, identifier };
            let packed = HandlerId::pack(fields);
            let unpacked = packed.unpack();
            prop_assert_eq!(unpacked, fields);
        }
    }

    #[test]
    fn kind_query_helpers() {
        let id = HandlerId::pack(HandlerFields {
            auto: false,
            functor: true,
            traced: true,
            control: 0,
            base_msg_derived: false,
            kind: RegistryKind::ObjGroup,
            identifier: 3,
        });
        assert!(id.is_trace());
        assert!(id.is_functor());
        assert!(id.is_objgroup());
    }

    #[test]
    #[should_panic(expected = "identifier field overflow")]
    fn identifier_overflow_panics() {
        HandlerId::pack(HandlerFields {
            auto: false,
            functor: false,
            traced: false,
            control: 0,
            base_msg_derived: false,
            kind: RegistryKind::Plain,
            identifier: MAX_IDENTIFIERS_PER_KIND,
        });
    }

    #[test]
    fn equal_bits_denote_equal_handlers() {
        let a = HandlerFields {
            auto: true,
            functor: false,
            traced: false,
            control: 42,
            base_msg_derived: true,
            kind: RegistryKind::Collection,
            identifier: 2,
        };
        let h1 = HandlerId::pack(a);
        let h2 = HandlerId::pack(a);
        assert_eq!(h1, h2);
    }
}
