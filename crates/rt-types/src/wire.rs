//! Serialization contract consumed by the message engine: any user
//! message type needs a `size()`, `pack(buffer)`, `unpack(buffer)`
//! triple, or a declaration that the type is trivially copyable.
//! Byte-copyable messages skip pack/unpack.

use crate::errors::WireError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A message payload the engine can turn into bytes and back.
///
/// Blanket-implemented for any `Serialize + DeserializeOwned` type via
/// `bincode`.
pub trait Payload: Sized {
    fn size_hint(&self) -> usize;
    fn pack(&self) -> Result<Vec<u8>, WireError>;
    fn unpack(bytes: &[u8]) -> Result<Self, WireError>;
}

impl<T> Payload for T
where
    T: Serialize + DeserializeOwned,
{
    fn size_hint(&self) -> usize {
        bincode::serialized_size(self).unwrap_or(0) as usize
    }

    fn pack(&self) -> Result<Vec<u8>, WireError> {
        bincode::serialize(self).map_err(WireError::Encode)
    }

    fn unpack(bytes: &[u8]) -> Result<Self, WireError> {
        bincode::deserialize(bytes).map_err(WireError::Encode)
    }
}

/// Marker for payload types that are trivially copyable and may skip
/// pack/unpack entirely — the engine ships their raw bytes.
///
/// # Safety
///
/// Implementors must have no padding-dependent or pointer-valued fields;
/// their byte representation must be meaningful on every node in the run.
pub unsafe trait Copyable: Copy {}

macro_rules! impl_copyable {
    ($($t:ty),* $(,)?) => {
        $(unsafe impl Copyable for $t {})*
    };
}

impl_copyable!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, bool);

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn pack_unpack_round_trips() {
        let s = Sample { a: 7, b: "hi".into() };
        let bytes = s.pack().unwrap();
        let back = Sample::unpack(&bytes).unwrap();
        assert_eq!(s, back);
    }
}
