//! Storage hasher and modifier enums shared by every metadata version.

use chainscale_codec::{CodecError, Decode, Encode, Input};
use serde::Serialize;

/// Hasher applied to one storage key segment (V10 onward; `Identity`
/// appears from V11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StorageHasher {
    Blake2_128,
    Blake2_256,
    Blake2_128Concat,
    Twox128,
    Twox256,
    Twox64Concat,
    Identity,
}

impl StorageHasher {
    /// `true` if the hash output is followed by the raw key, so the key can
    /// be recovered from the storage key.
    pub fn is_concat(&self) -> bool {
        matches!(
            self,
            Self::Blake2_128Concat | Self::Twox64Concat | Self::Identity
        )
    }

    /// Length of the hash part, not counting any appended key.
    pub fn hash_len(&self) -> usize {
        match self {
            Self::Blake2_128 | Self::Twox128 | Self::Blake2_128Concat => 16,
            Self::Blake2_256 | Self::Twox256 => 32,
            Self::Twox64Concat => 8,
            Self::Identity => 0,
        }
    }
}

impl Encode for StorageHasher {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

impl Decode for StorageHasher {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        Ok(match input.read_byte()? {
            0 => Self::Blake2_128,
            1 => Self::Blake2_256,
            2 => Self::Blake2_128Concat,
            3 => Self::Twox128,
            4 => Self::Twox256,
            5 => Self::Twox64Concat,
            6 => Self::Identity,
            index => {
                return Err(CodecError::UnknownDiscriminant {
                    ty: "StorageHasher".into(),
                    index,
                })
            }
        })
    }
}

/// The V9 hasher table, before `Blake2_128Concat` was inserted at index 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HasherV9 {
    Blake2_128,
    Blake2_256,
    Twox128,
    Twox256,
    Twox64Concat,
}

impl From<HasherV9> for StorageHasher {
    fn from(h: HasherV9) -> Self {
        match h {
            HasherV9::Blake2_128 => Self::Blake2_128,
            HasherV9::Blake2_256 => Self::Blake2_256,
            HasherV9::Twox128 => Self::Twox128,
            HasherV9::Twox256 => Self::Twox256,
            HasherV9::Twox64Concat => Self::Twox64Concat,
        }
    }
}

impl Encode for HasherV9 {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

impl Decode for HasherV9 {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        Ok(match input.read_byte()? {
            0 => Self::Blake2_128,
            1 => Self::Blake2_256,
            2 => Self::Twox128,
            3 => Self::Twox256,
            4 => Self::Twox64Concat,
            index => {
                return Err(CodecError::UnknownDiscriminant {
                    ty: "StorageHasherV9".into(),
                    index,
                })
            }
        })
    }
}

/// Whether a missing storage value reads as `None` or as the entry default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageModifier {
    Optional,
    Default,
}

impl Encode for StorageModifier {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.push(*self as u8);
    }
}

impl Decode for StorageModifier {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        match input.read_byte()? {
            0 => Ok(Self::Optional),
            1 => Ok(Self::Default),
            index => Err(CodecError::UnknownDiscriminant {
                ty: "StorageEntryModifier".into(),
                index,
            }),
        }
    }
}
