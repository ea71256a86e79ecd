//! Metadata V9 to V13: textual type names, no portable type registry.

use chainscale_codec::{scale_struct, CodecError, Decode, Encode, Input};

use crate::storage::{HasherV9, StorageHasher, StorageModifier};

fn bad_tag(ty: &str, index: u8) -> CodecError {
    CodecError::UnknownDiscriminant {
        ty: ty.into(),
        index,
    }
}

// ─── Shared across V9..V13 ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionArgument {
    pub name: String,
    pub ty: String,
}

scale_struct!(FunctionArgument { name, ty });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMetadata {
    pub name: String,
    pub args: Vec<FunctionArgument>,
    pub docs: Vec<String>,
}

scale_struct!(FunctionMetadata { name, args, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMetadata {
    pub name: String,
    pub args: Vec<String>,
    pub docs: Vec<String>,
}

scale_struct!(EventMetadata { name, args, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantMetadata {
    pub name: String,
    pub ty: String,
    pub value: Vec<u8>,
    pub docs: Vec<String>,
}

scale_struct!(ConstantMetadata { name, ty, value, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMetadata {
    pub name: String,
    pub docs: Vec<String>,
}

scale_struct!(ErrorMetadata { name, docs });

/// Extrinsic format description, present from V11.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtrinsicMetadata {
    pub version: u8,
    pub signed_extensions: Vec<String>,
}

scale_struct!(ExtrinsicMetadata { version, signed_extensions });

// ─── V9 ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEntryTypeV9 {
    Plain(String),
    Map {
        hasher: HasherV9,
        key: String,
        value: String,
        linked: bool,
    },
    DoubleMap {
        hasher: HasherV9,
        key1: String,
        key2: String,
        value: String,
        key2_hasher: HasherV9,
    },
}

impl Encode for StorageEntryTypeV9 {
    fn encode_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Plain(ty) => {
                out.push(0);
                ty.encode_to(out);
            }
            Self::Map { hasher, key, value, linked } => {
                out.push(1);
                hasher.encode_to(out);
                key.encode_to(out);
                value.encode_to(out);
                linked.encode_to(out);
            }
            Self::DoubleMap { hasher, key1, key2, value, key2_hasher } => {
                out.push(2);
                hasher.encode_to(out);
                key1.encode_to(out);
                key2.encode_to(out);
                value.encode_to(out);
                key2_hasher.encode_to(out);
            }
        }
    }
}

impl Decode for StorageEntryTypeV9 {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        Ok(match input.read_byte()? {
            0 => Self::Plain(String::decode(input)?),
            1 => Self::Map {
                hasher: Decode::decode(input)?,
                key: Decode::decode(input)?,
                value: Decode::decode(input)?,
                linked: Decode::decode(input)?,
            },
            2 => Self::DoubleMap {
                hasher: Decode::decode(input)?,
                key1: Decode::decode(input)?,
                key2: Decode::decode(input)?,
                value: Decode::decode(input)?,
                key2_hasher: Decode::decode(input)?,
            },
            index => return Err(bad_tag("StorageEntryTypeV9", index)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntryV9 {
    pub name: String,
    pub modifier: StorageModifier,
    pub ty: StorageEntryTypeV9,
    pub default: Vec<u8>,
    pub docs: Vec<String>,
}

scale_struct!(StorageEntryV9 { name, modifier, ty, default, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageMetadataV9 {
    pub prefix: String,
    pub entries: Vec<StorageEntryV9>,
}

scale_struct!(StorageMetadataV9 { prefix, entries });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadataV9 {
    pub name: String,
    pub storage: Option<StorageMetadataV9>,
    pub calls: Option<Vec<FunctionMetadata>>,
    pub events: Option<Vec<EventMetadata>>,
    pub constants: Vec<ConstantMetadata>,
    pub errors: Vec<ErrorMetadata>,
}

scale_struct!(ModuleMetadataV9 { name, storage, calls, events, constants, errors });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataV9 {
    pub modules: Vec<ModuleMetadataV9>,
}

scale_struct!(MetadataV9 { modules });

// ─── V10 / V11 / V12 ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEntryTypeV10 {
    Plain(String),
    Map {
        hasher: StorageHasher,
        key: String,
        value: String,
        linked: bool,
    },
    DoubleMap {
        hasher: StorageHasher,
        key1: String,
        key2: String,
        value: String,
        key2_hasher: StorageHasher,
    },
}

impl Encode for StorageEntryTypeV10 {
    fn encode_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Plain(ty) => {
                out.push(0);
                ty.encode_to(out);
            }
            Self::Map { hasher, key, value, linked } => {
                out.push(1);
                hasher.encode_to(out);
                key.encode_to(out);
                value.encode_to(out);
                linked.encode_to(out);
            }
            Self::DoubleMap { hasher, key1, key2, value, key2_hasher } => {
                out.push(2);
                hasher.encode_to(out);
                key1.encode_to(out);
                key2.encode_to(out);
                value.encode_to(out);
                key2_hasher.encode_to(out);
            }
        }
    }
}

impl Decode for StorageEntryTypeV10 {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        Ok(match input.read_byte()? {
            0 => Self::Plain(String::decode(input)?),
            1 => Self::Map {
                hasher: Decode::decode(input)?,
                key: Decode::decode(input)?,
                value: Decode::decode(input)?,
                linked: Decode::decode(input)?,
            },
            2 => Self::DoubleMap {
                hasher: Decode::decode(input)?,
                key1: Decode::decode(input)?,
                key2: Decode::decode(input)?,
                value: Decode::decode(input)?,
                key2_hasher: Decode::decode(input)?,
            },
            index => return Err(bad_tag("StorageEntryTypeV10", index)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntryV10 {
    pub name: String,
    pub modifier: StorageModifier,
    pub ty: StorageEntryTypeV10,
    pub default: Vec<u8>,
    pub docs: Vec<String>,
}

scale_struct!(StorageEntryV10 { name, modifier, ty, default, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageMetadataV10 {
    pub prefix: String,
    pub entries: Vec<StorageEntryV10>,
}

scale_struct!(StorageMetadataV10 { prefix, entries });

/// Module layout of V10 and V11.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadataV10 {
    pub name: String,
    pub storage: Option<StorageMetadataV10>,
    pub calls: Option<Vec<FunctionMetadata>>,
    pub events: Option<Vec<EventMetadata>>,
    pub constants: Vec<ConstantMetadata>,
    pub errors: Vec<ErrorMetadata>,
}

scale_struct!(ModuleMetadataV10 { name, storage, calls, events, constants, errors });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataV10 {
    pub modules: Vec<ModuleMetadataV10>,
}

scale_struct!(MetadataV10 { modules });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataV11 {
    pub modules: Vec<ModuleMetadataV10>,
    pub extrinsic: ExtrinsicMetadata,
}

scale_struct!(MetadataV11 { modules, extrinsic });

/// V12 adds an explicit module index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadataV12 {
    pub name: String,
    pub storage: Option<StorageMetadataV10>,
    pub calls: Option<Vec<FunctionMetadata>>,
    pub events: Option<Vec<EventMetadata>>,
    pub constants: Vec<ConstantMetadata>,
    pub errors: Vec<ErrorMetadata>,
    pub index: u8,
}

scale_struct!(ModuleMetadataV12 { name, storage, calls, events, constants, errors, index });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataV12 {
    pub modules: Vec<ModuleMetadataV12>,
    pub extrinsic: ExtrinsicMetadata,
}

scale_struct!(MetadataV12 { modules, extrinsic });

// ─── V13 ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEntryTypeV13 {
    Plain(String),
    Map {
        hasher: StorageHasher,
        key: String,
        value: String,
        unused: bool,
    },
    DoubleMap {
        hasher: StorageHasher,
        key1: String,
        key2: String,
        value: String,
        key2_hasher: StorageHasher,
    },
    NMap {
        keys: Vec<String>,
        hashers: Vec<StorageHasher>,
        value: String,
    },
}

impl Encode for StorageEntryTypeV13 {
    fn encode_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Plain(ty) => {
                out.push(0);
                ty.encode_to(out);
            }
            Self::Map { hasher, key, value, unused } => {
                out.push(1);
                hasher.encode_to(out);
                key.encode_to(out);
                value.encode_to(out);
                unused.encode_to(out);
            }
            Self::DoubleMap { hasher, key1, key2, value, key2_hasher } => {
                out.push(2);
                hasher.encode_to(out);
                key1.encode_to(out);
                key2.encode_to(out);
                value.encode_to(out);
                key2_hasher.encode_to(out);
            }
            Self::NMap { keys, hashers, value } => {
                out.push(3);
                keys.encode_to(out);
                hashers.encode_to(out);
                value.encode_to(out);
            }
        }
    }
}

impl Decode for StorageEntryTypeV13 {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        Ok(match input.read_byte()? {
            0 => Self::Plain(String::decode(input)?),
            1 => Self::Map {
                hasher: Decode::decode(input)?,
                key: Decode::decode(input)?,
                value: Decode::decode(input)?,
                unused: Decode::decode(input)?,
            },
            2 => Self::DoubleMap {
                hasher: Decode::decode(input)?,
                key1: Decode::decode(input)?,
                key2: Decode::decode(input)?,
                value: Decode::decode(input)?,
                key2_hasher: Decode::decode(input)?,
            },
            3 => Self::NMap {
                keys: Decode::decode(input)?,
                hashers: Decode::decode(input)?,
                value: Decode::decode(input)?,
            },
            index => return Err(bad_tag("StorageEntryTypeV13", index)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntryV13 {
    pub name: String,
    pub modifier: StorageModifier,
    pub ty: StorageEntryTypeV13,
    pub default: Vec<u8>,
    pub docs: Vec<String>,
}

scale_struct!(StorageEntryV13 { name, modifier, ty, default, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageMetadataV13 {
    pub prefix: String,
    pub entries: Vec<StorageEntryV13>,
}

scale_struct!(StorageMetadataV13 { prefix, entries });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadataV13 {
    pub name: String,
    pub storage: Option<StorageMetadataV13>,
    pub calls: Option<Vec<FunctionMetadata>>,
    pub events: Option<Vec<EventMetadata>>,
    pub constants: Vec<ConstantMetadata>,
    pub errors: Vec<ErrorMetadata>,
    pub index: u8,
}

scale_struct!(ModuleMetadataV13 { name, storage, calls, events, constants, errors, index });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataV13 {
    pub modules: Vec<ModuleMetadataV13>,
    pub extrinsic: ExtrinsicMetadata,
}

scale_struct!(MetadataV13 { modules, extrinsic });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_entry_v9_roundtrip_bytes() {
        let entry = StorageEntryV9 {
            name: "Account".into(),
            modifier: StorageModifier::Default,
            ty: StorageEntryTypeV9::Map {
                hasher: HasherV9::Blake2_256,
                key: "T::AccountId".into(),
                value: "AccountData".into(),
                linked: false,
            },
            default: vec![0; 4],
            docs: vec![],
        };
        let bytes = entry.encode();
        // name, modifier, then the Map tag followed by the V9 hasher index
        assert_eq!(bytes[8], 1);
        assert_eq!(bytes[9], 1);
        assert_eq!(bytes[10], 1);
        assert_eq!(StorageEntryV9::decode_all(&bytes).unwrap(), entry);
    }

    #[test]
    fn unknown_entry_type_is_rejected() {
        assert!(matches!(
            StorageEntryTypeV13::decode_all(&[4]),
            Err(CodecError::UnknownDiscriminant { index: 4, .. })
        ));
    }
}
