//! Metadata V14: pallets reference a scale-info style portable type table.

use chainscale_codec::{scale_struct, CodecError, Compact, Decode, Encode, Input};

use crate::latest::Primitive;
use crate::storage::{StorageHasher, StorageModifier};

fn bad_tag(ty: &str, index: u8) -> CodecError {
    CodecError::UnknownDiscriminant {
        ty: ty.into(),
        index,
    }
}

// ─── Type table ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub name: Option<String>,
    pub ty: Compact<u32>,
    pub type_name: Option<String>,
    pub docs: Vec<String>,
}

scale_struct!(RawField { name, ty, type_name, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVariant {
    pub name: String,
    pub fields: Vec<RawField>,
    pub index: u8,
    pub docs: Vec<String>,
}

scale_struct!(RawVariant { name, fields, index, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTypeParameter {
    pub name: String,
    pub ty: Option<Compact<u32>>,
}

scale_struct!(RawTypeParameter { name, ty });

/// Type definition as it appears on the wire. `Historic` is never produced
/// by a runtime; it only exists in tables synthesized from V13.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTypeDef {
    Composite(Vec<RawField>),
    Variant(Vec<RawVariant>),
    Sequence(Compact<u32>),
    Array { len: u32, ty: Compact<u32> },
    Tuple(Vec<Compact<u32>>),
    Primitive(Primitive),
    Compact(Compact<u32>),
    BitSequence { store: Compact<u32>, order: Compact<u32> },
    Historic(String),
}

impl Encode for RawTypeDef {
    fn encode_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Composite(fields) => {
                out.push(0);
                fields.encode_to(out);
            }
            Self::Variant(variants) => {
                out.push(1);
                variants.encode_to(out);
            }
            Self::Sequence(ty) => {
                out.push(2);
                ty.encode_to(out);
            }
            Self::Array { len, ty } => {
                out.push(3);
                len.encode_to(out);
                ty.encode_to(out);
            }
            Self::Tuple(elems) => {
                out.push(4);
                elems.encode_to(out);
            }
            Self::Primitive(p) => {
                out.push(5);
                out.push(p.index());
            }
            Self::Compact(ty) => {
                out.push(6);
                ty.encode_to(out);
            }
            Self::BitSequence { store, order } => {
                out.push(7);
                store.encode_to(out);
                order.encode_to(out);
            }
            Self::Historic(name) => {
                out.push(8);
                name.encode_to(out);
            }
        }
    }
}

impl Decode for RawTypeDef {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        Ok(match input.read_byte()? {
            0 => Self::Composite(Decode::decode(input)?),
            1 => Self::Variant(Decode::decode(input)?),
            2 => Self::Sequence(Decode::decode(input)?),
            3 => Self::Array {
                len: Decode::decode(input)?,
                ty: Decode::decode(input)?,
            },
            4 => Self::Tuple(Decode::decode(input)?),
            5 => {
                let index = input.read_byte()?;
                Self::Primitive(
                    Primitive::from_index(index).ok_or_else(|| bad_tag("TypeDefPrimitive", index))?,
                )
            }
            6 => Self::Compact(Decode::decode(input)?),
            7 => Self::BitSequence {
                store: Decode::decode(input)?,
                order: Decode::decode(input)?,
            },
            8 => Self::Historic(Decode::decode(input)?),
            index => return Err(bad_tag("TypeDef", index)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawType {
    pub path: Vec<String>,
    pub type_params: Vec<RawTypeParameter>,
    pub def: RawTypeDef,
    pub docs: Vec<String>,
}

scale_struct!(RawType { path, type_params, def, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPortableType {
    pub id: Compact<u32>,
    pub ty: RawType,
}

scale_struct!(RawPortableType { id, ty });

// ─── Pallets ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEntryTypeV14 {
    Plain(Compact<u32>),
    Map {
        hashers: Vec<StorageHasher>,
        key: Compact<u32>,
        value: Compact<u32>,
    },
}

impl Encode for StorageEntryTypeV14 {
    fn encode_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Plain(ty) => {
                out.push(0);
                ty.encode_to(out);
            }
            Self::Map { hashers, key, value } => {
                out.push(1);
                hashers.encode_to(out);
                key.encode_to(out);
                value.encode_to(out);
            }
        }
    }
}

impl Decode for StorageEntryTypeV14 {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        Ok(match input.read_byte()? {
            0 => Self::Plain(Decode::decode(input)?),
            1 => Self::Map {
                hashers: Decode::decode(input)?,
                key: Decode::decode(input)?,
                value: Decode::decode(input)?,
            },
            index => return Err(bad_tag("StorageEntryTypeV14", index)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntryV14 {
    pub name: String,
    pub modifier: StorageModifier,
    pub ty: StorageEntryTypeV14,
    pub default: Vec<u8>,
    pub docs: Vec<String>,
}

scale_struct!(StorageEntryV14 { name, modifier, ty, default, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalletStorageV14 {
    pub prefix: String,
    pub entries: Vec<StorageEntryV14>,
}

scale_struct!(PalletStorageV14 { prefix, entries });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalletConstantV14 {
    pub name: String,
    pub ty: Compact<u32>,
    pub value: Vec<u8>,
    pub docs: Vec<String>,
}

scale_struct!(PalletConstantV14 { name, ty, value, docs });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalletMetadataV14 {
    pub name: String,
    pub storage: Option<PalletStorageV14>,
    pub calls: Option<Compact<u32>>,
    pub events: Option<Compact<u32>>,
    pub constants: Vec<PalletConstantV14>,
    pub errors: Option<Compact<u32>>,
    pub index: u8,
}

scale_struct!(PalletMetadataV14 { name, storage, calls, events, constants, errors, index });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedExtensionV14 {
    pub identifier: String,
    pub ty: Compact<u32>,
    pub additional_signed: Compact<u32>,
}

scale_struct!(SignedExtensionV14 { identifier, ty, additional_signed });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtrinsicMetadataV14 {
    pub ty: Compact<u32>,
    pub version: u8,
    pub signed_extensions: Vec<SignedExtensionV14>,
}

scale_struct!(ExtrinsicMetadataV14 { ty, version, signed_extensions });

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataV14 {
    pub types: Vec<RawPortableType>,
    pub pallets: Vec<PalletMetadataV14>,
    pub extrinsic: ExtrinsicMetadataV14,
    pub ty: Compact<u32>,
}

scale_struct!(MetadataV14 { types, pallets, extrinsic, ty });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_def_uses_scale_info_indices() {
        let def = RawTypeDef::Primitive(Primitive::U32);
        assert_eq!(def.encode(), vec![5, 5]);
        assert_eq!(RawTypeDef::decode_all(&[5, 7]).unwrap(), RawTypeDef::Primitive(Primitive::U128));
        assert!(RawTypeDef::decode_all(&[5, 15]).is_err());
    }

    #[test]
    fn field_layout_is_name_type_typename_docs() {
        let field = RawField {
            name: Some("who".into()),
            ty: Compact(3),
            type_name: None,
            docs: vec![],
        };
        // Some + "who", compact 3, None, empty docs
        assert_eq!(field.encode(), vec![1, 12, b'w', b'h', b'o', 12, 0, 0]);
    }

    #[test]
    fn array_def_carries_u32_length() {
        let def = RawTypeDef::Array { len: 32, ty: Compact(2) };
        assert_eq!(def.encode(), vec![3, 32, 0, 0, 0, 8]);
    }
}
