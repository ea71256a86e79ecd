//! The canonical metadata form every supported version upgrades into.

use serde::Serialize;

use crate::storage::{StorageHasher, StorageModifier};

/// Index into [`TypeGraph`]. Ids are dense and assigned in decode order.
pub type TypeId = u32;

/// Primitive leaf types, in scale-info discriminant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Bool,
    Char,
    Str,
    U8,
    U16,
    U32,
    U64,
    U128,
    U256,
    I8,
    I16,
    I32,
    I64,
    I128,
    I256,
}

impl Primitive {
    const ALL: [Primitive; 15] = [
        Self::Bool,
        Self::Char,
        Self::Str,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::U128,
        Self::U256,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::I128,
        Self::I256,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn index(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::Str => "str",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::U128 => "u128",
            Self::U256 => "u256",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::I128 => "i128",
            Self::I256 => "i256",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: Option<String>,
    pub ty: TypeId,
    pub type_name: Option<String>,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantDescriptor {
    pub name: String,
    pub index: u8,
    pub fields: Vec<FieldDescriptor>,
    pub docs: Vec<String>,
}

/// Shape of one node in the type graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypeDescriptor {
    Primitive { primitive: Primitive },
    Compact { ty: TypeId },
    Composite { fields: Vec<FieldDescriptor> },
    Variant { variants: Vec<VariantDescriptor> },
    Sequence { elem: TypeId },
    FixedArray { len: u32, elem: TypeId },
    Tuple { elems: Vec<TypeId> },
    Map { key: TypeId, value: TypeId },
    Option { ty: TypeId },
    Result { ok: TypeId, err: TypeId },
    BitSequence { store: TypeId, order: TypeId },
    /// Length-prefixed encoding of the inner type.
    Opaque { ty: TypeId },
    /// Textual type name from V9..V13 metadata, resolved by name in the
    /// scope of the declaring pallet.
    Historic { name: String, scope: Option<String> },
    DoNotConstruct { reason: Option<String> },
}

impl TypeDescriptor {
    /// Every type id this node refers to directly.
    pub fn references(&self) -> Vec<TypeId> {
        match self {
            Self::Primitive { .. } | Self::Historic { .. } | Self::DoNotConstruct { .. } => {
                Vec::new()
            }
            Self::Compact { ty } | Self::Option { ty } | Self::Opaque { ty } => vec![*ty],
            Self::Sequence { elem } | Self::FixedArray { elem, .. } => vec![*elem],
            Self::Composite { fields } => fields.iter().map(|f| f.ty).collect(),
            Self::Variant { variants } => variants
                .iter()
                .flat_map(|v| v.fields.iter().map(|f| f.ty))
                .collect(),
            Self::Tuple { elems } => elems.clone(),
            Self::Map { key, value } => vec![*key, *value],
            Self::Result { ok, err } => vec![*ok, *err],
            Self::BitSequence { store, order } => vec![*store, *order],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeParam {
    pub name: String,
    pub ty: Option<TypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortableType {
    pub id: TypeId,
    pub descriptor: TypeDescriptor,
    pub path: Vec<String>,
    pub params: Vec<TypeParam>,
    pub docs: Vec<String>,
    /// Last path segment, when the type has a path.
    pub display_name: Option<String>,
    /// Decoded instead when the primary descriptor fails.
    pub fallback: Option<TypeId>,
}

/// Immutable, densely indexed type table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TypeGraph {
    types: Vec<PortableType>,
}

impl TypeGraph {
    pub(crate) fn from_types(types: Vec<PortableType>) -> Self {
        Self { types }
    }

    pub fn get(&self, id: TypeId) -> Option<&PortableType> {
        self.types.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortableType> {
        self.types.iter()
    }

    /// Variants of `id`, if it is a variant node.
    pub fn variants(&self, id: TypeId) -> Option<&[VariantDescriptor]> {
        match &self.get(id)?.descriptor {
            TypeDescriptor::Variant { variants } => Some(variants),
            _ => None,
        }
    }
}

// ─── Pallets ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StorageEntryType {
    Plain {
        value: TypeId,
    },
    /// One hasher per key segment; with several segments `key` is a tuple.
    Map {
        hashers: Vec<StorageHasher>,
        key: TypeId,
        value: TypeId,
    },
}

impl StorageEntryType {
    pub fn value(&self) -> TypeId {
        match self {
            Self::Plain { value } | Self::Map { value, .. } => *value,
        }
    }

    pub fn hashers(&self) -> &[StorageHasher] {
        match self {
            Self::Plain { .. } => &[],
            Self::Map { hashers, .. } => hashers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageEntry {
    pub name: String,
    pub modifier: StorageModifier,
    pub ty: StorageEntryType,
    pub default: Vec<u8>,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PalletStorage {
    pub prefix: String,
    pub entries: Vec<StorageEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstantMetadata {
    pub name: String,
    pub ty: TypeId,
    pub value: Vec<u8>,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PalletMetadata {
    pub name: String,
    pub index: u8,
    pub storage: Option<PalletStorage>,
    pub calls: Option<TypeId>,
    pub events: Option<TypeId>,
    pub errors: Option<TypeId>,
    pub constants: Vec<ConstantMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedExtension {
    pub identifier: String,
    pub ty: TypeId,
    pub additional_signed: TypeId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtrinsicMetadata {
    pub ty: Option<TypeId>,
    pub version: u8,
    pub signed_extensions: Vec<SignedExtension>,
}

/// Metadata after the upgrade chain: one type graph plus the pallets that
/// reference it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataLatest {
    /// Version byte of the envelope this was upgraded from.
    pub source_version: u8,
    pub types: TypeGraph,
    pub pallets: Vec<PalletMetadata>,
    pub extrinsic: ExtrinsicMetadata,
    pub runtime_type: Option<TypeId>,
}

impl MetadataLatest {
    /// Exact match first, then case-insensitive.
    pub fn pallet(&self, name: &str) -> Option<&PalletMetadata> {
        self.pallets
            .iter()
            .find(|p| p.name == name)
            .or_else(|| self.pallets.iter().find(|p| p.name.eq_ignore_ascii_case(name)))
    }

    pub fn pallet_by_index(&self, index: u8) -> Option<&PalletMetadata> {
        self.pallets.iter().find(|p| p.index == index)
    }

    pub fn call_names(&self, pallet: &PalletMetadata) -> Vec<String> {
        self.variant_names(pallet.calls)
    }

    pub fn event_names(&self, pallet: &PalletMetadata) -> Vec<String> {
        self.variant_names(pallet.events)
    }

    pub fn error_names(&self, pallet: &PalletMetadata) -> Vec<String> {
        self.variant_names(pallet.errors)
    }

    fn variant_names(&self, id: Option<TypeId>) -> Vec<String> {
        id.and_then(|id| self.types.variants(id))
            .map(|vs| vs.iter().map(|v| v.name.clone()).collect())
            .unwrap_or_default()
    }
}
