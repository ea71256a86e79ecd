//! Per-pallet surface: calls, events, errors, constants and storage.
//!
//! A [`Section`] is created on first access to its pallet and builds each
//! item table on first access to that table. Item codecs are resolved only
//! when an item is actually used.

use std::sync::{Arc, OnceLock, Weak};

use chainscale_codec::{Codec, CodecError, CodecRef, Field, TypedValue};
use chainscale_metadata::{
    FieldDescriptor, MetadataLatest, PalletMetadata, StorageEntryType, StorageHasher,
    StorageModifier, TypeId, VariantDescriptor,
};
use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::error::{RegistryError, ResolutionError};
use crate::registry::{RegistryInner, TypeRegistry};

fn resolve_fields(
    registry: &Weak<RegistryInner>,
    fields: &[FieldDescriptor],
) -> Result<Vec<Field>, ResolutionError> {
    let registry = TypeRegistry::upgrade(registry)?;
    fields
        .iter()
        .map(|f| {
            Ok(Field {
                name: f.name.clone(),
                codec: registry.resolve(f.ty)?,
            })
        })
        .collect()
}

/// A dispatchable call of one pallet.
#[derive(Debug, Clone)]
pub struct CallDef {
    registry: Weak<RegistryInner>,
    pub pallet: String,
    pub pallet_index: u8,
    pub name: String,
    pub index: u8,
    pub fields: Vec<FieldDescriptor>,
    pub docs: Vec<String>,
}

impl CallDef {
    pub fn args(&self) -> Result<Vec<Field>, ResolutionError> {
        resolve_fields(&self.registry, &self.fields)
    }

    /// `pallet index ++ call index ++ args`, each argument read from JSON in
    /// declaration order.
    pub fn encode(&self, args: &[Json]) -> Result<Vec<u8>, RegistryError> {
        let fields = self.args()?;
        if args.len() != fields.len() {
            return Err(CodecError::LengthMismatch {
                expected: fields.len(),
                got: args.len(),
            }
            .into());
        }
        let mut out = vec![self.pallet_index, self.index];
        for (field, arg) in fields.iter().zip(args) {
            let value = field.codec.from_json(arg)?;
            field.codec.encode_to(&value, &mut out)?;
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct EventDef {
    registry: Weak<RegistryInner>,
    pub pallet: String,
    pub pallet_index: u8,
    pub name: String,
    pub index: u8,
    pub fields: Vec<FieldDescriptor>,
    pub docs: Vec<String>,
}

impl EventDef {
    pub fn fields(&self) -> Result<Vec<Field>, ResolutionError> {
        resolve_fields(&self.registry, &self.fields)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDef {
    pub pallet: String,
    pub pallet_index: u8,
    pub name: String,
    pub index: u8,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConstantDef {
    registry: Weak<RegistryInner>,
    pub pallet: String,
    pub name: String,
    pub ty: TypeId,
    pub value: Vec<u8>,
    pub docs: Vec<String>,
}

impl ConstantDef {
    pub fn codec(&self) -> Result<CodecRef, ResolutionError> {
        TypeRegistry::upgrade(&self.registry)?.resolve(self.ty)
    }

    pub fn decoded(&self) -> Result<TypedValue, RegistryError> {
        Ok(TypedValue::decode(self.codec()?, &self.value)?)
    }
}

/// One storage item with everything needed to build its keys and decode its
/// values.
#[derive(Debug, Clone)]
pub struct StorageEntryDef {
    registry: Weak<RegistryInner>,
    pub pallet: String,
    pub prefix: String,
    pub name: String,
    pub modifier: StorageModifier,
    pub ty: StorageEntryType,
    pub default: Vec<u8>,
    pub docs: Vec<String>,
}

impl StorageEntryDef {
    pub fn hashers(&self) -> &[StorageHasher] {
        self.ty.hashers()
    }

    pub fn is_map(&self) -> bool {
        matches!(self.ty, StorageEntryType::Map { .. })
    }

    /// `None` is returned for missing values rather than the default.
    pub fn is_optional(&self) -> bool {
        self.modifier == StorageModifier::Optional
    }

    /// One codec per key segment, matching [`Self::hashers`].
    pub fn keys(&self) -> Result<Vec<CodecRef>, ResolutionError> {
        let StorageEntryType::Map { hashers, key, .. } = &self.ty else {
            return Ok(Vec::new());
        };
        let codec = TypeRegistry::upgrade(&self.registry)?.resolve(*key)?;
        if hashers.len() == 1 {
            return Ok(vec![codec]);
        }
        match &*codec {
            Codec::Tuple(items) if items.len() == hashers.len() => Ok(items.clone()),
            other => Err(ResolutionError::cannot(
                format!("{}.{} key", self.prefix, self.name),
                format!(
                    "{} hashers but the key is {}",
                    hashers.len(),
                    other.name()
                ),
            )),
        }
    }

    pub fn value(&self) -> Result<CodecRef, ResolutionError> {
        TypeRegistry::upgrade(&self.registry)?.resolve(self.ty.value())
    }

    /// The value a missing entry reads as: `None` for optional entries,
    /// otherwise the decoded default bytes.
    pub fn default_value(&self) -> Result<Option<TypedValue>, RegistryError> {
        if self.is_optional() {
            return Ok(None);
        }
        Ok(Some(TypedValue::decode(self.value()?, &self.default)?))
    }
}

// ─── Section ────────────────────────────────────────────────────────────────

pub struct Section {
    registry: Weak<RegistryInner>,
    metadata: Arc<MetadataLatest>,
    position: usize,
    calls: OnceLock<IndexMap<String, CallDef>>,
    events: OnceLock<IndexMap<String, EventDef>>,
    errors: OnceLock<IndexMap<String, ErrorDef>>,
    constants: OnceLock<IndexMap<String, ConstantDef>>,
    storage: OnceLock<IndexMap<String, StorageEntryDef>>,
}

impl std::fmt::Debug for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Section")
            .field("pallet", &self.pallet().name)
            .field("index", &self.pallet().index)
            .finish()
    }
}

impl Section {
    pub(crate) fn new(
        registry: Weak<RegistryInner>,
        metadata: Arc<MetadataLatest>,
        position: usize,
    ) -> Self {
        Self {
            registry,
            metadata,
            position,
            calls: OnceLock::new(),
            events: OnceLock::new(),
            errors: OnceLock::new(),
            constants: OnceLock::new(),
            storage: OnceLock::new(),
        }
    }

    fn pallet(&self) -> &PalletMetadata {
        &self.metadata.pallets[self.position]
    }

    pub fn name(&self) -> &str {
        &self.pallet().name
    }

    pub fn index(&self) -> u8 {
        self.pallet().index
    }

    pub fn calls(&self) -> &IndexMap<String, CallDef> {
        self.calls.get_or_init(|| {
            let pallet = self.pallet();
            self.variants(pallet.calls)
                .map(|v| {
                    let def = CallDef {
                        registry: self.registry.clone(),
                        pallet: pallet.name.clone(),
                        pallet_index: pallet.index,
                        name: v.name.clone(),
                        index: v.index,
                        fields: v.fields.clone(),
                        docs: v.docs.clone(),
                    };
                    (v.name.clone(), def)
                })
                .collect()
        })
    }

    pub fn events(&self) -> &IndexMap<String, EventDef> {
        self.events.get_or_init(|| {
            let pallet = self.pallet();
            self.variants(pallet.events)
                .map(|v| {
                    let def = EventDef {
                        registry: self.registry.clone(),
                        pallet: pallet.name.clone(),
                        pallet_index: pallet.index,
                        name: v.name.clone(),
                        index: v.index,
                        fields: v.fields.clone(),
                        docs: v.docs.clone(),
                    };
                    (v.name.clone(), def)
                })
                .collect()
        })
    }

    pub fn errors(&self) -> &IndexMap<String, ErrorDef> {
        self.errors.get_or_init(|| {
            let pallet = self.pallet();
            self.variants(pallet.errors)
                .map(|v| {
                    let def = ErrorDef {
                        pallet: pallet.name.clone(),
                        pallet_index: pallet.index,
                        name: v.name.clone(),
                        index: v.index,
                        docs: v.docs.clone(),
                    };
                    (v.name.clone(), def)
                })
                .collect()
        })
    }

    pub fn constants(&self) -> &IndexMap<String, ConstantDef> {
        self.constants.get_or_init(|| {
            let pallet = self.pallet();
            pallet
                .constants
                .iter()
                .map(|c| {
                    let def = ConstantDef {
                        registry: self.registry.clone(),
                        pallet: pallet.name.clone(),
                        name: c.name.clone(),
                        ty: c.ty,
                        value: c.value.clone(),
                        docs: c.docs.clone(),
                    };
                    (c.name.clone(), def)
                })
                .collect()
        })
    }

    pub fn storage_entries(&self) -> &IndexMap<String, StorageEntryDef> {
        self.storage.get_or_init(|| {
            let pallet = self.pallet();
            let Some(storage) = &pallet.storage else {
                return IndexMap::new();
            };
            storage
                .entries
                .iter()
                .map(|e| {
                    let def = StorageEntryDef {
                        registry: self.registry.clone(),
                        pallet: pallet.name.clone(),
                        prefix: storage.prefix.clone(),
                        name: e.name.clone(),
                        modifier: e.modifier,
                        ty: e.ty.clone(),
                        default: e.default.clone(),
                        docs: e.docs.clone(),
                    };
                    (e.name.clone(), def)
                })
                .collect()
        })
    }

    pub fn call(&self, name: &str) -> Result<&CallDef, ResolutionError> {
        self.lookup(self.calls(), "call", name)
    }

    pub fn event(&self, name: &str) -> Result<&EventDef, ResolutionError> {
        self.lookup(self.events(), "event", name)
    }

    pub fn error(&self, name: &str) -> Result<&ErrorDef, ResolutionError> {
        self.lookup(self.errors(), "error", name)
    }

    pub fn error_by_index(&self, index: u8) -> Result<&ErrorDef, ResolutionError> {
        self.errors()
            .values()
            .find(|e| e.index == index)
            .ok_or_else(|| ResolutionError::UnknownEntry {
                pallet: self.name().to_string(),
                kind: "error",
                name: format!("#{index}"),
            })
    }

    pub fn constant(&self, name: &str) -> Result<&ConstantDef, ResolutionError> {
        self.lookup(self.constants(), "constant", name)
    }

    pub fn storage(&self, name: &str) -> Result<&StorageEntryDef, ResolutionError> {
        self.lookup(self.storage_entries(), "storage entry", name)
    }

    fn variants(
        &self,
        id: Option<TypeId>,
    ) -> impl Iterator<Item = &VariantDescriptor> {
        id.and_then(|id| self.metadata.types.variants(id))
            .unwrap_or_default()
            .iter()
    }

    /// Exact name first, then ignoring case and underscores so that
    /// `transfer_keep_alive` and `transferKeepAlive` find the same call.
    fn lookup<'s, T>(
        &self,
        table: &'s IndexMap<String, T>,
        kind: &'static str,
        name: &str,
    ) -> Result<&'s T, ResolutionError> {
        if let Some(item) = table.get(name) {
            return Ok(item);
        }
        let wanted = normalise(name);
        table
            .iter()
            .find(|(k, _)| normalise(k) == wanted)
            .map(|(_, v)| v)
            .ok_or_else(|| ResolutionError::UnknownEntry {
                pallet: self.name().to_string(),
                kind,
                name: name.to_string(),
            })
    }
}

fn normalise(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}
