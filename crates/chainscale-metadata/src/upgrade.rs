//! The one-directional upgrade chain: V9 → V10 → … → V14 → Latest.
//!
//! Each step is a pure function of the previous version. Steps never look
//! back, so supporting a new version only means adding the next step.

use std::collections::HashMap;

use chainscale_codec::Compact;
use tracing::debug;

use crate::error::MetadataError;
use crate::latest::{
    ConstantMetadata, ExtrinsicMetadata, FieldDescriptor, MetadataLatest, PalletMetadata,
    PalletStorage, PortableType, Primitive, SignedExtension, StorageEntry, StorageEntryType,
    TypeDescriptor, TypeGraph, TypeId, TypeParam, VariantDescriptor,
};
use crate::legacy::{
    ExtrinsicMetadata as LegacyExtrinsic, MetadataV10, MetadataV11, MetadataV12, MetadataV13,
    MetadataV9, ModuleMetadataV10, ModuleMetadataV12, ModuleMetadataV13, StorageEntryTypeV10,
    StorageEntryTypeV13, StorageEntryTypeV9, StorageEntryV10, StorageEntryV13,
    StorageMetadataV10, StorageMetadataV13,
};
use crate::v14::{
    ExtrinsicMetadataV14, MetadataV14, PalletConstantV14, PalletMetadataV14, PalletStorageV14,
    RawField, RawPortableType, RawType, RawTypeDef, RawVariant, SignedExtensionV14,
    StorageEntryTypeV14, StorageEntryV14,
};

/// Metadata at some point of the upgrade chain.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeMetadata {
    V9(MetadataV9),
    V10(MetadataV10),
    V11(MetadataV11),
    V12(MetadataV12),
    V13(MetadataV13),
    V14(MetadataV14),
    Latest(MetadataLatest),
}

impl RuntimeMetadata {
    /// Envelope version byte, `None` for the latest form.
    pub fn version(&self) -> Option<u8> {
        match self {
            Self::V9(_) => Some(9),
            Self::V10(_) => Some(10),
            Self::V11(_) => Some(11),
            Self::V12(_) => Some(12),
            Self::V13(_) => Some(13),
            Self::V14(_) => Some(14),
            Self::Latest(_) => None,
        }
    }

    /// Take one step along the chain. `Latest` stays where it is.
    pub fn advance(self, source_version: u8) -> Result<Self, MetadataError> {
        let from = self.version();
        let next = match self {
            Self::V9(m) => Self::V10(v9_to_v10(m)),
            Self::V10(m) => Self::V11(v10_to_v11(m)),
            Self::V11(m) => Self::V12(v11_to_v12(m)?),
            Self::V12(m) => Self::V13(v12_to_v13(m)),
            Self::V13(m) => Self::V14(v13_to_v14(m)?),
            Self::V14(m) => Self::Latest(v14_to_latest(m, source_version)?),
            latest @ Self::Latest(_) => return Ok(latest),
        };
        debug!(from = ?from, to = ?next.version(), "metadata upgraded one step");
        Ok(next)
    }

    /// Run every remaining step.
    pub fn into_latest(self) -> Result<MetadataLatest, MetadataError> {
        let source_version = match &self {
            Self::Latest(m) => m.source_version,
            other => other.version().unwrap_or_default(),
        };
        let mut current = self;
        loop {
            match current {
                Self::Latest(m) => return Ok(m),
                other => current = other.advance(source_version)?,
            }
        }
    }
}

// ─── V9 → V13 ───────────────────────────────────────────────────────────────

/// Remap hashers into the V10 table, which inserted `Blake2_128Concat`.
pub fn v9_to_v10(m: MetadataV9) -> MetadataV10 {
    let modules = m
        .modules
        .into_iter()
        .map(|module| ModuleMetadataV10 {
            name: module.name,
            storage: module.storage.map(|s| StorageMetadataV10 {
                prefix: s.prefix,
                entries: s
                    .entries
                    .into_iter()
                    .map(|e| StorageEntryV10 {
                        name: e.name,
                        modifier: e.modifier,
                        ty: match e.ty {
                            StorageEntryTypeV9::Plain(ty) => StorageEntryTypeV10::Plain(ty),
                            StorageEntryTypeV9::Map { hasher, key, value, linked } => {
                                StorageEntryTypeV10::Map {
                                    hasher: hasher.into(),
                                    key,
                                    value,
                                    linked,
                                }
                            }
                            StorageEntryTypeV9::DoubleMap { hasher, key1, key2, value, key2_hasher } => {
                                StorageEntryTypeV10::DoubleMap {
                                    hasher: hasher.into(),
                                    key1,
                                    key2,
                                    value,
                                    key2_hasher: key2_hasher.into(),
                                }
                            }
                        },
                        default: e.default,
                        docs: e.docs,
                    })
                    .collect(),
            }),
            calls: module.calls,
            events: module.events,
            constants: module.constants,
            errors: module.errors,
        })
        .collect();
    MetadataV10 { modules }
}

/// V11 introduced extrinsic metadata; older runtimes get an empty one.
pub fn v10_to_v11(m: MetadataV10) -> MetadataV11 {
    MetadataV11 {
        modules: m.modules,
        extrinsic: LegacyExtrinsic::default(),
    }
}

/// Module indices become explicit: each module keeps its list position.
pub fn v11_to_v12(m: MetadataV11) -> Result<MetadataV12, MetadataError> {
    let modules = m
        .modules
        .into_iter()
        .enumerate()
        .map(|(position, module)| {
            Ok(ModuleMetadataV12 {
                index: byte_index(position, || "modules".to_string())?,
                name: module.name,
                storage: module.storage,
                calls: module.calls,
                events: module.events,
                constants: module.constants,
                errors: module.errors,
            })
        })
        .collect::<Result<_, MetadataError>>()?;
    Ok(MetadataV12 {
        modules,
        extrinsic: m.extrinsic,
    })
}

/// Positions become one-byte indices; a list longer than 256 has no encoding.
fn byte_index(position: usize, context: impl FnOnce() -> String) -> Result<u8, MetadataError> {
    u8::try_from(position).map_err(|_| MetadataError::IndexOverflow {
        context: context(),
        position,
    })
}

pub fn v12_to_v13(m: MetadataV12) -> MetadataV13 {
    let modules = m
        .modules
        .into_iter()
        .map(|module| ModuleMetadataV13 {
            name: module.name,
            storage: module.storage.map(|s| StorageMetadataV13 {
                prefix: s.prefix,
                entries: s
                    .entries
                    .into_iter()
                    .map(|e| StorageEntryV13 {
                        name: e.name,
                        modifier: e.modifier,
                        ty: match e.ty {
                            StorageEntryTypeV10::Plain(ty) => StorageEntryTypeV13::Plain(ty),
                            StorageEntryTypeV10::Map { hasher, key, value, linked } => {
                                StorageEntryTypeV13::Map {
                                    hasher,
                                    key,
                                    value,
                                    unused: linked,
                                }
                            }
                            StorageEntryTypeV10::DoubleMap { hasher, key1, key2, value, key2_hasher } => {
                                StorageEntryTypeV13::DoubleMap {
                                    hasher,
                                    key1,
                                    key2,
                                    value,
                                    key2_hasher,
                                }
                            }
                        },
                        default: e.default,
                        docs: e.docs,
                    })
                    .collect(),
            }),
            calls: module.calls,
            events: module.events,
            constants: module.constants,
            errors: module.errors,
            index: module.index,
        })
        .collect();
    MetadataV13 {
        modules,
        extrinsic: m.extrinsic,
    }
}

// ─── V13 → V14 ──────────────────────────────────────────────────────────────

/// Accumulates the synthesized type table. Textual names are interned per
/// declaring pallet so the same name maps to one node within a pallet.
#[derive(Default)]
struct TableBuilder {
    types: Vec<RawPortableType>,
    historic: HashMap<(String, String), u32>,
    unit: Option<u32>,
}

impl TableBuilder {
    fn push(&mut self, path: Vec<String>, def: RawTypeDef, docs: Vec<String>) -> Compact<u32> {
        let id = self.types.len() as u32;
        self.types.push(RawPortableType {
            id: Compact(id),
            ty: RawType {
                path,
                type_params: Vec::new(),
                def,
                docs,
            },
        });
        Compact(id)
    }

    /// Historic node for `name` declared in `pallet` (empty for runtime-wide
    /// names).
    fn historic(&mut self, pallet: &str, name: &str) -> Compact<u32> {
        let key = (pallet.to_string(), name.to_string());
        if let Some(id) = self.historic.get(&key) {
            return Compact(*id);
        }
        let path = if pallet.is_empty() { Vec::new() } else { vec![pallet.to_string()] };
        let id = self.push(path, RawTypeDef::Historic(name.to_string()), Vec::new());
        self.historic.insert(key, id.0);
        id
    }

    /// Key type for a multi-segment storage map.
    fn key_tuple(&mut self, pallet: &str, keys: &[String]) -> Compact<u32> {
        if let [single] = keys {
            return self.historic(pallet, single);
        }
        let elems = keys.iter().map(|k| self.historic(pallet, k)).collect();
        self.push(Vec::new(), RawTypeDef::Tuple(elems), Vec::new())
    }

    fn unit(&mut self) -> Compact<u32> {
        if let Some(id) = self.unit {
            return Compact(id);
        }
        let id = self.push(Vec::new(), RawTypeDef::Tuple(Vec::new()), Vec::new());
        self.unit = Some(id.0);
        id
    }
}

/// Build a portable type table from the textual V13 schema.
pub fn v13_to_v14(m: MetadataV13) -> Result<MetadataV14, MetadataError> {
    let mut table = TableBuilder::default();
    let mut pallets = Vec::with_capacity(m.modules.len());

    for module in m.modules {
        let pallet = module.name.clone();

        let calls = module
            .calls
            .map(|calls| -> Result<_, MetadataError> {
                let variants = calls
                    .into_iter()
                    .enumerate()
                    .map(|(index, call)| {
                        Ok(RawVariant {
                            index: byte_index(index, || format!("{pallet} calls"))?,
                            name: call.name,
                            fields: call
                                .args
                                .into_iter()
                                .map(|arg| RawField {
                                    name: Some(arg.name),
                                    ty: table.historic(&pallet, &arg.ty),
                                    type_name: Some(arg.ty),
                                    docs: Vec::new(),
                                })
                                .collect(),
                            docs: call.docs,
                        })
                    })
                    .collect::<Result<_, MetadataError>>()?;
                Ok(table.push(
                    vec![pallet.clone(), "Call".into()],
                    RawTypeDef::Variant(variants),
                    Vec::new(),
                ))
            })
            .transpose()?;

        let events = module
            .events
            .map(|events| -> Result<_, MetadataError> {
                let variants = events
                    .into_iter()
                    .enumerate()
                    .map(|(index, event)| {
                        Ok(RawVariant {
                            index: byte_index(index, || format!("{pallet} events"))?,
                            name: event.name,
                            fields: event
                                .args
                                .into_iter()
                                .map(|arg| RawField {
                                    name: None,
                                    ty: table.historic(&pallet, &arg),
                                    type_name: Some(arg),
                                    docs: Vec::new(),
                                })
                                .collect(),
                            docs: event.docs,
                        })
                    })
                    .collect::<Result<_, MetadataError>>()?;
                Ok(table.push(
                    vec![pallet.clone(), "Event".into()],
                    RawTypeDef::Variant(variants),
                    Vec::new(),
                ))
            })
            .transpose()?;

        let errors = if module.errors.is_empty() {
            None
        } else {
            let variants = module
                .errors
                .into_iter()
                .enumerate()
                .map(|(index, error)| {
                    Ok(RawVariant {
                        index: byte_index(index, || format!("{pallet} errors"))?,
                        name: error.name,
                        fields: Vec::new(),
                        docs: error.docs,
                    })
                })
                .collect::<Result<_, MetadataError>>()?;
            Some(table.push(
                vec![pallet.clone(), "Error".into()],
                RawTypeDef::Variant(variants),
                Vec::new(),
            ))
        };

        let constants = module
            .constants
            .into_iter()
            .map(|c| PalletConstantV14 {
                ty: table.historic(&pallet, &c.ty),
                name: c.name,
                value: c.value,
                docs: c.docs,
            })
            .collect();

        let storage = module.storage.map(|s| PalletStorageV14 {
            prefix: s.prefix,
            entries: s
                .entries
                .into_iter()
                .map(|e| StorageEntryV14 {
                    ty: match e.ty {
                        StorageEntryTypeV13::Plain(ty) => {
                            StorageEntryTypeV14::Plain(table.historic(&pallet, &ty))
                        }
                        StorageEntryTypeV13::Map { hasher, key, value, .. } => {
                            StorageEntryTypeV14::Map {
                                hashers: vec![hasher],
                                key: table.historic(&pallet, &key),
                                value: table.historic(&pallet, &value),
                            }
                        }
                        StorageEntryTypeV13::DoubleMap { hasher, key1, key2, value, key2_hasher } => {
                            StorageEntryTypeV14::Map {
                                hashers: vec![hasher, key2_hasher],
                                key: table.key_tuple(&pallet, &[key1, key2]),
                                value: table.historic(&pallet, &value),
                            }
                        }
                        StorageEntryTypeV13::NMap { keys, hashers, value } => {
                            StorageEntryTypeV14::Map {
                                hashers,
                                key: table.key_tuple(&pallet, &keys),
                                value: table.historic(&pallet, &value),
                            }
                        }
                    },
                    name: e.name,
                    modifier: e.modifier,
                    default: e.default,
                    docs: e.docs,
                })
                .collect(),
        });

        pallets.push(PalletMetadataV14 {
            name: module.name,
            storage,
            calls,
            events,
            constants,
            errors,
            index: module.index,
        });
    }

    let signed_extensions = m
        .extrinsic
        .signed_extensions
        .into_iter()
        .map(|identifier| SignedExtensionV14 {
            identifier,
            ty: table.unit(),
            additional_signed: table.unit(),
        })
        .collect();
    let extrinsic = ExtrinsicMetadataV14 {
        ty: table.historic("", "Extrinsic"),
        version: m.extrinsic.version,
        signed_extensions,
    };
    let runtime = table.push(vec!["Runtime".into()], RawTypeDef::Composite(Vec::new()), Vec::new());

    Ok(MetadataV14 {
        types: table.types,
        pallets,
        extrinsic,
        ty: runtime,
    })
}

// ─── V14 → Latest ───────────────────────────────────────────────────────────

/// Expands raw table entries into canonical descriptors. Nodes synthesized
/// during expansion are appended after the declared ids.
struct Expander {
    declared: u32,
    appended: Vec<PortableType>,
    bytes: Option<TypeId>,
}

impl Expander {
    fn append(&mut self, descriptor: TypeDescriptor) -> TypeId {
        let id = self.declared + self.appended.len() as u32;
        self.appended.push(PortableType {
            id,
            descriptor,
            path: Vec::new(),
            params: Vec::new(),
            docs: Vec::new(),
            display_name: None,
            fallback: None,
        });
        id
    }

    /// `Vec<u8>`, the fallback for opaque values kept undecoded on chain.
    fn bytes_fallback(&mut self) -> TypeId {
        if let Some(id) = self.bytes {
            return id;
        }
        let byte = self.append(TypeDescriptor::Primitive { primitive: Primitive::U8 });
        let id = self.append(TypeDescriptor::Sequence { elem: byte });
        self.bytes = Some(id);
        id
    }

    fn expand(&mut self, id: TypeId, ty: RawType) -> PortableType {
        let params: Vec<TypeParam> = ty
            .type_params
            .into_iter()
            .map(|p| TypeParam {
                name: p.name,
                ty: p.ty.map(|c| c.0),
            })
            .collect();
        let first = params.first().and_then(|p| p.ty);
        let second = params.get(1).and_then(|p| p.ty);
        let last = ty.path.last().map(String::as_str);
        let mut fallback = None;

        let descriptor = match ty.def {
            RawTypeDef::Variant(variants) => match (last, first, second) {
                (Some("Option"), Some(inner), _) => TypeDescriptor::Option { ty: inner },
                (Some("Result"), Some(ok), Some(err)) => TypeDescriptor::Result { ok, err },
                _ => TypeDescriptor::Variant {
                    variants: variants.into_iter().map(variant).collect(),
                },
            },
            RawTypeDef::Composite(fields) => match (last, first, second) {
                (Some("BTreeMap"), Some(key), Some(value)) => TypeDescriptor::Map { key, value },
                (Some("BTreeSet"), Some(elem), _) => TypeDescriptor::Sequence { elem },
                (Some("WrapperOpaque"), Some(inner), _) => TypeDescriptor::Opaque { ty: inner },
                (Some("WrapperKeepOpaque"), Some(inner), _) => {
                    fallback = Some(self.bytes_fallback());
                    TypeDescriptor::Opaque { ty: inner }
                }
                _ => TypeDescriptor::Composite {
                    fields: fields.into_iter().map(field).collect(),
                },
            },
            RawTypeDef::Sequence(elem) => TypeDescriptor::Sequence { elem: elem.0 },
            RawTypeDef::Array { len, ty } => TypeDescriptor::FixedArray { len, elem: ty.0 },
            RawTypeDef::Tuple(elems) => TypeDescriptor::Tuple {
                elems: elems.into_iter().map(|c| c.0).collect(),
            },
            RawTypeDef::Primitive(primitive) => TypeDescriptor::Primitive { primitive },
            RawTypeDef::Compact(inner) => TypeDescriptor::Compact { ty: inner.0 },
            RawTypeDef::BitSequence { store, order } => TypeDescriptor::BitSequence {
                store: store.0,
                order: order.0,
            },
            RawTypeDef::Historic(name) => TypeDescriptor::Historic {
                name,
                scope: ty.path.first().cloned(),
            },
        };

        let display_name = match &descriptor {
            TypeDescriptor::Historic { name, .. } => Some(name.clone()),
            _ => ty.path.last().cloned(),
        };

        PortableType {
            id,
            descriptor,
            path: ty.path,
            params,
            docs: ty.docs,
            display_name,
            fallback,
        }
    }
}

fn field(f: RawField) -> FieldDescriptor {
    FieldDescriptor {
        name: f.name,
        ty: f.ty.0,
        type_name: f.type_name,
        docs: f.docs,
    }
}

fn variant(v: RawVariant) -> VariantDescriptor {
    VariantDescriptor {
        name: v.name,
        index: v.index,
        fields: v.fields.into_iter().map(field).collect(),
        docs: v.docs,
    }
}

fn check_id(total: u32, id: TypeId, context: impl FnOnce() -> String) -> Result<TypeId, MetadataError> {
    if id < total {
        Ok(id)
    } else {
        Err(MetadataError::UnknownTypeId {
            id,
            context: context(),
        })
    }
}

/// Expand the raw table and validate every type reference.
pub fn v14_to_latest(m: MetadataV14, source_version: u8) -> Result<MetadataLatest, MetadataError> {
    let mut expander = Expander {
        declared: m.types.len() as u32,
        appended: Vec::new(),
        bytes: None,
    };
    let mut types = Vec::with_capacity(m.types.len());
    for (position, portable) in m.types.into_iter().enumerate() {
        let id = portable.id.0;
        if id as usize != position {
            return Err(MetadataError::NonDenseTypeIds { position, id });
        }
        types.push(expander.expand(id, portable.ty));
    }
    types.append(&mut expander.appended);
    let total = types.len() as u32;

    for ty in &types {
        for reference in ty.descriptor.references().into_iter().chain(ty.fallback) {
            check_id(total, reference, || format!("type {}", ty.id))?;
        }
    }

    let pallets = m
        .pallets
        .into_iter()
        .map(|p| expand_pallet(total, p))
        .collect::<Result<Vec<_>, _>>()?;
    let extrinsic = expand_extrinsic(total, m.extrinsic)?;
    let runtime_type = Some(check_id(total, m.ty.0, || "runtime type".into())?);

    Ok(MetadataLatest {
        source_version,
        types: TypeGraph::from_types(types),
        pallets,
        extrinsic,
        runtime_type,
    })
}

fn expand_pallet(total: u32, p: PalletMetadataV14) -> Result<PalletMetadata, MetadataError> {
    let name = p.name;
    let check = |id: Compact<u32>, what: &str| {
        check_id(total, id.0, || format!("{name} {what}"))
    };

    let calls = p.calls.map(|c| check(c, "calls")).transpose()?;
    let events = p.events.map(|c| check(c, "events")).transpose()?;
    let errors = p.errors.map(|c| check(c, "errors")).transpose()?;

    let constants = p
        .constants
        .into_iter()
        .map(|c| -> Result<ConstantMetadata, MetadataError> {
            Ok(ConstantMetadata {
                ty: check(c.ty, &format!("constant {}", c.name))?,
                name: c.name,
                value: c.value,
                docs: c.docs,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let storage = match p.storage {
        None => None,
        Some(s) => {
            let entries = s
                .entries
                .into_iter()
                .map(|e| -> Result<StorageEntry, MetadataError> {
                    let what = format!("storage {}", e.name);
                    let ty = match e.ty {
                        StorageEntryTypeV14::Plain(value) => StorageEntryType::Plain {
                            value: check(value, &what)?,
                        },
                        StorageEntryTypeV14::Map { hashers, key, value } => StorageEntryType::Map {
                            hashers,
                            key: check(key, &what)?,
                            value: check(value, &what)?,
                        },
                    };
                    Ok(StorageEntry {
                        name: e.name,
                        modifier: e.modifier,
                        ty,
                        default: e.default,
                        docs: e.docs,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Some(PalletStorage {
                prefix: s.prefix,
                entries,
            })
        }
    };

    Ok(PalletMetadata {
        name,
        index: p.index,
        storage,
        calls,
        events,
        errors,
        constants,
    })
}

fn expand_extrinsic(total: u32, e: ExtrinsicMetadataV14) -> Result<ExtrinsicMetadata, MetadataError> {
    let signed_extensions = e
        .signed_extensions
        .into_iter()
        .map(|ext| -> Result<SignedExtension, MetadataError> {
            let context = || format!("signed extension {}", ext.identifier);
            Ok(SignedExtension {
                ty: check_id(total, ext.ty.0, context)?,
                additional_signed: check_id(total, ext.additional_signed.0, context)?,
                identifier: ext.identifier.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ExtrinsicMetadata {
        ty: Some(check_id(total, e.ty.0, || "extrinsic".into())?),
        version: e.version,
        signed_extensions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::{FunctionArgument, FunctionMetadata};
    use crate::storage::{StorageHasher, StorageModifier};
    use crate::v14::RawTypeParameter;

    fn raw(id: u32, path: &[&str], params: &[(&str, u32)], def: RawTypeDef) -> RawPortableType {
        RawPortableType {
            id: Compact(id),
            ty: RawType {
                path: path.iter().map(|s| s.to_string()).collect(),
                type_params: params
                    .iter()
                    .map(|(name, ty)| RawTypeParameter {
                        name: name.to_string(),
                        ty: Some(Compact(*ty)),
                    })
                    .collect(),
                def,
                docs: vec![],
            },
        }
    }

    fn empty_extrinsic() -> ExtrinsicMetadataV14 {
        ExtrinsicMetadataV14 {
            ty: Compact(0),
            version: 4,
            signed_extensions: vec![],
        }
    }

    #[test]
    fn historic_names_are_interned_per_pallet() {
        let module = |name: &str, index| ModuleMetadataV13 {
            name: name.into(),
            storage: None,
            calls: Some(vec![FunctionMetadata {
                name: "transfer".into(),
                args: vec![
                    FunctionArgument { name: "dest".into(), ty: "AccountId".into() },
                    FunctionArgument { name: "source".into(), ty: "AccountId".into() },
                ],
                docs: vec![],
            }]),
            events: None,
            constants: vec![],
            errors: vec![],
            index,
        };
        let v14 = v13_to_v14(MetadataV13 {
            modules: vec![module("Balances", 5), module("Assets", 6)],
            extrinsic: LegacyExtrinsic::default(),
        })
        .unwrap();
        let historic: Vec<_> = v14
            .types
            .iter()
            .filter_map(|t| match &t.ty.def {
                RawTypeDef::Historic(name) => Some((t.ty.path.clone(), name.clone())),
                _ => None,
            })
            .collect();
        assert!(historic.contains(&(vec!["Balances".to_string()], "AccountId".to_string())));
        assert!(historic.contains(&(vec!["Assets".to_string()], "AccountId".to_string())));
        assert_eq!(
            historic.iter().filter(|(_, n)| n == "AccountId").count(),
            2,
            "one AccountId node per pallet"
        );
    }

    #[test]
    fn more_than_256_modules_is_an_error() {
        let module = |i: usize| ModuleMetadataV10 {
            name: format!("Pallet{i}"),
            storage: None,
            calls: None,
            events: None,
            constants: vec![],
            errors: vec![],
        };
        let fits = MetadataV11 {
            modules: (0..256).map(module).collect(),
            extrinsic: LegacyExtrinsic::default(),
        };
        let v12 = v11_to_v12(fits).unwrap();
        assert_eq!(v12.modules.last().map(|m| m.index), Some(255));

        let overflow = MetadataV11 {
            modules: (0..257).map(module).collect(),
            extrinsic: LegacyExtrinsic::default(),
        };
        let err = RuntimeMetadata::V11(overflow).into_latest().unwrap_err();
        assert!(matches!(
            err,
            MetadataError::IndexOverflow { ref context, position: 256 } if context == "modules"
        ));
    }

    #[test]
    fn more_than_256_errors_is_an_error() {
        let v13 = MetadataV13 {
            modules: vec![ModuleMetadataV13 {
                name: "Huge".into(),
                storage: None,
                calls: None,
                events: None,
                constants: vec![],
                errors: (0..300)
                    .map(|i| crate::legacy::ErrorMetadata {
                        name: format!("E{i}"),
                        docs: vec![],
                    })
                    .collect(),
                index: 0,
            }],
            extrinsic: LegacyExtrinsic::default(),
        };
        assert!(matches!(
            v13_to_v14(v13),
            Err(MetadataError::IndexOverflow { position: 256, .. })
        ));
    }

    #[test]
    fn double_map_key_becomes_tuple() {
        let v13 = MetadataV13 {
            modules: vec![ModuleMetadataV13 {
                name: "Staking".into(),
                storage: Some(StorageMetadataV13 {
                    prefix: "Staking".into(),
                    entries: vec![StorageEntryV13 {
                        name: "ErasStakers".into(),
                        modifier: StorageModifier::Default,
                        ty: StorageEntryTypeV13::DoubleMap {
                            hasher: StorageHasher::Twox64Concat,
                            key1: "EraIndex".into(),
                            key2: "AccountId".into(),
                            value: "Exposure".into(),
                            key2_hasher: StorageHasher::Twox64Concat,
                        },
                        default: vec![0],
                        docs: vec![],
                    }],
                }),
                calls: None,
                events: None,
                constants: vec![],
                errors: vec![],
                index: 7,
            }],
            extrinsic: LegacyExtrinsic::default(),
        };
        let latest = RuntimeMetadata::V13(v13).into_latest().unwrap();
        assert_eq!(latest.source_version, 13);
        let entry = &latest.pallets[0].storage.as_ref().unwrap().entries[0];
        let StorageEntryType::Map { hashers, key, .. } = &entry.ty else {
            panic!("expected map");
        };
        assert_eq!(hashers.len(), 2);
        let TypeDescriptor::Tuple { elems } = &latest.types.get(*key).unwrap().descriptor else {
            panic!("expected tuple key");
        };
        assert_eq!(elems.len(), 2);
    }

    #[test]
    fn std_wrappers_are_recognised_by_path() {
        let v14 = MetadataV14 {
            types: vec![
                raw(0, &[], &[], RawTypeDef::Primitive(Primitive::U32)),
                raw(1, &["Option"], &[("T", 0)], RawTypeDef::Variant(vec![])),
                raw(2, &["Result"], &[("T", 0), ("E", 0)], RawTypeDef::Variant(vec![])),
                raw(3, &["BTreeMap"], &[("K", 0), ("V", 0)], RawTypeDef::Composite(vec![])),
                raw(4, &["BTreeSet"], &[("T", 0)], RawTypeDef::Composite(vec![])),
                raw(
                    5,
                    &["frame_support", "traits", "misc", "WrapperKeepOpaque"],
                    &[("T", 0)],
                    RawTypeDef::Composite(vec![]),
                ),
            ],
            pallets: vec![],
            extrinsic: empty_extrinsic(),
            ty: Compact(0),
        };
        let latest = v14_to_latest(v14, 14).unwrap();
        let d = |id| latest.types.get(id).unwrap().descriptor.clone();
        assert_eq!(d(1), TypeDescriptor::Option { ty: 0 });
        assert_eq!(d(2), TypeDescriptor::Result { ok: 0, err: 0 });
        assert_eq!(d(3), TypeDescriptor::Map { key: 0, value: 0 });
        assert_eq!(d(4), TypeDescriptor::Sequence { elem: 0 });
        assert_eq!(d(5), TypeDescriptor::Opaque { ty: 0 });

        let fallback = latest.types.get(5).unwrap().fallback.unwrap();
        let TypeDescriptor::Sequence { elem } = d(fallback) else {
            panic!("fallback must be a byte sequence");
        };
        assert_eq!(d(elem), TypeDescriptor::Primitive { primitive: Primitive::U8 });
        assert_eq!(latest.types.len(), 8);
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let v14 = MetadataV14 {
            types: vec![raw(0, &[], &[], RawTypeDef::Sequence(Compact(9)))],
            pallets: vec![],
            extrinsic: empty_extrinsic(),
            ty: Compact(0),
        };
        assert!(matches!(
            v14_to_latest(v14, 14),
            Err(MetadataError::UnknownTypeId { id: 9, .. })
        ));
    }

    #[test]
    fn ids_must_be_dense() {
        let v14 = MetadataV14 {
            types: vec![raw(1, &[], &[], RawTypeDef::Primitive(Primitive::Bool))],
            pallets: vec![],
            extrinsic: empty_extrinsic(),
            ty: Compact(0),
        };
        assert!(matches!(
            v14_to_latest(v14, 14),
            Err(MetadataError::NonDenseTypeIds { position: 0, id: 1 })
        ));
    }

    #[test]
    fn latest_is_a_fixed_point() {
        let latest = MetadataLatest {
            source_version: 14,
            ..Default::default()
        };
        let again = RuntimeMetadata::Latest(latest.clone()).advance(9).unwrap();
        assert_eq!(again, RuntimeMetadata::Latest(latest));
    }
}
