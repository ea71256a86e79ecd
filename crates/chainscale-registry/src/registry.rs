//! The per-connection type registry.
//!
//! Codecs are built bottom-up on first request and memoized by canonical
//! signature: `#<id>` for graph types, the normalised type name (after
//! pallet aliases are applied) for textual ones. The same request always
//! returns the same `Arc`. Cycles are closed with
//! [`Codec::Recursive`] references bound once the outer type is built.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chainscale_codec::{
    BitOrder, Codec, CodecError, CodecRef, Field, Integer, RecursiveRef, Value, VariantDef,
};
use chainscale_metadata::{
    FieldDescriptor, MetadataLatest, PalletMetadata, PortableType, Primitive, TypeDescriptor,
    TypeId,
};
use serde_json::Value as Json;
use tracing::{debug, trace};

use crate::builtins;
use crate::definition::{Definitions, TypeDefinition, VariantPayload};
use crate::error::{RegistryError, ResolutionError};
use crate::section::{ErrorDef, Section};
use crate::typename::TypeName;

/// What to resolve: a graph id or a textual type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Id(TypeId),
    Name(String),
}

impl From<TypeId> for TypeRef {
    fn from(id: TypeId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for TypeRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// A runtime event split into its pallet and event names.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub pallet: String,
    pub event: String,
    pub args: Value,
    /// Bytes consumed from the input.
    pub consumed: usize,
}

pub(crate) struct RegistryInner {
    pub(crate) metadata: Arc<MetadataLatest>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    closed: bool,
    cache: HashMap<String, CodecRef>,
    /// Keys under construction; a nested request for one of them gets a
    /// recursive reference, bound when the outer build completes.
    building: HashMap<String, Option<RecursiveRef>>,
    /// Keys cached during the current top-level resolution, dropped again
    /// if it fails.
    journal: Vec<String>,
    definitions: Definitions,
    aliases: HashMap<String, HashMap<String, TypeName>>,
    sections: HashMap<String, Arc<Section>>,
    graph_names: Option<HashMap<String, Option<TypeId>>>,
}

/// Type registry for one connection and one metadata version. Cheap to
/// clone; clones share caches. Replaced, never mutated, when the runtime
/// upgrades.
#[derive(Clone)]
pub struct TypeRegistry {
    inner: Arc<RegistryInner>,
}

impl TypeRegistry {
    pub fn new(metadata: impl Into<Arc<MetadataLatest>>) -> Self {
        let mut state = State::default();
        for (pallet, renames) in builtins::default_aliases() {
            let parsed = renames
                .into_iter()
                .filter_map(|(from, to)| TypeName::parse(&to).ok().map(|to| (from, to)))
                .collect();
            state.aliases.insert(pallet, parsed);
        }
        Self {
            inner: Arc::new(RegistryInner {
                metadata: metadata.into(),
                state: Mutex::new(state),
            }),
        }
    }

    /// A registry with no pallets; only textual types resolve.
    pub fn empty() -> Self {
        Self::new(MetadataLatest::default())
    }

    pub fn metadata(&self) -> &Arc<MetadataLatest> {
        &self.inner.metadata
    }

    pub(crate) fn downgrade(&self) -> Weak<RegistryInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<RegistryInner>) -> Result<Self, ResolutionError> {
        weak.upgrade()
            .map(|inner| Self { inner })
            .ok_or(ResolutionError::RegistryClosed)
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, ResolutionError> {
        let state = self.inner.state.lock().unwrap();
        if state.closed {
            return Err(ResolutionError::RegistryClosed);
        }
        Ok(state)
    }

    // ─── Resolution ─────────────────────────────────────────────────────────

    pub fn resolve(&self, ty: impl Into<TypeRef>) -> Result<CodecRef, ResolutionError> {
        match ty.into() {
            TypeRef::Id(id) => self.with_resolver(|r| r.by_id(id)),
            TypeRef::Name(name) => {
                let parsed = TypeName::parse(&name)?;
                self.with_resolver(|r| r.by_name(None, &parsed))
            }
        }
    }

    /// Resolve `name` as declared inside `pallet`, applying its aliases.
    pub fn resolve_in(&self, pallet: &str, name: &str) -> Result<CodecRef, ResolutionError> {
        let parsed = TypeName::parse(name)?;
        self.with_resolver(|r| r.by_name(Some(pallet), &parsed))
    }

    fn with_resolver<T>(
        &self,
        f: impl FnOnce(&mut Resolver<'_>) -> Result<T, ResolutionError>,
    ) -> Result<T, ResolutionError> {
        let mut state = self.state()?;
        state.journal.clear();
        let mut resolver = Resolver {
            metadata: &self.inner.metadata,
            state: &mut state,
        };
        let result = f(&mut resolver);
        let journal = std::mem::take(&mut state.journal);
        if let Err(err) = &result {
            debug!(error = %err, dropped = journal.len(), "type resolution failed");
            for key in journal {
                state.cache.remove(&key);
            }
        }
        result
    }

    // ─── Configuration ──────────────────────────────────────────────────────

    /// Add a JSON type bundle. Later definitions win; the codec cache is
    /// cleared so nothing built from older definitions is handed out.
    pub fn register_types(&self, bundle: &Json) -> Result<usize, ResolutionError> {
        let defs = Definitions::from_json(bundle)?;
        let count = defs.len();
        let mut state = self.state()?;
        state.definitions.extend(defs);
        state.cache.clear();
        debug!(count, "registered type definitions");
        Ok(count)
    }

    /// Inside `pallet`, resolve `from` as `to`.
    pub fn set_alias(&self, pallet: &str, from: &str, to: &str) -> Result<(), ResolutionError> {
        let to = TypeName::parse(to)?;
        let mut state = self.state()?;
        state
            .aliases
            .entry(pallet.to_lowercase())
            .or_default()
            .insert(from.to_string(), to);
        state.cache.clear();
        Ok(())
    }

    // ─── Pallet surface ─────────────────────────────────────────────────────

    /// Lazily built surface of one pallet. Lookup by exact name first, then
    /// case-insensitively.
    pub fn section(&self, pallet: &str) -> Result<Arc<Section>, ResolutionError> {
        let found = self
            .inner
            .metadata
            .pallet(pallet)
            .ok_or_else(|| ResolutionError::UnknownPallet(pallet.to_string()))?;
        self.section_for(found)
    }

    pub fn section_by_index(&self, index: u8) -> Result<Arc<Section>, ResolutionError> {
        let found = self
            .inner
            .metadata
            .pallet_by_index(index)
            .ok_or_else(|| ResolutionError::UnknownPallet(format!("#{index}")))?;
        self.section_for(found)
    }

    fn section_for(&self, pallet: &PalletMetadata) -> Result<Arc<Section>, ResolutionError> {
        let mut state = self.state()?;
        if let Some(section) = state.sections.get(&pallet.name) {
            return Ok(section.clone());
        }
        let position = self
            .inner
            .metadata
            .pallets
            .iter()
            .position(|p| p.name == pallet.name)
            .ok_or_else(|| ResolutionError::UnknownPallet(pallet.name.clone()))?;
        let section = Arc::new(Section::new(
            self.downgrade(),
            self.inner.metadata.clone(),
            position,
        ));
        state.sections.insert(pallet.name.clone(), section.clone());
        debug!(pallet = %pallet.name, "pallet section created");
        Ok(section)
    }

    /// Decode one `(pallet index, event index, args)` runtime event from the
    /// front of `bytes`.
    pub fn decode_event(&self, bytes: &[u8]) -> Result<DecodedEvent, RegistryError> {
        let codec = self.resolve("Event")?;
        let (value, consumed) = codec.decode_prefix(bytes)?;
        let shape_error = |got: &Value| CodecError::TypeMismatch {
            expected: "pallet event".into(),
            got: got.kind().into(),
        };
        let (pallet, inner) = match value {
            Value::Variant { name, value, .. } => (name, value),
            other => return Err(shape_error(&other).into()),
        };
        let (event, args) = match *inner {
            Value::Variant { name, value, .. } => (name, value),
            other => return Err(shape_error(&other).into()),
        };
        Ok(DecodedEvent {
            pallet,
            event,
            args: *args,
            consumed,
        })
    }

    /// Look up a module error by pallet index and error index.
    pub fn find_error(&self, pallet_index: u8, error_index: u8) -> Result<ErrorDef, ResolutionError> {
        let section = self.section_by_index(pallet_index)?;
        section.error_by_index(error_index).cloned()
    }

    // ─── Introspection and teardown ─────────────────────────────────────────

    pub fn cached_len(&self) -> usize {
        self.inner.state.lock().unwrap().cache.len()
    }

    pub fn sections_built(&self) -> usize {
        self.inner.state.lock().unwrap().sections.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().unwrap().closed
    }

    /// Drop every cached codec and section. Further resolution fails with
    /// [`ResolutionError::RegistryClosed`] and recursive references into
    /// this registry become dangling.
    pub fn close(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        let cached = state.cache.len();
        state.cache.clear();
        state.sections.clear();
        state.building.clear();
        debug!(cached, "type registry closed");
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("pallets", &self.inner.metadata.pallets.len())
            .field("types", &self.inner.metadata.types.len())
            .finish()
    }
}

// ─── Resolver ───────────────────────────────────────────────────────────────

enum RuntimeEnum {
    Call,
    Event,
}

struct Resolver<'a> {
    metadata: &'a MetadataLatest,
    state: &'a mut State,
}

impl<'a> Resolver<'a> {
    fn memo(
        &mut self,
        key: String,
        build: impl FnOnce(&mut Self) -> Result<CodecRef, ResolutionError>,
    ) -> Result<CodecRef, ResolutionError> {
        if let Some(codec) = self.state.cache.get(&key) {
            trace!(%key, "type cache hit");
            return Ok(codec.clone());
        }
        if let Some(slot) = self.state.building.get_mut(&key) {
            let link = slot.get_or_insert_with(|| RecursiveRef::new(key.clone())).clone();
            return Ok(Arc::new(Codec::Recursive(link)));
        }

        self.state.building.insert(key.clone(), None);
        let result = build(self);
        let link = self.state.building.remove(&key).flatten();
        let codec = result?;
        if let Some(link) = link {
            link.bind(&codec);
        }
        trace!(%key, codec = %codec.name(), "type built");
        self.state.cache.insert(key.clone(), codec.clone());
        self.state.journal.push(key);
        Ok(codec)
    }

    fn by_id(&mut self, id: TypeId) -> Result<CodecRef, ResolutionError> {
        self.memo(format!("#{id}"), |r| r.build_id(id))
    }

    fn by_name(&mut self, scope: Option<&str>, name: &TypeName) -> Result<CodecRef, ResolutionError> {
        let name = match scope {
            Some(pallet) => self.apply_aliases(&pallet.to_lowercase(), name),
            None => name.clone(),
        };
        self.memo(name.signature(), |r| r.build_name(&name))
    }

    fn apply_aliases(&self, pallet: &str, name: &TypeName) -> TypeName {
        let Some(renames) = self.state.aliases.get(pallet) else {
            return name.clone();
        };
        rewrite(renames, name)
    }

    // ─── Graph types ────────────────────────────────────────────────────────

    fn build_id(&mut self, id: TypeId) -> Result<CodecRef, ResolutionError> {
        let metadata = self.metadata;
        let ty = metadata
            .types
            .get(id)
            .ok_or(ResolutionError::UnknownTypeId(id))?;
        let primary = self.build_descriptor(ty)?;
        match ty.fallback {
            Some(fallback) => Ok(Arc::new(Codec::Fallback {
                primary,
                fallback: self.by_id(fallback)?,
            })),
            None => Ok(primary),
        }
    }

    fn build_descriptor(&mut self, ty: &'a PortableType) -> Result<CodecRef, ResolutionError> {
        let codec = match &ty.descriptor {
            TypeDescriptor::Primitive { primitive } => primitive_codec(*primitive),
            TypeDescriptor::Compact { ty: inner } => {
                let inner = self.by_id(*inner)?;
                compact_of(&format!("#{}", ty.id), &inner)?
            }
            TypeDescriptor::Composite { fields } if fields.is_empty() => Codec::Null,
            TypeDescriptor::Composite { fields } => Codec::Struct(self.graph_fields(fields)?),
            TypeDescriptor::Variant { variants } => Codec::Variant(
                variants
                    .iter()
                    .map(|v| {
                        Ok(VariantDef {
                            name: v.name.clone(),
                            index: v.index,
                            fields: self.graph_fields(&v.fields)?,
                        })
                    })
                    .collect::<Result<_, ResolutionError>>()?,
            ),
            TypeDescriptor::Sequence { elem } => sequence_of(self.by_id(*elem)?),
            TypeDescriptor::FixedArray { len, elem } => Codec::FixedArray {
                elem: self.by_id(*elem)?,
                len: *len as usize,
            },
            TypeDescriptor::Tuple { elems } if elems.is_empty() => Codec::Null,
            TypeDescriptor::Tuple { elems } => Codec::Tuple(
                elems
                    .iter()
                    .map(|e| self.by_id(*e))
                    .collect::<Result<_, _>>()?,
            ),
            TypeDescriptor::Map { key, value } => Codec::Map {
                key: self.by_id(*key)?,
                value: self.by_id(*value)?,
            },
            TypeDescriptor::Option { ty: inner } => Codec::Option(self.by_id(*inner)?),
            TypeDescriptor::Result { ok, err } => Codec::Result {
                ok: self.by_id(*ok)?,
                err: self.by_id(*err)?,
            },
            TypeDescriptor::BitSequence { store, order } => self.bit_sequence(*store, *order)?,
            TypeDescriptor::Opaque { ty: inner } => Codec::Opaque(self.by_id(*inner)?),
            TypeDescriptor::Historic { name, scope } => {
                let parsed = TypeName::parse(name)?;
                return self.by_name(scope.as_deref(), &parsed);
            }
            TypeDescriptor::DoNotConstruct { reason } => {
                return Err(ResolutionError::cannot(
                    format!("#{}", ty.id),
                    reason.clone().unwrap_or_else(|| "marked DoNotConstruct".into()),
                ))
            }
        };
        Ok(Arc::new(codec))
    }

    fn graph_fields(&mut self, fields: &[FieldDescriptor]) -> Result<Vec<Field>, ResolutionError> {
        fields
            .iter()
            .map(|f| {
                Ok(Field {
                    name: f.name.clone(),
                    codec: self.by_id(f.ty)?,
                })
            })
            .collect()
    }

    fn bit_sequence(&self, store: TypeId, order: TypeId) -> Result<Codec, ResolutionError> {
        let types = &self.metadata.types;
        let store_ty = types.get(store).ok_or(ResolutionError::UnknownTypeId(store))?;
        let width = match store_ty.descriptor {
            TypeDescriptor::Primitive { primitive: Primitive::U8 } => 1,
            TypeDescriptor::Primitive { primitive: Primitive::U16 } => 2,
            TypeDescriptor::Primitive { primitive: Primitive::U32 } => 4,
            TypeDescriptor::Primitive { primitive: Primitive::U64 } => 8,
            _ => {
                return Err(ResolutionError::cannot(
                    format!("#{store}"),
                    "bit sequence store must be u8, u16, u32 or u64",
                ))
            }
        };
        let order_ty = types.get(order).ok_or(ResolutionError::UnknownTypeId(order))?;
        let order = match order_ty.path.last().map(String::as_str) {
            Some("Msb0") => BitOrder::Msb0,
            _ => BitOrder::Lsb0,
        };
        Ok(Codec::BitSequence { store: width, order })
    }

    // ─── Textual types ──────────────────────────────────────────────────────

    fn build_name(&mut self, name: &TypeName) -> Result<CodecRef, ResolutionError> {
        match name {
            TypeName::Tuple(items) if items.is_empty() => Ok(Arc::new(Codec::Null)),
            TypeName::Tuple(items) => {
                let items = items
                    .iter()
                    .map(|t| self.by_name(None, t))
                    .collect::<Result<_, _>>()?;
                Ok(Arc::new(Codec::Tuple(items)))
            }
            TypeName::Array { elem, len } => Ok(Arc::new(Codec::FixedArray {
                elem: self.by_name(None, elem)?,
                len: *len,
            })),
            TypeName::Named { name: base, params } => {
                if let Some(codec) = self.structural(base, params)? {
                    return Ok(codec);
                }
                if let Some(def) = self.state.definitions.get(base).cloned() {
                    return self.build_definition(base, &def);
                }
                if let Some(def) = builtins::definitions().get(base) {
                    return self.build_definition(base, def);
                }
                match (base.as_str(), params.is_empty()) {
                    ("Call" | "RuntimeCall", true) => return self.runtime_enum(RuntimeEnum::Call),
                    ("Event" | "RuntimeEvent", true) => return self.runtime_enum(RuntimeEnum::Event),
                    _ => {}
                }
                match self.graph_name(base) {
                    Some(id) => self.by_id(id),
                    None => Err(ResolutionError::TypeNotFound(name.signature())),
                }
            }
        }
    }

    /// Primitives and generic wrappers, built from their shape alone.
    fn structural(
        &mut self,
        base: &str,
        params: &[TypeName],
    ) -> Result<Option<CodecRef>, ResolutionError> {
        let codec = match (base, params) {
            ("bool", []) => Codec::Bool,
            ("u8", []) => Codec::Integer(Integer::U8),
            ("u16", []) => Codec::Integer(Integer::U16),
            ("u32", []) => Codec::Integer(Integer::U32),
            ("u64", []) => Codec::Integer(Integer::U64),
            ("u128", []) => Codec::Integer(Integer::U128),
            ("i8", []) => Codec::Integer(Integer::I8),
            ("i16", []) => Codec::Integer(Integer::I16),
            ("i32", []) => Codec::Integer(Integer::I32),
            ("i64", []) => Codec::Integer(Integer::I64),
            ("i128", []) => Codec::Integer(Integer::I128),
            ("u256" | "i256" | "U256" | "I256", []) => primitive_codec(Primitive::U256),
            ("char", []) => primitive_codec(Primitive::Char),
            ("str" | "String" | "Text", []) => Codec::Str,
            ("Bytes", []) => Codec::Bytes,
            ("Null" | "PhantomData", _) => Codec::Null,
            ("Vec" | "BTreeSet" | "VecDeque" | "BoundedVec" | "WeakBoundedVec", [elem, ..]) => {
                sequence_of(self.by_name(None, elem)?)
            }
            ("Option", [inner]) => Codec::Option(self.by_name(None, inner)?),
            ("Result", [ok, err]) => Codec::Result {
                ok: self.by_name(None, ok)?,
                err: self.by_name(None, err)?,
            },
            ("Compact", [inner]) => {
                let codec = self.by_name(None, inner)?;
                compact_of(&format!("Compact<{inner}>"), &codec)?
            }
            ("BTreeMap" | "HashMap" | "BoundedBTreeMap", [key, value, ..]) => Codec::Map {
                key: self.by_name(None, key)?,
                value: self.by_name(None, value)?,
            },
            ("WrapperOpaque", [inner]) => Codec::Opaque(self.by_name(None, inner)?),
            ("WrapperKeepOpaque", [inner]) => Codec::Fallback {
                primary: Arc::new(Codec::Opaque(self.by_name(None, inner)?)),
                fallback: Arc::new(Codec::Bytes),
            },
            ("BitVec", _) => Codec::BitSequence {
                store: 1,
                order: BitOrder::Lsb0,
            },
            _ => return Ok(None),
        };
        Ok(Some(Arc::new(codec)))
    }

    fn build_definition(
        &mut self,
        name: &str,
        def: &TypeDefinition,
    ) -> Result<CodecRef, ResolutionError> {
        let codec = match def {
            TypeDefinition::Alias(target) => return self.by_name(None, target),
            TypeDefinition::Struct(fields) if fields.is_empty() => Codec::Null,
            TypeDefinition::Struct(fields) => Codec::Struct(self.named_fields(fields)?),
            TypeDefinition::Enum(variants) => Codec::Variant(
                variants
                    .iter()
                    .map(|v| {
                        let fields = match &v.payload {
                            VariantPayload::Unit => Vec::new(),
                            VariantPayload::Single(ty) => vec![Field::unnamed(self.by_name(None, ty)?)],
                            VariantPayload::Fields(fields) => self.named_fields(fields)?,
                        };
                        Ok(VariantDef {
                            name: v.name.clone(),
                            index: v.index,
                            fields,
                        })
                    })
                    .collect::<Result<_, ResolutionError>>()?,
            ),
            TypeDefinition::Fallback { primary, fallback } => Codec::Fallback {
                primary: self.build_definition(name, primary)?,
                fallback: self.by_name(None, fallback)?,
            },
        };
        Ok(Arc::new(codec))
    }

    fn named_fields(&mut self, fields: &[(String, TypeName)]) -> Result<Vec<Field>, ResolutionError> {
        fields
            .iter()
            .map(|(name, ty)| Ok(Field::named(name.clone(), self.by_name(None, ty)?)))
            .collect()
    }

    /// The runtime-wide call or event enum: one variant per pallet, indexed
    /// by pallet index, wrapping that pallet's own enum.
    fn runtime_enum(&mut self, kind: RuntimeEnum) -> Result<CodecRef, ResolutionError> {
        let metadata = self.metadata;
        let variants = metadata
            .pallets
            .iter()
            .filter_map(|p| {
                let id = match kind {
                    RuntimeEnum::Call => p.calls,
                    RuntimeEnum::Event => p.events,
                }?;
                Some((p, id))
            })
            .map(|(p, id)| {
                Ok(VariantDef {
                    name: p.name.clone(),
                    index: p.index,
                    fields: vec![Field::unnamed(self.by_id(id)?)],
                })
            })
            .collect::<Result<Vec<_>, ResolutionError>>()?;
        Ok(Arc::new(Codec::Variant(variants)))
    }

    /// A graph type whose last path segment is `name` and unique.
    fn graph_name(&mut self, name: &str) -> Option<TypeId> {
        let metadata = self.metadata;
        let names = self
            .state
            .graph_names
            .get_or_insert_with(|| index_graph_names(metadata));
        names.get(name).copied().flatten()
    }
}

fn index_graph_names(metadata: &MetadataLatest) -> HashMap<String, Option<TypeId>> {
    let mut names: HashMap<String, Option<TypeId>> = HashMap::new();
    for ty in metadata.types.iter() {
        if matches!(ty.descriptor, TypeDescriptor::Historic { .. }) {
            continue;
        }
        if let Some(last) = ty.path.last() {
            names
                .entry(last.clone())
                .and_modify(|id| *id = None)
                .or_insert(Some(ty.id));
        }
    }
    names
}

fn rewrite(renames: &HashMap<String, TypeName>, name: &TypeName) -> TypeName {
    match name {
        TypeName::Named { name: base, params } => match renames.get(base) {
            Some(target) => target.clone(),
            None => TypeName::Named {
                name: base.clone(),
                params: params.iter().map(|p| rewrite(renames, p)).collect(),
            },
        },
        TypeName::Tuple(items) => TypeName::Tuple(items.iter().map(|i| rewrite(renames, i)).collect()),
        TypeName::Array { elem, len } => TypeName::Array {
            elem: Box::new(rewrite(renames, elem)),
            len: *len,
        },
    }
}

fn primitive_codec(primitive: Primitive) -> Codec {
    match primitive {
        Primitive::Bool => Codec::Bool,
        // a char is carried as its u32 code point
        Primitive::Char => Codec::Integer(Integer::U32),
        Primitive::Str => Codec::Str,
        Primitive::U8 => Codec::Integer(Integer::U8),
        Primitive::U16 => Codec::Integer(Integer::U16),
        Primitive::U32 => Codec::Integer(Integer::U32),
        Primitive::U64 => Codec::Integer(Integer::U64),
        Primitive::U128 => Codec::Integer(Integer::U128),
        Primitive::I8 => Codec::Integer(Integer::I8),
        Primitive::I16 => Codec::Integer(Integer::I16),
        Primitive::I32 => Codec::Integer(Integer::I32),
        Primitive::I64 => Codec::Integer(Integer::I64),
        Primitive::I128 => Codec::Integer(Integer::I128),
        // 256-bit integers stay raw little-endian bytes
        Primitive::U256 | Primitive::I256 => Codec::FixedArray {
            elem: Arc::new(Codec::Integer(Integer::U8)),
            len: 32,
        },
    }
}

fn sequence_of(elem: CodecRef) -> Codec {
    if matches!(*elem, Codec::Integer(Integer::U8)) {
        Codec::Bytes
    } else {
        Codec::Sequence(elem)
    }
}

/// Compact form of an unsigned integer, or of a single-field wrapper
/// around one.
fn compact_of(label: &str, inner: &Codec) -> Result<Codec, ResolutionError> {
    match inner {
        Codec::Integer(int) | Codec::Compact(int) if !int.signed => Ok(Codec::Compact(*int)),
        Codec::Null => Ok(Codec::Null),
        Codec::Struct(fields) if fields.len() == 1 => compact_of(label, &fields[0].codec),
        Codec::Tuple(items) if items.len() == 1 => compact_of(label, &items[0]),
        other => Err(ResolutionError::cannot(
            label,
            format!("{} has no compact form", other.name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_builtin_names() {
        let registry = TypeRegistry::empty();
        let header = registry.resolve("Header").unwrap();
        assert!(matches!(*header, Codec::Struct(ref fields) if fields.len() == 5));
        let balance = registry.resolve("T::Balance").unwrap();
        assert!(matches!(*balance, Codec::Integer(Integer::U128)));
        let bytes = registry.resolve("Vec<u8>").unwrap();
        assert!(matches!(*bytes, Codec::Bytes));
    }

    #[test]
    fn same_signature_same_arc() {
        let registry = TypeRegistry::empty();
        let a = registry.resolve("Vec<(AccountId, Balance)>").unwrap();
        let b = registry.resolve("Vec<(T::AccountId, Balance)>").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn registries_do_not_share_caches() {
        let one = TypeRegistry::empty();
        let two = TypeRegistry::empty();
        let a = one.resolve("Header").unwrap();
        let b = two.resolve("Header").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn compact_of_wrapper_and_rejects_signed() {
        let registry = TypeRegistry::empty();
        registry.register_types(&json!({ "Wrapped": { "inner": "u64" } })).unwrap();
        assert!(matches!(
            *registry.resolve("Compact<Wrapped>").unwrap(),
            Codec::Compact(Integer::U64)
        ));
        assert!(matches!(
            registry.resolve("Compact<i32>"),
            Err(ResolutionError::CannotConstruct { .. })
        ));
    }

    #[test]
    fn unknown_names_fail_and_are_not_cached() {
        let registry = TypeRegistry::empty();
        let before = registry.cached_len();
        assert_eq!(
            registry.resolve("Vec<Mystery>").unwrap_err(),
            ResolutionError::TypeNotFound("Mystery".into())
        );
        assert_eq!(registry.cached_len(), before);

        registry.register_types(&json!({ "Mystery": "u16" })).unwrap();
        assert!(registry.resolve("Vec<Mystery>").is_ok());
    }

    #[test]
    fn user_definitions_shadow_builtins() {
        let registry = TypeRegistry::empty();
        registry.register_types(&json!({ "BlockNumber": "u64" })).unwrap();
        assert!(matches!(
            *registry.resolve("BlockNumber").unwrap(),
            Codec::Integer(Integer::U64)
        ));
    }

    #[test]
    fn aliases_apply_only_inside_their_pallet() {
        let registry = TypeRegistry::empty();
        let scoped = registry.resolve_in("Assets", "Balance").unwrap();
        let global = registry.resolve("Balance").unwrap();
        assert!(matches!(*scoped, Codec::Integer(Integer::U64)));
        assert!(matches!(*global, Codec::Integer(Integer::U128)));

        registry.set_alias("Staking", "Balance", "u32").unwrap();
        let nested = registry.resolve_in("staking", "Vec<Balance>").unwrap();
        let Codec::Sequence(elem) = &*nested else {
            panic!("expected sequence");
        };
        assert!(matches!(**elem, Codec::Integer(Integer::U32)));
    }

    #[test]
    fn recursive_definitions_are_tied() {
        let registry = TypeRegistry::empty();
        registry
            .register_types(&json!({
                "Tree": { "_enum": { "Leaf": "u8", "Node": "Vec<Tree>" } }
            }))
            .unwrap();
        let tree = registry.resolve("Tree").unwrap();
        // Node(vec![Leaf(1), Node(vec![])])
        let bytes = [1, 8, 0, 1, 1, 0];
        let value = tree.decode_all(&bytes).unwrap();
        assert_eq!(tree.encode(&value).unwrap(), bytes);

        let children = match &*tree {
            Codec::Variant(variants) => variants[1].fields[0].codec.clone(),
            other => panic!("expected enum, got {}", other.name()),
        };
        drop(tree);
        registry.close();
        assert!(matches!(
            children.decode_all(&[4, 0, 1]),
            Err(CodecError::DanglingRecursion(_))
        ));
    }

    #[test]
    fn closed_registry_refuses_work() {
        let registry = TypeRegistry::empty();
        registry.close();
        assert!(registry.is_closed());
        assert_eq!(registry.resolve("u8").unwrap_err(), ResolutionError::RegistryClosed);
    }
}
