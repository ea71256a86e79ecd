//! The dynamic codec: a closed set of type shapes that encode and decode
//! [`Value`]s.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::compact::{decode_compact_bits, decode_length, encode_compact};
use crate::error::CodecError;
use crate::input::Input;
use crate::value::Value;

/// Shared handle to a codec. Registries hand out the same `Arc` for the
/// same type, so pointer equality identifies a memoized constructor.
pub type CodecRef = Arc<Codec>;

/// Fixed-width integer shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Integer {
    pub bits: u16,
    pub signed: bool,
}

impl Integer {
    pub const U8: Integer = Integer::unsigned(8);
    pub const U16: Integer = Integer::unsigned(16);
    pub const U32: Integer = Integer::unsigned(32);
    pub const U64: Integer = Integer::unsigned(64);
    pub const U128: Integer = Integer::unsigned(128);
    pub const I8: Integer = Integer::signed(8);
    pub const I16: Integer = Integer::signed(16);
    pub const I32: Integer = Integer::signed(32);
    pub const I64: Integer = Integer::signed(64);
    pub const I128: Integer = Integer::signed(128);

    pub const fn unsigned(bits: u16) -> Self {
        Self { bits, signed: false }
    }

    pub const fn signed(bits: u16) -> Self {
        Self { bits, signed: true }
    }

    pub fn byte_len(&self) -> usize {
        usize::from(self.bits / 8)
    }

    pub fn name(&self) -> String {
        format!("{}{}", if self.signed { 'i' } else { 'u' }, self.bits)
    }

    /// Check that `value` fits and normalise it to `Uint`/`Int`.
    pub fn check(&self, value: &Value) -> Result<Value, CodecError> {
        let out_of_range = |v: String| CodecError::OutOfRange {
            ty: self.name(),
            value: v,
        };
        if self.signed {
            let v = match value {
                Value::Int(v) => *v,
                Value::Uint(v) => i128::try_from(*v).map_err(|_| out_of_range(v.to_string()))?,
                other => return Err(CodecError::mismatch(self.name(), other.kind())),
            };
            if self.bits < 128 {
                let max = (1i128 << (self.bits - 1)) - 1;
                let min = -(1i128 << (self.bits - 1));
                if v < min || v > max {
                    return Err(out_of_range(v.to_string()));
                }
            }
            Ok(Value::Int(v))
        } else {
            let v = match value {
                Value::Uint(v) => *v,
                Value::Int(v) => u128::try_from(*v).map_err(|_| out_of_range(v.to_string()))?,
                other => return Err(CodecError::mismatch(self.name(), other.kind())),
            };
            if self.bits < 128 && v >> self.bits != 0 {
                return Err(out_of_range(v.to_string()));
            }
            Ok(Value::Uint(v))
        }
    }

    fn encode_to(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let n = self.byte_len();
        match self.check(value)? {
            Value::Int(v) => out.extend_from_slice(&v.to_le_bytes()[..n]),
            Value::Uint(v) => out.extend_from_slice(&v.to_le_bytes()[..n]),
            _ => unreachable!("Integer::check only returns integers"),
        }
        Ok(())
    }

    fn decode(&self, input: &mut Input<'_>) -> Result<Value, CodecError> {
        let n = self.byte_len();
        let bytes = input.read_bytes(n)?;
        let mut buf = [0u8; 16];
        buf[..n].copy_from_slice(bytes);
        if self.signed {
            if n < 16 && bytes[n - 1] & 0x80 != 0 {
                buf[n..].fill(0xff);
            }
            Ok(Value::Int(i128::from_le_bytes(buf)))
        } else {
            Ok(Value::Uint(u128::from_le_bytes(buf)))
        }
    }
}

/// A struct or variant field.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: Option<String>,
    pub codec: CodecRef,
}

impl Field {
    pub fn named(name: impl Into<String>, codec: CodecRef) -> Self {
        Self {
            name: Some(name.into()),
            codec,
        }
    }

    pub fn unnamed(codec: CodecRef) -> Self {
        Self { name: None, codec }
    }
}

/// One alternative of a [`Codec::Variant`].
#[derive(Debug, Clone)]
pub struct VariantDef {
    pub name: String,
    pub index: u8,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    Lsb0,
    Msb0,
}

/// Late-bound link used to close cycles in a type graph.
///
/// Holds only a weak pointer: the owning registry keeps the target alive.
#[derive(Clone)]
pub struct RecursiveRef {
    key: Arc<str>,
    target: Arc<OnceLock<Weak<Codec>>>,
}

impl RecursiveRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Arc::from(key.into()),
            target: Arc::new(OnceLock::new()),
        }
    }

    /// Point the reference at its target. Returns `false` if already bound.
    pub fn bind(&self, codec: &CodecRef) -> bool {
        self.target.set(Arc::downgrade(codec)).is_ok()
    }

    pub fn get(&self) -> Result<CodecRef, CodecError> {
        self.target
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| CodecError::DanglingRecursion(self.key.to_string()))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for RecursiveRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Recursive({})", self.key)
    }
}

/// Every type shape the runtime can encode.
#[derive(Debug)]
pub enum Codec {
    /// Zero-sized: `()`, `PhantomData`, field-less composites.
    Null,
    Bool,
    Integer(Integer),
    Compact(Integer),
    /// UTF-8 text with a compact length prefix.
    Str,
    /// Raw bytes with a compact length prefix (`Vec<u8>`).
    Bytes,
    Option(CodecRef),
    Result {
        ok: CodecRef,
        err: CodecRef,
    },
    Sequence(CodecRef),
    FixedArray {
        elem: CodecRef,
        len: usize,
    },
    Tuple(Vec<CodecRef>),
    Struct(Vec<Field>),
    Variant(Vec<VariantDef>),
    Map {
        key: CodecRef,
        value: CodecRef,
    },
    BitSequence {
        /// Bytes per store word: 1, 2, 4 or 8.
        store: u8,
        order: BitOrder,
    },
    /// Inner encoding behind a compact byte-length prefix.
    Opaque(CodecRef),
    /// Try `primary`; rewind and use `fallback` when it fails.
    Fallback {
        primary: CodecRef,
        fallback: CodecRef,
    },
    Recursive(RecursiveRef),
}

impl Codec {
    /// Short description for diagnostics.
    pub fn name(&self) -> String {
        match self {
            Codec::Null => "Null".into(),
            Codec::Bool => "bool".into(),
            Codec::Integer(int) => int.name(),
            Codec::Compact(int) => format!("Compact<{}>", int.name()),
            Codec::Str => "Text".into(),
            Codec::Bytes => "Bytes".into(),
            Codec::Option(inner) => format!("Option<{}>", inner.name()),
            Codec::Result { .. } => "Result".into(),
            Codec::Sequence(elem) => format!("Vec<{}>", elem.name()),
            Codec::FixedArray { elem, len } => format!("[{}; {len}]", elem.name()),
            Codec::Tuple(items) => format!("tuple of {}", items.len()),
            Codec::Struct(_) => "struct".into(),
            Codec::Variant(_) => "enum".into(),
            Codec::Map { .. } => "map".into(),
            Codec::BitSequence { .. } => "BitVec".into(),
            Codec::Opaque(inner) => format!("Opaque<{}>", inner.name()),
            Codec::Fallback { primary, .. } => primary.name(),
            Codec::Recursive(r) => r.key().to_string(),
        }
    }

    pub(crate) fn is_u8(&self) -> bool {
        matches!(self, Codec::Integer(Integer::U8))
    }

    /// Encoded size when it does not depend on the value.
    pub fn byte_length(&self) -> Option<usize> {
        match self {
            Codec::Null => Some(0),
            Codec::Bool => Some(1),
            Codec::Integer(int) => Some(int.byte_len()),
            Codec::FixedArray { elem, len } => elem.byte_length()?.checked_mul(*len),
            Codec::Tuple(items) => sum_lengths(items.iter().map(|c| c.byte_length())),
            Codec::Struct(fields) => sum_lengths(fields.iter().map(|f| f.codec.byte_length())),
            Codec::Variant(variants)
                if !variants.is_empty() && variants.iter().all(|v| v.fields.is_empty()) =>
            {
                Some(1)
            }
            _ => None,
        }
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.encode_to(value, &mut out)?;
        Ok(out)
    }

    pub fn encode_to(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            Codec::Null => match value {
                Value::Null => Ok(()),
                Value::Tuple(v) | Value::Sequence(v) if v.is_empty() => Ok(()),
                other => Err(CodecError::mismatch("null", other.kind())),
            },
            Codec::Bool => match value {
                Value::Bool(b) => {
                    out.push(u8::from(*b));
                    Ok(())
                }
                other => Err(CodecError::mismatch("bool", other.kind())),
            },
            Codec::Integer(int) => int.encode_to(value, out),
            Codec::Compact(int) => match int.check(value)? {
                Value::Uint(v) => {
                    encode_compact(v, out);
                    Ok(())
                }
                Value::Int(v) => match u128::try_from(v) {
                    Ok(v) => {
                        encode_compact(v, out);
                        Ok(())
                    }
                    Err(_) => Err(CodecError::OutOfRange {
                        ty: self.name(),
                        value: v.to_string(),
                    }),
                },
                _ => unreachable!("Integer::check only returns integers"),
            },
            Codec::Str => match value {
                Value::Str(s) => {
                    encode_compact(s.len() as u128, out);
                    out.extend_from_slice(s.as_bytes());
                    Ok(())
                }
                other => Err(CodecError::mismatch("string", other.kind())),
            },
            Codec::Bytes => {
                let bytes = match value {
                    Value::Bytes(b) => b.as_slice(),
                    Value::Str(s) => s.as_bytes(),
                    other => return Err(CodecError::mismatch("bytes", other.kind())),
                };
                encode_compact(bytes.len() as u128, out);
                out.extend_from_slice(bytes);
                Ok(())
            }
            Codec::Option(inner) => {
                let some = match value {
                    Value::Option(None) | Value::Null => None,
                    Value::Option(Some(v)) => Some(v.as_ref()),
                    other => return Err(CodecError::mismatch("option", other.kind())),
                };
                match (inner.as_ref(), some) {
                    (_, None) => out.push(0),
                    // Option<bool> packs into a single byte
                    (Codec::Bool, Some(Value::Bool(b))) => out.push(if *b { 1 } else { 2 }),
                    (Codec::Bool, Some(other)) => {
                        return Err(CodecError::mismatch("bool", other.kind()))
                    }
                    (_, Some(v)) => {
                        out.push(1);
                        inner.encode_to(v, out)?;
                    }
                }
                Ok(())
            }
            Codec::Result { ok, err } => match value {
                Value::Result(Ok(v)) => {
                    out.push(0);
                    ok.encode_to(v, out)
                }
                Value::Result(Err(e)) => {
                    out.push(1);
                    err.encode_to(e, out)
                }
                other => Err(CodecError::mismatch("result", other.kind())),
            },
            Codec::Sequence(elem) => match value {
                Value::Bytes(b) if elem.is_u8() => {
                    encode_compact(b.len() as u128, out);
                    out.extend_from_slice(b);
                    Ok(())
                }
                Value::Sequence(items) => {
                    encode_compact(items.len() as u128, out);
                    items.iter().try_for_each(|item| elem.encode_to(item, out))
                }
                other => Err(CodecError::mismatch("sequence", other.kind())),
            },
            Codec::FixedArray { elem, len } => match value {
                Value::Bytes(b) if elem.is_u8() => {
                    if b.len() != *len {
                        return Err(CodecError::LengthMismatch {
                            expected: *len,
                            got: b.len(),
                        });
                    }
                    out.extend_from_slice(b);
                    Ok(())
                }
                Value::Sequence(items) | Value::Tuple(items) => {
                    if items.len() != *len {
                        return Err(CodecError::LengthMismatch {
                            expected: *len,
                            got: items.len(),
                        });
                    }
                    items.iter().try_for_each(|item| elem.encode_to(item, out))
                }
                other => Err(CodecError::mismatch(self.name(), other.kind())),
            },
            Codec::Tuple(items) => {
                if items.is_empty() {
                    return Codec::Null.encode_to(value, out);
                }
                let values = match value {
                    Value::Tuple(v) | Value::Sequence(v) => v,
                    other => return Err(CodecError::mismatch("tuple", other.kind())),
                };
                if values.len() != items.len() {
                    return Err(CodecError::LengthMismatch {
                        expected: items.len(),
                        got: values.len(),
                    });
                }
                items
                    .iter()
                    .zip(values)
                    .try_for_each(|(codec, v)| codec.encode_to(v, out))
            }
            Codec::Struct(fields) => encode_fields(fields, value, out),
            Codec::Variant(variants) => {
                let Value::Variant { name, index, value: inner } = value else {
                    return Err(CodecError::mismatch("variant", value.kind()));
                };
                let found = if name.is_empty() {
                    variants.iter().find(|v| v.index == *index)
                } else {
                    variants.iter().find(|v| &v.name == name)
                };
                let def = found.ok_or_else(|| CodecError::UnknownVariant(name.clone()))?;
                out.push(def.index);
                encode_fields(&def.fields, inner, out)
            }
            Codec::Map { key, value: val } => {
                let Value::Map(entries) = value else {
                    return Err(CodecError::mismatch("map", value.kind()));
                };
                encode_compact(entries.len() as u128, out);
                for (k, v) in entries {
                    key.encode_to(k, out)?;
                    val.encode_to(v, out)?;
                }
                Ok(())
            }
            Codec::BitSequence { store, order } => {
                let Value::Bits(bits) = value else {
                    return Err(CodecError::mismatch("bits", value.kind()));
                };
                encode_bits(bits, *store, *order, out);
                Ok(())
            }
            Codec::Opaque(inner) => {
                let encoded = inner.encode(value)?;
                encode_compact(encoded.len() as u128, out);
                out.extend_from_slice(&encoded);
                Ok(())
            }
            Codec::Fallback { primary, fallback } => {
                let mark = out.len();
                match primary.encode_to(value, out) {
                    Ok(()) => Ok(()),
                    Err(_) => {
                        out.truncate(mark);
                        fallback.encode_to(value, out)
                    }
                }
            }
            Codec::Recursive(r) => r.get()?.encode_to(value, out),
        }
    }

    pub fn decode(&self, input: &mut Input<'_>) -> Result<Value, CodecError> {
        match self {
            Codec::Null => Ok(Value::Null),
            Codec::Bool => match input.read_byte()? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                b => Err(CodecError::InvalidBool(b)),
            },
            Codec::Integer(int) => int.decode(input),
            Codec::Compact(int) => {
                let v = decode_compact_bits(input, int.bits)?;
                Ok(Value::Uint(v))
            }
            Codec::Str => {
                let len = decode_length(input)?;
                let bytes = input.read_bytes(len)?;
                let s = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Str(s.to_string()))
            }
            Codec::Bytes => {
                let len = decode_length(input)?;
                Ok(Value::Bytes(input.read_bytes(len)?.to_vec()))
            }
            Codec::Option(inner) => match (inner.as_ref(), input.read_byte()?) {
                (_, 0) => Ok(Value::none()),
                (Codec::Bool, 1) => Ok(Value::some(Value::Bool(true))),
                (Codec::Bool, 2) => Ok(Value::some(Value::Bool(false))),
                (Codec::Bool, index) => Err(CodecError::UnknownDiscriminant {
                    ty: "Option<bool>".into(),
                    index,
                }),
                (_, 1) => Ok(Value::some(inner.decode(input)?)),
                (_, index) => Err(CodecError::UnknownDiscriminant {
                    ty: self.name(),
                    index,
                }),
            },
            Codec::Result { ok, err } => match input.read_byte()? {
                0 => Ok(Value::Result(Ok(Box::new(ok.decode(input)?)))),
                1 => Ok(Value::Result(Err(Box::new(err.decode(input)?)))),
                index => Err(CodecError::UnknownDiscriminant {
                    ty: "Result".into(),
                    index,
                }),
            },
            Codec::Sequence(elem) => {
                let len = decode_length(input)?;
                if elem.is_u8() {
                    return Ok(Value::Bytes(input.read_bytes(len)?.to_vec()));
                }
                guard_length(elem, len, input)?;
                let items = (0..len)
                    .map(|_| elem.decode(input))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Sequence(items))
            }
            Codec::FixedArray { elem, len } => {
                if elem.is_u8() {
                    return Ok(Value::Bytes(input.read_bytes(*len)?.to_vec()));
                }
                guard_length(elem, *len, input)?;
                let items = (0..*len)
                    .map(|_| elem.decode(input))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Sequence(items))
            }
            Codec::Tuple(items) => {
                if items.is_empty() {
                    return Ok(Value::Null);
                }
                let values = items
                    .iter()
                    .map(|c| c.decode(input))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Tuple(values))
            }
            Codec::Struct(fields) => decode_fields(fields, input),
            Codec::Variant(variants) => {
                let index = input.read_byte()?;
                let def = variants
                    .iter()
                    .find(|v| v.index == index)
                    .ok_or_else(|| CodecError::UnknownDiscriminant {
                        ty: variant_names(variants),
                        index,
                    })?;
                let value = decode_fields(&def.fields, input)?;
                Ok(Value::variant(def.name.clone(), index, value))
            }
            Codec::Map { key, value } => {
                let len = decode_length(input)?;
                guard_length(key, len, input)?;
                let mut entries = Vec::with_capacity(len.min(input.remaining()));
                for _ in 0..len {
                    let k = key.decode(input)?;
                    let v = value.decode(input)?;
                    entries.push((k, v));
                }
                Ok(Value::Map(entries))
            }
            Codec::BitSequence { store, order } => decode_bits(input, *store, *order),
            Codec::Opaque(inner) => {
                let len = decode_length(input)?;
                let bytes = input.read_bytes(len)?;
                inner.decode_all(bytes).map_err(|err| match err {
                    CodecError::TrailingBytes { remaining } => CodecError::LengthMismatch {
                        expected: len,
                        got: len - remaining,
                    },
                    other => other,
                })
            }
            Codec::Fallback { primary, fallback } => {
                let mut attempt = *input;
                match primary.decode(&mut attempt) {
                    Ok(v) => {
                        *input = attempt;
                        Ok(v)
                    }
                    Err(_) => fallback.decode(input),
                }
            }
            Codec::Recursive(r) => {
                let target = r.get()?;
                input.descend()?;
                let value = target.decode(input);
                input.ascend();
                value
            }
        }
    }

    /// Decode from the front of `bytes`, returning the value and the number
    /// of bytes consumed.
    pub fn decode_prefix(&self, bytes: &[u8]) -> Result<(Value, usize), CodecError> {
        let mut input = Input::new(bytes);
        let value = self.decode(&mut input)?;
        Ok((value, input.position()))
    }

    /// Decode `bytes`, requiring every byte to be consumed.
    pub fn decode_all(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let mut input = Input::new(bytes);
        let value = self.decode(&mut input)?;
        input.finish()?;
        Ok(value)
    }

    /// The zero value of this shape.
    pub fn default_value(&self) -> Result<Value, CodecError> {
        Ok(match self {
            Codec::Null => Value::Null,
            Codec::Bool => Value::Bool(false),
            Codec::Integer(Integer { signed: true, .. }) => Value::Int(0),
            Codec::Integer(_) | Codec::Compact(_) => Value::Uint(0),
            Codec::Str => Value::Str(String::new()),
            Codec::Bytes => Value::Bytes(Vec::new()),
            Codec::Option(_) => Value::none(),
            Codec::Result { ok, .. } => Value::Result(Ok(Box::new(ok.default_value()?))),
            Codec::Sequence(elem) if elem.is_u8() => Value::Bytes(Vec::new()),
            Codec::Sequence(_) => Value::Sequence(Vec::new()),
            Codec::FixedArray { elem, len } if elem.is_u8() => Value::Bytes(vec![0; *len]),
            Codec::FixedArray { elem, len } => {
                Value::Sequence(vec![elem.default_value()?; *len])
            }
            Codec::Tuple(items) if items.is_empty() => Value::Null,
            Codec::Tuple(items) => Value::Tuple(
                items
                    .iter()
                    .map(|c| c.default_value())
                    .collect::<Result<_, _>>()?,
            ),
            Codec::Struct(fields) => default_fields(fields)?,
            Codec::Variant(variants) => {
                let first = variants
                    .first()
                    .ok_or_else(|| CodecError::Unsupported("empty enum has no value".into()))?;
                Value::variant(first.name.clone(), first.index, default_fields(&first.fields)?)
            }
            Codec::Map { .. } => Value::Map(Vec::new()),
            Codec::BitSequence { .. } => Value::Bits(Vec::new()),
            Codec::Opaque(inner) => inner.default_value()?,
            Codec::Fallback { primary, .. } => primary.default_value()?,
            Codec::Recursive(r) => r.get()?.default_value()?,
        })
    }
}

fn variant_names(variants: &[VariantDef]) -> String {
    let names: Vec<_> = variants.iter().take(4).map(|v| v.name.as_str()).collect();
    if variants.len() > 4 {
        format!("enum {{{}, ..}}", names.join(", "))
    } else {
        format!("enum {{{}}}", names.join(", "))
    }
}

/// Most zero-sized items one length prefix may announce.
pub const MAX_ZERO_SIZED_ITEMS: usize = 1 << 16;

fn sum_lengths(mut lengths: impl Iterator<Item = Option<usize>>) -> Option<usize> {
    lengths.try_fold(0usize, |total, n| total.checked_add(n?))
}

/// Refuse lengths that cannot possibly fit in the remaining input.
fn guard_length(elem: &Codec, len: usize, input: &Input<'_>) -> Result<(), CodecError> {
    let min = match elem.byte_length() {
        Some(0) if len > MAX_ZERO_SIZED_ITEMS => {
            return Err(CodecError::TooManyItems {
                len,
                max: MAX_ZERO_SIZED_ITEMS,
            })
        }
        Some(0) => return Ok(()),
        Some(n) => n,
        None => 1,
    };
    let needed = len.saturating_mul(min);
    if needed > input.remaining() {
        return Err(CodecError::Truncated {
            needed,
            remaining: input.remaining(),
        });
    }
    Ok(())
}

fn is_named(fields: &[Field]) -> bool {
    fields.iter().all(|f| f.name.is_some())
}

fn encode_fields(fields: &[Field], value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    if fields.is_empty() {
        return match value {
            Value::Null => Ok(()),
            Value::Tuple(v) | Value::Sequence(v) if v.is_empty() => Ok(()),
            Value::Struct(v) if v.is_empty() => Ok(()),
            other => Err(CodecError::mismatch("no fields", other.kind())),
        };
    }
    if is_named(fields) {
        let Value::Struct(values) = value else {
            return Err(CodecError::mismatch("struct", value.kind()));
        };
        for field in fields {
            let name = field.name.as_deref().unwrap_or_default();
            let v = values
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v)
                .ok_or_else(|| CodecError::MissingField(name.to_string()))?;
            field.codec.encode_to(v, out)?;
        }
        if values.len() > fields.len() {
            return Err(CodecError::LengthMismatch {
                expected: fields.len(),
                got: values.len(),
            });
        }
        return Ok(());
    }
    if let [single] = fields {
        return single.codec.encode_to(value, out);
    }
    let values = match value {
        Value::Tuple(v) | Value::Sequence(v) => v,
        other => return Err(CodecError::mismatch("tuple", other.kind())),
    };
    if values.len() != fields.len() {
        return Err(CodecError::LengthMismatch {
            expected: fields.len(),
            got: values.len(),
        });
    }
    fields
        .iter()
        .zip(values)
        .try_for_each(|(f, v)| f.codec.encode_to(v, out))
}

fn decode_fields(fields: &[Field], input: &mut Input<'_>) -> Result<Value, CodecError> {
    if fields.is_empty() {
        return Ok(Value::Null);
    }
    if is_named(fields) {
        let values = fields
            .iter()
            .map(|f| {
                let name = f.name.clone().unwrap_or_default();
                f.codec.decode(input).map(|v| (name, v))
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::Struct(values));
    }
    if let [single] = fields {
        return single.codec.decode(input);
    }
    let values = fields
        .iter()
        .map(|f| f.codec.decode(input))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Tuple(values))
}

fn default_fields(fields: &[Field]) -> Result<Value, CodecError> {
    if fields.is_empty() {
        return Ok(Value::Null);
    }
    if is_named(fields) {
        let values = fields
            .iter()
            .map(|f| Ok((f.name.clone().unwrap_or_default(), f.codec.default_value()?)))
            .collect::<Result<Vec<_>, CodecError>>()?;
        return Ok(Value::Struct(values));
    }
    if let [single] = fields {
        return single.codec.default_value();
    }
    Ok(Value::Tuple(
        fields
            .iter()
            .map(|f| f.codec.default_value())
            .collect::<Result<_, _>>()?,
    ))
}

// ─── Bit sequences ───────────────────────────────────────────────────────────

fn encode_bits(bits: &[bool], store: u8, order: BitOrder, out: &mut Vec<u8>) {
    let word_bits = usize::from(store) * 8;
    encode_compact(bits.len() as u128, out);
    for chunk in bits.chunks(word_bits) {
        let mut word: u64 = 0;
        for (i, bit) in chunk.iter().enumerate() {
            if *bit {
                let shift = match order {
                    BitOrder::Lsb0 => i,
                    BitOrder::Msb0 => word_bits - 1 - i,
                };
                word |= 1 << shift;
            }
        }
        out.extend_from_slice(&word.to_le_bytes()[..usize::from(store)]);
    }
}

fn decode_bits(input: &mut Input<'_>, store: u8, order: BitOrder) -> Result<Value, CodecError> {
    let word_bits = usize::from(store) * 8;
    let len = decode_length(input)?;
    let words = len.div_ceil(word_bits);
    let needed = words.saturating_mul(usize::from(store));
    if needed > input.remaining() {
        return Err(CodecError::Truncated {
            needed,
            remaining: input.remaining(),
        });
    }
    let mut bits = Vec::with_capacity(len);
    for _ in 0..words {
        let mut buf = [0u8; 8];
        buf[..usize::from(store)].copy_from_slice(input.read_bytes(usize::from(store))?);
        let word = u64::from_le_bytes(buf);
        for i in 0..word_bits {
            if bits.len() == len {
                break;
            }
            let shift = match order {
                BitOrder::Lsb0 => i,
                BitOrder::Msb0 => word_bits - 1 - i,
            };
            bits.push((word >> shift) & 1 == 1);
        }
    }
    Ok(Value::Bits(bits))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arc(c: Codec) -> CodecRef {
        Arc::new(c)
    }

    fn u8_array(len: usize) -> CodecRef {
        arc(Codec::FixedArray {
            elem: arc(Codec::Integer(Integer::U8)),
            len,
        })
    }

    #[test]
    fn integers_are_little_endian() {
        let u32c = Codec::Integer(Integer::U32);
        assert_eq!(u32c.encode(&Value::Uint(1)).unwrap(), vec![1, 0, 0, 0]);
        let i16c = Codec::Integer(Integer::I16);
        let bytes = i16c.encode(&Value::Int(-2)).unwrap();
        assert_eq!(bytes, vec![0xfe, 0xff]);
        assert_eq!(i16c.decode_all(&bytes).unwrap(), Value::Int(-2));
    }

    #[test]
    fn integer_range_is_enforced() {
        let u8c = Codec::Integer(Integer::U8);
        assert!(matches!(
            u8c.encode(&Value::Uint(256)),
            Err(CodecError::OutOfRange { .. })
        ));
        assert!(matches!(
            u8c.encode(&Value::Int(-1)),
            Err(CodecError::OutOfRange { .. })
        ));
        assert!(matches!(
            Codec::Integer(Integer::I8).encode(&Value::Int(128)),
            Err(CodecError::OutOfRange { .. })
        ));
    }

    #[test]
    fn bool_rejects_other_bytes() {
        assert_eq!(Codec::Bool.decode_all(&[2]), Err(CodecError::InvalidBool(2)));
    }

    #[test]
    fn option_bool_uses_single_byte() {
        let c = Codec::Option(arc(Codec::Bool));
        assert_eq!(c.encode(&Value::some(Value::Bool(false))).unwrap(), vec![2]);
        assert_eq!(c.encode(&Value::none()).unwrap(), vec![0]);
        assert_eq!(c.decode_all(&[1]).unwrap(), Value::some(Value::Bool(true)));
        assert!(c.decode_all(&[3]).is_err());
    }

    #[test]
    fn option_and_result_tags() {
        let opt = Codec::Option(arc(Codec::Integer(Integer::U16)));
        assert_eq!(opt.encode(&Value::some(Value::Uint(1))).unwrap(), vec![1, 1, 0]);
        assert!(matches!(
            opt.decode_all(&[2, 0, 0]),
            Err(CodecError::UnknownDiscriminant { index: 2, .. })
        ));

        let res = Codec::Result {
            ok: arc(Codec::Integer(Integer::U8)),
            err: arc(Codec::Str),
        };
        let err = Value::Result(Err(Box::new(Value::Str("no".into()))));
        let bytes = res.encode(&err).unwrap();
        assert_eq!(bytes, vec![1, 8, b'n', b'o']);
        assert_eq!(res.decode_all(&bytes).unwrap(), err);
    }

    #[test]
    fn vec_u8_decodes_as_bytes() {
        let c = Codec::Sequence(arc(Codec::Integer(Integer::U8)));
        let bytes = c.encode(&Value::Bytes(vec![1, 2, 3])).unwrap();
        assert_eq!(bytes, vec![12, 1, 2, 3]);
        assert_eq!(c.decode_all(&bytes).unwrap(), Value::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn fixed_array_checks_length() {
        let c = u8_array(32);
        assert_eq!(
            c.encode(&Value::Bytes(vec![0; 31])),
            Err(CodecError::LengthMismatch { expected: 32, got: 31 })
        );
        assert_eq!(c.byte_length(), Some(32));
    }

    #[test]
    fn struct_named_fields() {
        let c = Codec::Struct(vec![
            Field::named("free", arc(Codec::Integer(Integer::U128))),
            Field::named("flag", arc(Codec::Bool)),
        ]);
        let value = Value::Struct(vec![
            ("flag".into(), Value::Bool(true)),
            ("free".into(), Value::Uint(7)),
        ]);
        let bytes = c.encode(&value).unwrap();
        assert_eq!(bytes.len(), 17);
        assert_eq!(bytes[16], 1);
        let decoded = c.decode_all(&bytes).unwrap();
        assert_eq!(decoded.field("free"), Some(&Value::Uint(7)));
        assert_eq!(c.byte_length(), Some(17));

        let missing = Value::Struct(vec![("free".into(), Value::Uint(7))]);
        assert_eq!(c.encode(&missing), Err(CodecError::MissingField("flag".into())));
    }

    #[test]
    fn newtype_struct_is_transparent() {
        let c = Codec::Struct(vec![Field::unnamed(arc(Codec::Integer(Integer::U32)))]);
        assert_eq!(c.encode(&Value::Uint(5)).unwrap(), vec![5, 0, 0, 0]);
        assert_eq!(c.decode_all(&[5, 0, 0, 0]).unwrap(), Value::Uint(5));
    }

    #[test]
    fn variant_discriminants() {
        let c = Codec::Variant(vec![
            VariantDef {
                name: "Idle".into(),
                index: 0,
                fields: vec![],
            },
            VariantDef {
                name: "Transfer".into(),
                index: 3,
                fields: vec![
                    Field::named("dest", u8_array(2)),
                    Field::named("value", arc(Codec::Compact(Integer::U128))),
                ],
            },
        ]);
        let v = Value::named_variant(
            "Transfer",
            Value::Struct(vec![
                ("dest".into(), Value::Bytes(vec![9, 9])),
                ("value".into(), Value::Uint(100)),
            ]),
        );
        let bytes = c.encode(&v).unwrap();
        assert_eq!(bytes, vec![3, 9, 9, 0x91, 0x01]);
        match c.decode_all(&bytes).unwrap() {
            Value::Variant { name, index, .. } => {
                assert_eq!(name, "Transfer");
                assert_eq!(index, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            c.decode_all(&[7]),
            Err(CodecError::UnknownDiscriminant { index: 7, .. })
        ));
        assert_eq!(
            c.encode(&Value::named_variant("Nope", Value::Null)),
            Err(CodecError::UnknownVariant("Nope".into()))
        );
    }

    #[test]
    fn map_and_tuple() {
        let c = Codec::Map {
            key: arc(Codec::Integer(Integer::U8)),
            value: arc(Codec::Tuple(vec![arc(Codec::Bool), arc(Codec::Str)])),
        };
        let v = Value::Map(vec![(
            Value::Uint(1),
            Value::Tuple(vec![Value::Bool(true), Value::Str("a".into())]),
        )]);
        let bytes = c.encode(&v).unwrap();
        assert_eq!(bytes, vec![4, 1, 1, 4, b'a']);
        assert_eq!(c.decode_all(&bytes).unwrap(), v);
    }

    #[test]
    fn bit_sequences() {
        let lsb = Codec::BitSequence {
            store: 1,
            order: BitOrder::Lsb0,
        };
        let bits = Value::Bits(vec![true, false, true]);
        let bytes = lsb.encode(&bits).unwrap();
        assert_eq!(bytes, vec![12, 0b101]);
        assert_eq!(lsb.decode_all(&bytes).unwrap(), bits);

        let msb = Codec::BitSequence {
            store: 1,
            order: BitOrder::Msb0,
        };
        assert_eq!(msb.encode(&bits).unwrap(), vec![12, 0b1010_0000]);
    }

    #[test]
    fn opaque_wraps_with_length() {
        let c = Codec::Opaque(arc(Codec::Integer(Integer::U32)));
        let bytes = c.encode(&Value::Uint(1)).unwrap();
        assert_eq!(bytes, vec![16, 1, 0, 0, 0]);
        assert_eq!(c.decode_all(&bytes).unwrap(), Value::Uint(1));
        assert!(c.decode_all(&[20, 1, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn fallback_rewinds_on_failure() {
        let c = Codec::Fallback {
            primary: arc(Codec::Bool),
            fallback: arc(Codec::Integer(Integer::U8)),
        };
        assert_eq!(c.decode_all(&[1]).unwrap(), Value::Bool(true));
        assert_eq!(c.decode_all(&[9]).unwrap(), Value::Uint(9));
    }

    #[test]
    fn recursive_reference_ties_cycles() {
        // enum Tree { Leaf(u8), Node(Vec<Tree>) }
        let link = RecursiveRef::new("Tree");
        let tree = arc(Codec::Variant(vec![
            VariantDef {
                name: "Leaf".into(),
                index: 0,
                fields: vec![Field::unnamed(arc(Codec::Integer(Integer::U8)))],
            },
            VariantDef {
                name: "Node".into(),
                index: 1,
                fields: vec![Field::unnamed(arc(Codec::Sequence(arc(Codec::Recursive(
                    link.clone(),
                )))))],
            },
        ]));
        assert!(link.bind(&tree));

        let bytes = [1, 8, 0, 5, 1, 0];
        let value = tree.decode_all(&bytes).unwrap();
        assert_eq!(tree.encode(&value).unwrap(), bytes);

        drop(tree);
        assert_eq!(
            link.get().unwrap_err(),
            CodecError::DanglingRecursion("Tree".into())
        );
    }

    #[test]
    fn sequence_length_guard() {
        let c = Codec::Sequence(arc(Codec::Integer(Integer::U64)));
        assert!(matches!(
            c.decode_all(&[0xfe, 0xff, 0x03, 0x00]),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn zero_sized_items_are_capped() {
        let announced = crate::compact::compact_to_vec(1 << 60);
        let map = Codec::Map {
            key: arc(Codec::Null),
            value: arc(Codec::Null),
        };
        assert_eq!(
            map.decode_all(&announced),
            Err(CodecError::TooManyItems {
                len: 1 << 60,
                max: MAX_ZERO_SIZED_ITEMS,
            })
        );

        let seq = Codec::Sequence(arc(Codec::Tuple(vec![])));
        assert!(matches!(
            seq.decode_all(&announced),
            Err(CodecError::TooManyItems { .. })
        ));
        // small counts of unit values still decode
        assert_eq!(
            seq.decode_all(&[12]).unwrap(),
            Value::Sequence(vec![Value::Null; 3])
        );
    }

    #[test]
    fn byte_length_overflow_is_unknown() {
        let huge = arc(Codec::FixedArray {
            elem: u8_array(usize::MAX),
            len: 2,
        });
        assert_eq!(huge.byte_length(), None);

        let wide = Codec::Tuple(vec![u8_array(usize::MAX), u8_array(1)]);
        assert_eq!(wide.byte_length(), None);
    }

    #[test]
    fn deep_recursion_stops_at_depth_limit() {
        // enum Chain { End, Link(Chain) }
        let link = RecursiveRef::new("Chain");
        let chain = arc(Codec::Variant(vec![
            VariantDef {
                name: "End".into(),
                index: 0,
                fields: vec![],
            },
            VariantDef {
                name: "Link".into(),
                index: 1,
                fields: vec![Field::unnamed(arc(Codec::Recursive(link.clone())))],
            },
        ]));
        assert!(link.bind(&chain));

        let nested = |depth: usize| {
            let mut bytes = vec![1u8; depth];
            bytes.push(0);
            bytes
        };

        let worker = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(move || {
                let shallow = chain.decode_all(&nested(crate::input::MAX_DEPTH)).map(|_| ());
                let deep = chain.decode_all(&nested(2_000_000)).map(|_| ());
                (shallow, deep)
            })
            .unwrap();
        let (shallow, deep) = worker.join().unwrap();
        assert_eq!(shallow, Ok(()));
        assert_eq!(deep, Err(CodecError::DepthLimit { max: crate::input::MAX_DEPTH }));
    }

    #[test]
    fn decode_prefix_reports_consumed() {
        let c = Codec::Compact(Integer::U32);
        let (v, used) = c.decode_prefix(&[0x15, 0x01, 0xff]).unwrap();
        assert_eq!(v, Value::Uint(69));
        assert_eq!(used, 2);
    }
}
