//! Dynamic values produced and consumed by [`Codec`](crate::Codec).

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use std::fmt;

/// A decoded value whose shape is only known at runtime.
///
/// Composite conventions, shared by encoding and decoding:
/// - named fields become [`Value::Struct`]
/// - several unnamed fields become [`Value::Tuple`]
/// - a single unnamed field is the inner value itself
/// - no fields at all is [`Value::Null`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    Uint(u128),
    Int(i128),
    Str(String),
    Bytes(Vec<u8>),
    Sequence(Vec<Value>),
    Tuple(Vec<Value>),
    Struct(Vec<(String, Value)>),
    Variant {
        name: String,
        index: u8,
        value: Box<Value>,
    },
    Option(Option<Box<Value>>),
    Result(Result<Box<Value>, Box<Value>>),
    Map(Vec<(Value, Value)>),
    Bits(Vec<bool>),
}

impl Value {
    pub fn variant(name: impl Into<String>, index: u8, value: Value) -> Self {
        Value::Variant {
            name: name.into(),
            index,
            value: Box::new(value),
        }
    }

    /// A variant selected by name only; the index is filled in on encode.
    pub fn named_variant(name: impl Into<String>, value: Value) -> Self {
        Self::variant(name, 0, value)
    }

    pub fn some(value: Value) -> Self {
        Value::Option(Some(Box::new(value)))
    }

    pub fn none() -> Self {
        Value::Option(None)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Int(v) => u128::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Look up a named field of a struct value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Short name of the value's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Uint(_) => "uint",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Sequence(_) => "sequence",
            Value::Tuple(_) => "tuple",
            Value::Struct(_) => "struct",
            Value::Variant { .. } => "variant",
            Value::Option(_) => "option",
            Value::Result(_) => "result",
            Value::Map(_) => "map",
            Value::Bits(_) => "bits",
        }
    }

    /// Human-oriented JSON projection.
    ///
    /// Integers beyond `u64` are rendered as decimal strings, byte strings as
    /// text when they are printable UTF-8 and as hex otherwise.
    pub fn to_human(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => json!(b),
            Value::Uint(v) => match u64::try_from(*v) {
                Ok(small) => json!(small),
                Err(_) => json!(v.to_string()),
            },
            Value::Int(v) => match i64::try_from(*v) {
                Ok(small) => json!(small),
                Err(_) => json!(v.to_string()),
            },
            Value::Str(s) => json!(s),
            Value::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) if !s.is_empty() && s.chars().all(|c| !c.is_control()) => json!(s),
                _ => json!(format!("0x{}", hex::encode(b))),
            },
            Value::Sequence(items) | Value::Tuple(items) => {
                Json::Array(items.iter().map(Value::to_human).collect())
            }
            Value::Struct(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_human()))
                    .collect::<Map<_, _>>(),
            ),
            Value::Variant { name, value, .. } => {
                if value.is_null() {
                    json!(name)
                } else {
                    let mut obj = Map::new();
                    obj.insert(name.clone(), value.to_human());
                    Json::Object(obj)
                }
            }
            Value::Option(None) => Json::Null,
            Value::Option(Some(v)) => v.to_human(),
            Value::Result(Ok(v)) => json!({ "Ok": v.to_human() }),
            Value::Result(Err(e)) => json!({ "Err": e.to_human() }),
            Value::Map(entries) => Json::Array(
                entries
                    .iter()
                    .map(|(k, v)| json!([k.to_human(), v.to_human()]))
                    .collect(),
            ),
            Value::Bits(bits) => json!(bits
                .iter()
                .map(|b| if *b { '1' } else { '0' })
                .collect::<String>()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Sequence(items) => {
                let parts: Vec<_> = items.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Tuple(items) => {
                let parts: Vec<_> = items.iter().map(|x| x.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
            Value::Struct(fields) => {
                let parts: Vec<_> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Variant { name, value, .. } => match value.as_ref() {
                Value::Null => write!(f, "{name}"),
                inner => write!(f, "{name}({inner})"),
            },
            Value::Option(None) => write!(f, "None"),
            Value::Option(Some(v)) => write!(f, "Some({v})"),
            Value::Result(Ok(v)) => write!(f, "Ok({v})"),
            Value::Result(Err(e)) => write!(f, "Err({e})"),
            Value::Map(entries) => {
                let parts: Vec<_> = entries.iter().map(|(k, v)| format!("{k} => {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Bits(bits) => {
                let s: String = bits.iter().map(|b| if *b { '1' } else { '0' }).collect();
                write!(f, "0b{s}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! value_from_uint {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Uint(v as u128)
            }
        }
    )*};
}

value_from_uint!(u8, u16, u32, u64, u128);

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v as i128)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<const N: usize> From<[u8; N]> for Value {
    fn from(b: [u8; N]) -> Self {
        Value::Bytes(b.to_vec())
    }
}
