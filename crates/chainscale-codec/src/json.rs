//! Mapping between JSON (as spoken by node RPC endpoints) and [`Value`]s.

use serde_json::{json, Map, Value as Json};

use crate::codec::{Codec, Field, Integer, VariantDef};
use crate::error::CodecError;
use crate::value::Value;

/// Largest integer a JSON consumer can hold without precision loss.
const MAX_SAFE_INTEGER: u128 = (1 << 53) - 1;

/// Decode `0x`-prefixed (or bare) hex.
pub fn parse_hex(s: &str) -> Result<Vec<u8>, CodecError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| CodecError::InvalidHex(e.to_string()))
}

pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn is_hex(s: &str) -> bool {
    s.starts_with("0x")
}

/// `parent_hash` → `parentHash`
pub(crate) fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl Codec {
    /// Build a value from its JSON form.
    pub fn from_json(&self, json: &Json) -> Result<Value, CodecError> {
        match self {
            Codec::Null => Ok(Value::Null),
            Codec::Bool => json
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| CodecError::json("bool", format!("got {json}"))),
            Codec::Integer(int) | Codec::Compact(int) => int.check(&int_from_json(int, json)?),
            Codec::Str => json
                .as_str()
                .map(|s| Value::Str(s.to_string()))
                .ok_or_else(|| CodecError::json("Text", format!("got {json}"))),
            Codec::Bytes => bytes_from_json(json).map(Value::Bytes),
            Codec::Option(inner) => match json {
                Json::Null => Ok(Value::none()),
                other => Ok(Value::some(inner.from_json(other)?)),
            },
            Codec::Result { ok, err } => {
                let obj = json
                    .as_object()
                    .ok_or_else(|| CodecError::json("Result", "expected an object"))?;
                if let Some(v) = obj.get("ok").or_else(|| obj.get("Ok")) {
                    Ok(Value::Result(Ok(Box::new(ok.from_json(v)?))))
                } else if let Some(v) = obj.get("err").or_else(|| obj.get("Err")) {
                    Ok(Value::Result(Err(Box::new(err.from_json(v)?))))
                } else {
                    Err(CodecError::json("Result", "expected an `ok` or `err` key"))
                }
            }
            Codec::Sequence(elem) => match json {
                Json::String(s) if elem.is_u8() => Ok(Value::Bytes(parse_hex(s)?)),
                Json::String(s) if is_hex(s) => self.decode_all(&parse_hex(s)?),
                Json::Array(_) if elem.is_u8() => bytes_from_json(json).map(Value::Bytes),
                Json::Array(items) => Ok(Value::Sequence(
                    items
                        .iter()
                        .map(|item| elem.from_json(item))
                        .collect::<Result<_, _>>()?,
                )),
                other => Err(CodecError::json(self.name(), format!("got {other}"))),
            },
            Codec::FixedArray { elem, len } => {
                let value = match json {
                    Json::String(s) if elem.is_u8() => Value::Bytes(parse_hex(s)?),
                    Json::String(s) if is_hex(s) => return self.decode_all(&parse_hex(s)?),
                    Json::Array(_) if elem.is_u8() => Value::Bytes(bytes_from_json(json)?),
                    Json::Array(items) => Value::Sequence(
                        items
                            .iter()
                            .map(|item| elem.from_json(item))
                            .collect::<Result<_, _>>()?,
                    ),
                    other => return Err(CodecError::json(self.name(), format!("got {other}"))),
                };
                let got = match &value {
                    Value::Bytes(b) => b.len(),
                    Value::Sequence(items) => items.len(),
                    _ => 0,
                };
                if got != *len {
                    return Err(CodecError::LengthMismatch {
                        expected: *len,
                        got,
                    });
                }
                Ok(value)
            }
            Codec::Tuple(items) => match json {
                _ if items.is_empty() => Ok(Value::Null),
                Json::String(s) if is_hex(s) => self.decode_all(&parse_hex(s)?),
                Json::Array(values) => {
                    if values.len() != items.len() {
                        return Err(CodecError::LengthMismatch {
                            expected: items.len(),
                            got: values.len(),
                        });
                    }
                    Ok(Value::Tuple(
                        items
                            .iter()
                            .zip(values)
                            .map(|(c, v)| c.from_json(v))
                            .collect::<Result<_, _>>()?,
                    ))
                }
                other => Err(CodecError::json("tuple", format!("got {other}"))),
            },
            Codec::Struct(fields) => match json {
                Json::String(s) if is_hex(s) && !is_transparent(fields) => {
                    self.decode_all(&parse_hex(s)?)
                }
                _ => fields_from_json(fields, json),
            },
            Codec::Variant(variants) => variant_from_json(self, variants, json),
            Codec::Map { key, value } => match json {
                Json::Object(obj) => Ok(Value::Map(
                    obj.iter()
                        .map(|(k, v)| Ok((key.from_json(&json!(k))?, value.from_json(v)?)))
                        .collect::<Result<_, CodecError>>()?,
                )),
                Json::Array(pairs) => Ok(Value::Map(
                    pairs
                        .iter()
                        .map(|pair| match pair.as_array().map(Vec::as_slice) {
                            Some([k, v]) => Ok((key.from_json(k)?, value.from_json(v)?)),
                            _ => Err(CodecError::json("map", "expected [key, value] pairs")),
                        })
                        .collect::<Result<_, _>>()?,
                )),
                Json::String(s) if is_hex(s) => self.decode_all(&parse_hex(s)?),
                other => Err(CodecError::json("map", format!("got {other}"))),
            },
            Codec::BitSequence { .. } => match json {
                Json::String(s) if is_hex(s) => self.decode_all(&parse_hex(s)?),
                Json::Array(items) => Ok(Value::Bits(
                    items
                        .iter()
                        .map(|b| b.as_bool().ok_or_else(|| CodecError::json("bits", "expected booleans")))
                        .collect::<Result<_, _>>()?,
                )),
                other => Err(CodecError::json("bits", format!("got {other}"))),
            },
            Codec::Opaque(inner) => match json {
                Json::String(s) if is_hex(s) => self.decode_all(&parse_hex(s)?),
                other => inner.from_json(other),
            },
            Codec::Fallback { primary, fallback } => primary
                .from_json(json)
                .or_else(|_| fallback.from_json(json)),
            Codec::Recursive(r) => r.get()?.from_json(json),
        }
    }

    /// JSON form used for RPC parameters.
    pub fn to_json(&self, value: &Value) -> Result<Json, CodecError> {
        match self {
            Codec::Null => Ok(Json::Null),
            Codec::Bool => value
                .as_bool()
                .map(Json::Bool)
                .ok_or_else(|| CodecError::mismatch("bool", value.kind())),
            Codec::Integer(int) | Codec::Compact(int) => Ok(int_to_json(&int.check(value)?)),
            Codec::Str => value
                .as_str()
                .map(|s| json!(s))
                .ok_or_else(|| CodecError::mismatch("string", value.kind())),
            Codec::Bytes => match value {
                Value::Bytes(b) => Ok(json!(to_hex(b))),
                Value::Str(s) => Ok(json!(to_hex(s.as_bytes()))),
                other => Err(CodecError::mismatch("bytes", other.kind())),
            },
            Codec::Option(inner) => match value {
                Value::Option(None) | Value::Null => Ok(Json::Null),
                Value::Option(Some(v)) => inner.to_json(v),
                other => Err(CodecError::mismatch("option", other.kind())),
            },
            Codec::Result { ok, err } => match value {
                Value::Result(Ok(v)) => Ok(json!({ "ok": ok.to_json(v)? })),
                Value::Result(Err(e)) => Ok(json!({ "err": err.to_json(e)? })),
                other => Err(CodecError::mismatch("result", other.kind())),
            },
            Codec::Sequence(elem) | Codec::FixedArray { elem, .. } => match value {
                Value::Bytes(b) if elem.is_u8() => Ok(json!(to_hex(b))),
                Value::Sequence(items) | Value::Tuple(items) => Ok(Json::Array(
                    items
                        .iter()
                        .map(|item| elem.to_json(item))
                        .collect::<Result<_, _>>()?,
                )),
                other => Err(CodecError::mismatch(self.name(), other.kind())),
            },
            Codec::Tuple(items) => match value {
                _ if items.is_empty() => Ok(Json::Null),
                Value::Tuple(values) | Value::Sequence(values) if values.len() == items.len() => {
                    Ok(Json::Array(
                        items
                            .iter()
                            .zip(values)
                            .map(|(c, v)| c.to_json(v))
                            .collect::<Result<_, _>>()?,
                    ))
                }
                other => Err(CodecError::mismatch("tuple", other.kind())),
            },
            Codec::Struct(fields) => fields_to_json(fields, value),
            Codec::Variant(variants) => {
                let Value::Variant { name, index, value: inner } = value else {
                    return Err(CodecError::mismatch("variant", value.kind()));
                };
                let def = variants
                    .iter()
                    .find(|v| &v.name == name || (name.is_empty() && v.index == *index))
                    .ok_or_else(|| CodecError::UnknownVariant(name.clone()))?;
                if def.fields.is_empty() {
                    return Ok(json!(def.name));
                }
                let mut obj = Map::new();
                obj.insert(def.name.clone(), fields_to_json(&def.fields, inner)?);
                Ok(Json::Object(obj))
            }
            Codec::Map { key, value: val } => {
                let Value::Map(entries) = value else {
                    return Err(CodecError::mismatch("map", value.kind()));
                };
                let mut obj = Map::new();
                for (k, v) in entries {
                    let k = match key.to_json(k)? {
                        Json::String(s) => s,
                        other => other.to_string(),
                    };
                    obj.insert(k, val.to_json(v)?);
                }
                Ok(Json::Object(obj))
            }
            Codec::BitSequence { .. } | Codec::Opaque(_) => Ok(json!(to_hex(&self.encode(value)?))),
            Codec::Fallback { primary, fallback } => primary
                .to_json(value)
                .or_else(|_| fallback.to_json(value)),
            Codec::Recursive(r) => r.get()?.to_json(value),
        }
    }
}

fn is_transparent(fields: &[Field]) -> bool {
    matches!(fields, [single] if single.name.is_none())
}

fn int_from_json(int: &Integer, json: &Json) -> Result<Value, CodecError> {
    let bad = |reason: String| CodecError::json(int.name(), reason);
    match json {
        Json::Number(n) => {
            if let Some(v) = n.as_u64() {
                Ok(Value::Uint(u128::from(v)))
            } else if let Some(v) = n.as_i64() {
                Ok(Value::Int(i128::from(v)))
            } else {
                Err(bad(format!("{n} is not an integer")))
            }
        }
        Json::String(s) if is_hex(s) => {
            let digits = s.trim_start_matches("0x").trim_start_matches('0');
            if digits.is_empty() {
                return Ok(Value::Uint(0));
            }
            u128::from_str_radix(digits, 16)
                .map(Value::Uint)
                .map_err(|e| bad(e.to_string()))
        }
        Json::String(s) => {
            let cleaned: String = s.chars().filter(|c| *c != ',' && *c != '_').collect();
            if let Some(neg) = cleaned.strip_prefix('-') {
                neg.parse::<i128>()
                    .map(|v| Value::Int(-v))
                    .map_err(|e| bad(e.to_string()))
            } else {
                cleaned
                    .parse::<u128>()
                    .map(Value::Uint)
                    .map_err(|e| bad(e.to_string()))
            }
        }
        other => Err(bad(format!("got {other}"))),
    }
}

fn int_to_json(value: &Value) -> Json {
    match value {
        Value::Uint(v) if *v <= MAX_SAFE_INTEGER => json!(*v as u64),
        Value::Uint(v) => json!(format!("{v:#x}")),
        Value::Int(v) if v.unsigned_abs() <= MAX_SAFE_INTEGER => json!(*v as i64),
        Value::Int(v) => json!(v.to_string()),
        _ => Json::Null,
    }
}

fn bytes_from_json(json: &Json) -> Result<Vec<u8>, CodecError> {
    match json {
        Json::String(s) if is_hex(s) => parse_hex(s),
        Json::String(s) => Ok(s.as_bytes().to_vec()),
        Json::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| CodecError::json("Bytes", "array items must be bytes"))
            })
            .collect(),
        other => Err(CodecError::json("Bytes", format!("got {other}"))),
    }
}

fn fields_from_json(fields: &[Field], json: &Json) -> Result<Value, CodecError> {
    if fields.is_empty() {
        return Ok(Value::Null);
    }
    if fields.iter().all(|f| f.name.is_some()) {
        let obj = json
            .as_object()
            .ok_or_else(|| CodecError::json("struct", format!("expected an object, got {json}")))?;
        let values = fields
            .iter()
            .map(|f| {
                let name = f.name.clone().unwrap_or_default();
                let value = match obj.get(&name).or_else(|| obj.get(&camel_case(&name))) {
                    Some(v) => f.codec.from_json(v)?,
                    None => f.codec.default_value()?,
                };
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        return Ok(Value::Struct(values));
    }
    if let [single] = fields {
        return single.codec.from_json(json);
    }
    let items = json
        .as_array()
        .ok_or_else(|| CodecError::json("tuple struct", format!("expected an array, got {json}")))?;
    if items.len() != fields.len() {
        return Err(CodecError::LengthMismatch {
            expected: fields.len(),
            got: items.len(),
        });
    }
    Ok(Value::Tuple(
        fields
            .iter()
            .zip(items)
            .map(|(f, v)| f.codec.from_json(v))
            .collect::<Result<_, _>>()?,
    ))
}

fn fields_to_json(fields: &[Field], value: &Value) -> Result<Json, CodecError> {
    if fields.is_empty() {
        return Ok(Json::Null);
    }
    if fields.iter().all(|f| f.name.is_some()) {
        let mut obj = Map::new();
        for f in fields {
            let name = f.name.clone().unwrap_or_default();
            let v = value
                .field(&name)
                .ok_or_else(|| CodecError::MissingField(name.clone()))?;
            obj.insert(name, f.codec.to_json(v)?);
        }
        return Ok(Json::Object(obj));
    }
    if let [single] = fields {
        return single.codec.to_json(value);
    }
    match value {
        Value::Tuple(values) if values.len() == fields.len() => Ok(Json::Array(
            fields
                .iter()
                .zip(values)
                .map(|(f, v)| f.codec.to_json(v))
                .collect::<Result<_, _>>()?,
        )),
        other => Err(CodecError::mismatch("tuple", other.kind())),
    }
}

fn find_variant<'a>(variants: &'a [VariantDef], name: &str) -> Option<&'a VariantDef> {
    variants
        .iter()
        .find(|v| v.name == name)
        .or_else(|| variants.iter().find(|v| v.name.eq_ignore_ascii_case(name)))
}

fn variant_from_json(codec: &Codec, variants: &[VariantDef], json: &Json) -> Result<Value, CodecError> {
    match json {
        Json::String(s) if is_hex(s) => codec.decode_all(&parse_hex(s)?),
        Json::String(s) => {
            let def = find_variant(variants, s).ok_or_else(|| CodecError::UnknownVariant(s.clone()))?;
            Ok(Value::variant(def.name.clone(), def.index, fields_from_json(&def.fields, &Json::Null)?))
        }
        Json::Number(n) => {
            let index = n
                .as_u64()
                .and_then(|i| u8::try_from(i).ok())
                .ok_or_else(|| CodecError::json("enum", format!("bad index {n}")))?;
            let def = variants
                .iter()
                .find(|v| v.index == index)
                .ok_or_else(|| CodecError::UnknownDiscriminant {
                    ty: "enum".into(),
                    index,
                })?;
            Ok(Value::variant(def.name.clone(), index, fields_from_json(&def.fields, &Json::Null)?))
        }
        Json::Object(obj) if obj.len() == 1 => {
            let (name, payload) = obj.iter().next().ok_or_else(|| CodecError::json("enum", "empty object"))?;
            let def = find_variant(variants, name).ok_or_else(|| CodecError::UnknownVariant(name.clone()))?;
            Ok(Value::variant(def.name.clone(), def.index, fields_from_json(&def.fields, payload)?))
        }
        other => Err(CodecError::json("enum", format!("got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn u8c() -> Arc<Codec> {
        Arc::new(Codec::Integer(Integer::U8))
    }

    #[test]
    fn integers_from_numbers_and_hex() {
        let c = Codec::Integer(Integer::U32);
        assert_eq!(c.from_json(&json!(26)).unwrap(), Value::Uint(26));
        assert_eq!(c.from_json(&json!("0x1a")).unwrap(), Value::Uint(26));
        assert_eq!(c.from_json(&json!("1,000")).unwrap(), Value::Uint(1000));
        assert!(c.from_json(&json!("0x1_0000_0000")).is_err());
        assert!(matches!(
            c.from_json(&json!("0x100000000")),
            Err(CodecError::OutOfRange { .. })
        ));
    }

    #[test]
    fn large_integers_go_out_as_hex() {
        let c = Codec::Integer(Integer::U128);
        assert_eq!(c.to_json(&Value::Uint(5)).unwrap(), json!(5));
        assert_eq!(c.to_json(&Value::Uint(1 << 60)).unwrap(), json!("0x1000000000000000"));
    }

    #[test]
    fn fixed_bytes_from_hex_checks_length() {
        let c = Codec::FixedArray { elem: u8c(), len: 4 };
        assert_eq!(c.from_json(&json!("0x01020304")).unwrap(), Value::Bytes(vec![1, 2, 3, 4]));
        assert_eq!(
            c.from_json(&json!("0x0102")),
            Err(CodecError::LengthMismatch { expected: 4, got: 2 })
        );
        assert_eq!(c.to_json(&Value::Bytes(vec![1, 2, 3, 4])).unwrap(), json!("0x01020304"));
    }

    #[test]
    fn struct_accepts_camel_case_and_defaults() {
        let c = Codec::Struct(vec![
            Field::named("parent_hash", Arc::new(Codec::Bytes)),
            Field::named("number", Arc::new(Codec::Compact(Integer::U32))),
            Field::named("extra", Arc::new(Codec::Option(u8c()))),
        ]);
        let v = c
            .from_json(&json!({ "parentHash": "0xabcd", "number": "0x10" }))
            .unwrap();
        assert_eq!(v.field("parent_hash"), Some(&Value::Bytes(vec![0xab, 0xcd])));
        assert_eq!(v.field("number"), Some(&Value::Uint(16)));
        assert_eq!(v.field("extra"), Some(&Value::none()));
    }

    #[test]
    fn enums_from_names_objects_and_hex() {
        let c = Codec::Variant(vec![
            VariantDef {
                name: "Ready".into(),
                index: 1,
                fields: vec![],
            },
            VariantDef {
                name: "InBlock".into(),
                index: 4,
                fields: vec![Field::unnamed(Arc::new(Codec::FixedArray { elem: u8c(), len: 2 }))],
            },
        ]);
        assert_eq!(c.from_json(&json!("ready")).unwrap(), Value::variant("Ready", 1, Value::Null));
        let v = c.from_json(&json!({ "inBlock": "0xbeef" })).unwrap();
        assert_eq!(v, Value::variant("InBlock", 4, Value::Bytes(vec![0xbe, 0xef])));
        assert_eq!(c.from_json(&json!("0x04beef")).unwrap(), v);
        assert_eq!(c.to_json(&v).unwrap(), json!({ "InBlock": "0xbeef" }));
    }

    #[test]
    fn composite_from_scale_hex() {
        let c = Codec::Sequence(Arc::new(Codec::Integer(Integer::U16)));
        assert_eq!(
            c.from_json(&json!("0x080100ff00")).unwrap(),
            Value::Sequence(vec![Value::Uint(1), Value::Uint(255)])
        );
    }

    #[test]
    fn tuples_and_options() {
        let c = Codec::Tuple(vec![Arc::new(Codec::Bytes), Arc::new(Codec::Option(Arc::new(Codec::Bytes)))]);
        let v = c.from_json(&json!(["0x01", null])).unwrap();
        assert_eq!(v, Value::Tuple(vec![Value::Bytes(vec![1]), Value::none()]));
        assert_eq!(c.to_json(&v).unwrap(), json!(["0x01", null]));
    }

    #[test]
    fn camel_case_conversion() {
        assert_eq!(camel_case("extrinsics_root"), "extrinsicsRoot");
        assert_eq!(camel_case("number"), "number");
    }
}
