//! JSON type definitions, the format chain type bundles are written in.
//!
//! ```json
//! {
//!   "Balance": "u128",
//!   "AccountData": { "free": "Balance", "reserved": "Balance" },
//!   "Phase": { "_enum": { "ApplyExtrinsic": "u32", "Finalization": "Null" } },
//!   "Status": { "_enum": ["Active", "Retired"] },
//!   "Legacy": { "_fallback": "Bytes", "_enum": ["V1"] }
//! }
//! ```

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::error::ResolutionError;
use crate::typename::TypeName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantPayload {
    Unit,
    Single(TypeName),
    Fields(Vec<(String, TypeName)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVariant {
    pub name: String,
    pub index: u8,
    pub payload: VariantPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDefinition {
    Alias(TypeName),
    Struct(Vec<(String, TypeName)>),
    Enum(Vec<EnumVariant>),
    /// Decode as `primary`; on failure rewind and decode as `fallback`.
    Fallback {
        primary: Box<TypeDefinition>,
        fallback: TypeName,
    },
}

impl TypeDefinition {
    pub fn from_json(name: &str, json: &Json) -> Result<Self, ResolutionError> {
        let invalid = |reason: &str| ResolutionError::InvalidDefinition {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        match json {
            Json::String(target) => Ok(Self::Alias(TypeName::parse(target)?)),
            Json::Object(map) => {
                if let Some(fallback) = map.get("_fallback") {
                    let fallback = fallback
                        .as_str()
                        .ok_or_else(|| invalid("_fallback must be a type name"))?;
                    let rest: serde_json::Map<String, Json> = map
                        .iter()
                        .filter(|(k, _)| k.as_str() != "_fallback")
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    return Ok(Self::Fallback {
                        primary: Box::new(Self::from_json(name, &Json::Object(rest))?),
                        fallback: TypeName::parse(fallback)?,
                    });
                }
                if let Some(variants) = map.get("_enum") {
                    return Ok(Self::Enum(parse_enum(name, variants)?));
                }
                if let Some(key) = map.keys().find(|k| k.starts_with('_')) {
                    return Err(invalid(&format!("unsupported directive {key}")));
                }
                Ok(Self::Struct(parse_fields(name, map)?))
            }
            _ => Err(invalid("expected a type name or an object")),
        }
    }
}

fn parse_fields(
    name: &str,
    map: &serde_json::Map<String, Json>,
) -> Result<Vec<(String, TypeName)>, ResolutionError> {
    map.iter()
        .map(|(field, ty)| {
            let ty = ty.as_str().ok_or_else(|| ResolutionError::InvalidDefinition {
                name: name.to_string(),
                reason: format!("field {field} must be a type name"),
            })?;
            Ok((field.clone(), TypeName::parse(ty)?))
        })
        .collect()
}

fn parse_enum(name: &str, json: &Json) -> Result<Vec<EnumVariant>, ResolutionError> {
    let invalid = |reason: String| ResolutionError::InvalidDefinition {
        name: name.to_string(),
        reason,
    };
    let index_of = |position: usize| {
        u8::try_from(position).map_err(|_| invalid("more than 256 variants".into()))
    };
    match json {
        Json::Array(names) => names
            .iter()
            .enumerate()
            .map(|(position, v)| {
                let variant = v
                    .as_str()
                    .ok_or_else(|| invalid("variant names must be strings".into()))?;
                Ok(EnumVariant {
                    name: variant.to_string(),
                    index: index_of(position)?,
                    payload: VariantPayload::Unit,
                })
            })
            .collect(),
        Json::Object(map) => map
            .iter()
            .enumerate()
            .map(|(position, (variant, payload))| {
                let (index, payload) = match payload {
                    Json::Number(n) => {
                        let index = n
                            .as_u64()
                            .and_then(|i| u8::try_from(i).ok())
                            .ok_or_else(|| invalid(format!("bad index for {variant}")))?;
                        (index, VariantPayload::Unit)
                    }
                    Json::String(ty) if ty == "Null" => (index_of(position)?, VariantPayload::Unit),
                    Json::String(ty) => (
                        index_of(position)?,
                        VariantPayload::Single(TypeName::parse(ty)?),
                    ),
                    Json::Object(fields) => (
                        index_of(position)?,
                        VariantPayload::Fields(parse_fields(name, fields)?),
                    ),
                    _ => return Err(invalid(format!("bad payload for {variant}"))),
                };
                Ok(EnumVariant {
                    name: variant.clone(),
                    index,
                    payload,
                })
            })
            .collect(),
        _ => Err(invalid("_enum must be an array or an object".into())),
    }
}

/// An ordered set of named definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Definitions {
    types: IndexMap<String, TypeDefinition>,
}

impl Definitions {
    /// Parse a `{ "Name": definition, ... }` object.
    pub fn from_json(json: &Json) -> Result<Self, ResolutionError> {
        let map = json.as_object().ok_or_else(|| ResolutionError::InvalidDefinition {
            name: "<bundle>".into(),
            reason: "type bundle must be a JSON object".into(),
        })?;
        let types = map
            .iter()
            .map(|(name, def)| Ok((name.clone(), TypeDefinition::from_json(name, def)?)))
            .collect::<Result<_, ResolutionError>>()?;
        Ok(Self { types })
    }

    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, def: TypeDefinition) {
        self.types.insert(name.into(), def);
    }

    /// Later definitions replace earlier ones with the same name.
    pub fn extend(&mut self, other: Definitions) {
        self.types.extend(other.types);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alias_struct_and_enum_forms() {
        let defs = Definitions::from_json(&json!({
            "Balance": "u128",
            "AccountData": { "free": "Balance", "reserved": "Balance" },
            "Status": { "_enum": ["Active", "Retired"] },
            "Phase": { "_enum": { "ApplyExtrinsic": "u32", "Finalization": "Null" } },
        }))
        .unwrap();

        assert_eq!(defs.len(), 4);
        assert_eq!(defs.get("Balance"), Some(&TypeDefinition::Alias(TypeName::named("u128"))));

        let Some(TypeDefinition::Struct(fields)) = defs.get("AccountData") else {
            panic!("expected struct");
        };
        let names: Vec<_> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["free", "reserved"]);

        let Some(TypeDefinition::Enum(variants)) = defs.get("Phase") else {
            panic!("expected enum");
        };
        assert_eq!(variants[0].payload, VariantPayload::Single(TypeName::named("u32")));
        assert_eq!(variants[1].payload, VariantPayload::Unit);
        assert_eq!(variants[1].index, 1);
    }

    #[test]
    fn indexed_enum_and_fallback() {
        let def = TypeDefinition::from_json(
            "Legacy",
            &json!({ "_fallback": "Bytes", "_enum": { "A": 0, "B": 7 } }),
        )
        .unwrap();
        let TypeDefinition::Fallback { primary, fallback } = def else {
            panic!("expected fallback");
        };
        assert_eq!(fallback, TypeName::named("Bytes"));
        let TypeDefinition::Enum(variants) = *primary else {
            panic!("expected enum primary");
        };
        assert_eq!(variants[1].index, 7);
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(TypeDefinition::from_json("X", &json!(5)).is_err());
        assert!(TypeDefinition::from_json("X", &json!({ "a": 1 })).is_err());
        assert!(TypeDefinition::from_json("X", &json!({ "_set": {} })).is_err());
        assert!(TypeDefinition::from_json("X", &json!({ "_enum": "A" })).is_err());
        assert!(Definitions::from_json(&json!([])).is_err());
    }
}
