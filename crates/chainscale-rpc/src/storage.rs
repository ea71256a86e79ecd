//! Storage key construction.
//!
//! A key is `twox128(prefix) ++ twox128(entry)` followed by one hashed
//! segment per supplied key argument, each with the hasher the metadata
//! names for that segment. Supplying fewer arguments than hashers gives a
//! prefix for key iteration.

use serde_json::Value as Json;

use chainscale_codec::{CodecError, TypedValue};
use chainscale_registry::StorageEntryDef;

use crate::error::RpcError;
use crate::hashing::{hash, twox_128};

/// Length of the `twox128(prefix) ++ twox128(entry)` head.
pub const ENTRY_PREFIX_LEN: usize = 32;

pub fn entry_prefix(prefix: &str, entry: &str) -> Vec<u8> {
    let mut out = twox_128(prefix.as_bytes());
    out.extend(twox_128(entry.as_bytes()));
    out
}

fn label(entry: &StorageEntryDef) -> String {
    format!("{}.{}", entry.prefix, entry.name)
}

/// Build the key for `entry` from zero or more JSON key arguments.
pub fn storage_key(entry: &StorageEntryDef, keys: &[Json]) -> Result<Vec<u8>, RpcError> {
    let hashers = entry.hashers();
    if keys.len() > hashers.len() {
        return Err(RpcError::StorageKeyCount {
            entry: label(entry),
            expected: hashers.len(),
            got: keys.len(),
        });
    }
    let mut out = entry_prefix(&entry.prefix, &entry.name);
    if keys.is_empty() {
        return Ok(out);
    }

    let codecs = entry.keys()?;
    for (i, ((hasher, codec), arg)) in hashers.iter().zip(codecs).zip(keys).enumerate() {
        let encoded = TypedValue::from_json(codec, arg).map_err(|source| RpcError::Argument {
            method: label(entry),
            param: format!("key {i}"),
            source,
        })?;
        out.extend(hash(*hasher, encoded.as_bytes()));
    }
    Ok(out)
}

/// Whether `keys` addresses a single value rather than an iteration prefix.
pub fn is_complete(entry: &StorageEntryDef, keys: &[Json]) -> bool {
    keys.len() == entry.hashers().len()
}

/// Recover key arguments from a full storage key. Segments behind a
/// non-concat hasher cannot be recovered and come back as `None`.
pub fn decode_key_args(entry: &StorageEntryDef, key: &[u8]) -> Result<Vec<Option<TypedValue>>, RpcError> {
    let expected = entry_prefix(&entry.prefix, &entry.name);
    if !key.starts_with(&expected) {
        return Err(RpcError::UnexpectedResponse {
            method: label(entry),
            reason: "key does not belong to this storage entry".into(),
        });
    }
    let mut rest = &key[ENTRY_PREFIX_LEN..];
    let codecs = entry.keys()?;
    let mut args = Vec::with_capacity(codecs.len());
    for (hasher, codec) in entry.hashers().iter().zip(codecs) {
        let skip = hasher.hash_len();
        if rest.len() < skip {
            return Err(CodecError::Truncated {
                needed: skip,
                remaining: rest.len(),
            }
            .into());
        }
        rest = &rest[skip..];
        if hasher.is_concat() {
            let (value, used) = TypedValue::decode_prefix(codec, rest)?;
            rest = &rest[used..];
            args.push(Some(value));
        } else {
            args.push(None);
        }
    }
    if !rest.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: rest.len(),
        }
        .into());
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::sample_metadata;
    use chainscale_metadata::RuntimeMetadata;
    use chainscale_registry::TypeRegistry;
    use serde_json::json;

    fn registry() -> TypeRegistry {
        TypeRegistry::new(RuntimeMetadata::V13(sample_metadata()).into_latest().unwrap())
    }

    #[test]
    fn plain_entries_are_just_the_prefix() {
        let registry = registry();
        let section = registry.section("System").unwrap();
        let events = section.storage("Events").unwrap();
        let key = storage_key(events, &[]).unwrap();
        assert_eq!(
            hex::encode(&key),
            "26aa394eea5630e07c48ae0c9558cef780d41e5e16056765bc8461851072c9d7"
        );
        assert!(is_complete(events, &[]));
        assert!(decode_key_args(events, &key).unwrap().is_empty());
    }

    #[test]
    fn malformed_key_arguments_name_the_segment() {
        let registry = registry();
        let section = registry.section("System").unwrap();
        let account = section.storage("Account").unwrap();
        let err = storage_key(account, &[json!("0x01")]).unwrap_err();
        assert!(matches!(err, RpcError::Argument { ref param, .. } if param == "key 0"));
    }

    #[test]
    fn foreign_and_truncated_keys_are_rejected() {
        let registry = registry();
        let section = registry.section("System").unwrap();
        let account = section.storage("Account").unwrap();
        let events = section.storage("Events").unwrap();

        let events_key = storage_key(events, &[]).unwrap();
        assert!(matches!(
            decode_key_args(account, &events_key),
            Err(RpcError::UnexpectedResponse { .. })
        ));

        let prefix = storage_key(account, &[]).unwrap();
        let mut short = prefix.clone();
        short.extend([0u8; 10]);
        assert!(matches!(
            decode_key_args(account, &short),
            Err(RpcError::Codec(CodecError::Truncated { needed: 16, remaining: 10 }))
        ));
    }
}
