//! The `b"meta" ++ version ++ payload` envelope returned by
//! `state_getMetadata`.

use chainscale_codec::{parse_hex, Decode, Encode, Input};
use tracing::debug;

use crate::error::MetadataError;
use crate::latest::MetadataLatest;
use crate::upgrade::RuntimeMetadata;

pub const MAGIC: [u8; 4] = *b"meta";

/// Decode an envelope into the version it was written in. The whole buffer
/// must be consumed.
pub fn decode_envelope(bytes: &[u8]) -> Result<RuntimeMetadata, MetadataError> {
    let mut input = Input::new(bytes);
    let magic: [u8; 4] = input.read_array()?;
    if magic != MAGIC {
        return Err(MetadataError::BadMagic {
            found: u32::from_be_bytes(magic),
        });
    }
    let version = input.read_byte()?;
    let metadata = match version {
        9 => RuntimeMetadata::V9(Decode::decode(&mut input)?),
        10 => RuntimeMetadata::V10(Decode::decode(&mut input)?),
        11 => RuntimeMetadata::V11(Decode::decode(&mut input)?),
        12 => RuntimeMetadata::V12(Decode::decode(&mut input)?),
        13 => RuntimeMetadata::V13(Decode::decode(&mut input)?),
        14 => RuntimeMetadata::V14(Decode::decode(&mut input)?),
        other => return Err(MetadataError::UnsupportedVersion(other)),
    };
    input.finish()?;
    debug!(version, bytes = bytes.len(), "metadata envelope decoded");
    Ok(metadata)
}

/// Encode an envelope. Only wire versions can be encoded.
pub fn encode_envelope(metadata: &RuntimeMetadata) -> Result<Vec<u8>, MetadataError> {
    let mut out = MAGIC.to_vec();
    match metadata {
        RuntimeMetadata::V9(m) => {
            out.push(9);
            m.encode_to(&mut out);
        }
        RuntimeMetadata::V10(m) => {
            out.push(10);
            m.encode_to(&mut out);
        }
        RuntimeMetadata::V11(m) => {
            out.push(11);
            m.encode_to(&mut out);
        }
        RuntimeMetadata::V12(m) => {
            out.push(12);
            m.encode_to(&mut out);
        }
        RuntimeMetadata::V13(m) => {
            out.push(13);
            m.encode_to(&mut out);
        }
        RuntimeMetadata::V14(m) => {
            out.push(14);
            m.encode_to(&mut out);
        }
        RuntimeMetadata::Latest(_) => return Err(MetadataError::NotEncodable("latest")),
    }
    Ok(out)
}

/// Decode and upgrade in one go.
pub fn decode_metadata(bytes: &[u8]) -> Result<MetadataLatest, MetadataError> {
    decode_envelope(bytes)?.into_latest()
}

/// Same as [`decode_metadata`] for the `0x`-prefixed hex of an RPC response.
pub fn decode_metadata_hex(hex: &str) -> Result<MetadataLatest, MetadataError> {
    let bytes = parse_hex(hex).map_err(|e| MetadataError::InvalidHex(e.to_string()))?;
    decode_metadata(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::MetadataV9;

    #[test]
    fn rejects_bad_magic() {
        let err = decode_envelope(b"atem\x09\x00").unwrap_err();
        assert!(matches!(err, MetadataError::BadMagic { found: 0x6174656d }));
    }

    #[test]
    fn rejects_versions_outside_range() {
        for version in [8u8, 15] {
            let err = decode_envelope(&[b'm', b'e', b't', b'a', version, 0]).unwrap_err();
            assert!(matches!(err, MetadataError::UnsupportedVersion(v) if v == version));
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let err = decode_envelope(b"meta\x09\x00\xff").unwrap_err();
        assert!(matches!(err, MetadataError::Codec(_)));
    }

    #[test]
    fn empty_v9_envelope() {
        let bytes = encode_envelope(&RuntimeMetadata::V9(MetadataV9 { modules: vec![] })).unwrap();
        assert_eq!(bytes, b"meta\x09\x00");
        let latest = decode_metadata(&bytes).unwrap();
        assert_eq!(latest.source_version, 9);
        assert!(latest.pallets.is_empty());
    }

    #[test]
    fn latest_cannot_be_encoded() {
        let err = encode_envelope(&RuntimeMetadata::Latest(Default::default())).unwrap_err();
        assert!(matches!(err, MetadataError::NotEncodable(_)));
    }

    #[test]
    fn hex_entry_point() {
        assert_eq!(decode_metadata_hex("0x6d6574610900").unwrap().source_version, 9);
        assert!(matches!(
            decode_metadata_hex("0xzz"),
            Err(MetadataError::InvalidHex(_))
        ));
    }
}
