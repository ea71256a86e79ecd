//! Schema-level errors.

use chainscale_codec::CodecError;
use thiserror::Error;

/// Failures while decoding or upgrading runtime metadata. A failure leaves
/// no partially populated metadata behind.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The payload does not start with `b"meta"`.
    #[error("bad metadata magic: expected 0x6d657461, found {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unsupported metadata version {0} (supported: 9 to 14)")]
    UnsupportedVersion(u8),

    /// Truncated or malformed payload.
    #[error("malformed metadata payload: {0}")]
    Codec(#[from] CodecError),

    /// A descriptor or pallet refers to a type id missing from the table.
    #[error("type id {id} referenced by {context} is not in the type table")]
    UnknownTypeId { id: u32, context: String },

    #[error("type table entry {position} declares id {id}; ids must be dense")]
    NonDenseTypeIds { position: usize, id: u32 },

    /// A list position that does not fit the one-byte index it becomes.
    #[error("{context}: position {position} does not fit a one-byte index")]
    IndexOverflow { context: String, position: usize },

    #[error("invalid metadata hex: {0}")]
    InvalidHex(String),

    #[error("metadata in {0} form cannot be encoded")]
    NotEncodable(&'static str),
}
