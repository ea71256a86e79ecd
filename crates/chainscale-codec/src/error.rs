//! Codec error types.

use thiserror::Error;

/// Errors raised while encoding or decoding a SCALE value.
///
/// A decode that fails never yields a partially constructed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input ended before the value was complete.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A compact integer used a wider form than its magnitude requires.
    #[error("non-canonical compact encoding: {value} encoded in the {mode}-byte form")]
    NonCanonicalCompact { value: u128, mode: usize },

    /// A compact integer does not fit into the target width.
    #[error("compact integer does not fit into {bits} bits")]
    CompactOverflow { bits: u16 },

    /// Enum discriminant byte not declared by the type.
    #[error("unknown discriminant {index} for {ty}")]
    UnknownDiscriminant { ty: String, index: u8 },

    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    /// Value is outside the range of the target integer.
    #[error("value {value} out of range for {ty}")]
    OutOfRange { ty: String, value: String },

    /// Runtime shape of a value does not match the codec.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    /// Element or byte count does not match a fixed-size type.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// Bytes left over after a value that must consume its whole input.
    #[error("{remaining} trailing bytes after decode")]
    TrailingBytes { remaining: usize },

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("unknown variant '{0}'")]
    UnknownVariant(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// JSON input cannot be mapped onto the codec.
    #[error("cannot read {ty} from JSON: {reason}")]
    InvalidJson { ty: String, reason: String },

    /// A recursive reference outlived the registry that owned its target.
    #[error("recursive type '{0}' is no longer available")]
    DanglingRecursion(String),

    /// Recursive types nested deeper than the decoder allows.
    #[error("recursion deeper than {max} levels")]
    DepthLimit { max: usize },

    /// A length prefix for zero-sized items above the accepted maximum.
    #[error("{len} zero-sized items exceeds the limit of {max}")]
    TooManyItems { len: usize, max: usize },

    /// The codec cannot be used in this position.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl CodecError {
    pub(crate) fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub(crate) fn json(ty: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidJson {
            ty: ty.into(),
            reason: reason.into(),
        }
    }
}
