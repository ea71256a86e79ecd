//! Registry errors.

use chainscale_codec::CodecError;
use thiserror::Error;

/// Why a type or pallet item could not be resolved. Failed resolutions are
/// never cached; a later call retries from scratch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("type not found: {0}")]
    TypeNotFound(String),

    #[error("type id {0} is not in the type graph")]
    UnknownTypeId(u32),

    #[error("cannot construct {name}: {reason}")]
    CannotConstruct { name: String, reason: String },

    #[error("invalid type name {name:?}: {reason}")]
    InvalidTypeName { name: String, reason: String },

    #[error("invalid type definition for {name}: {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("unknown pallet: {0}")]
    UnknownPallet(String),

    #[error("pallet {pallet} has no {kind} named {name}")]
    UnknownEntry {
        pallet: String,
        kind: &'static str,
        name: String,
    },

    #[error("registry has been closed")]
    RegistryClosed,
}

impl ResolutionError {
    pub(crate) fn cannot(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CannotConstruct {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of an operation that both resolves types and runs a codec.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
