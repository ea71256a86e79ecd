//! chainscale-metadata — runtime metadata decoding and the version upgrade chain.
//!
//! Metadata arrives as a `b"meta"` envelope in one of versions 9 to 14. Each
//! version is decoded into its own wire structures, then walked forward one
//! version at a time until it reaches [`MetadataLatest`]: a dense type graph
//! plus the pallets referencing it.
//!
//! ```text
//! V9 → V10 → V11 → V12 → V13 → V14 → Latest
//! ```

pub mod envelope;
pub mod error;
pub mod latest;
pub mod legacy;
pub mod storage;
pub mod upgrade;
pub mod v14;

pub use envelope::{decode_envelope, decode_metadata, decode_metadata_hex, encode_envelope, MAGIC};
pub use error::MetadataError;
pub use latest::{
    ConstantMetadata, ExtrinsicMetadata, FieldDescriptor, MetadataLatest, PalletMetadata,
    PalletStorage, PortableType, Primitive, SignedExtension, StorageEntry, StorageEntryType,
    TypeDescriptor, TypeGraph, TypeId, TypeParam, VariantDescriptor,
};
pub use storage::{HasherV9, StorageHasher, StorageModifier};
pub use upgrade::RuntimeMetadata;
