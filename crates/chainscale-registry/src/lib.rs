//! chainscale-registry — metadata-driven type registry.
//!
//! A [`TypeRegistry`] turns type references, either graph ids from the
//! metadata or textual Rust type names, into [`Codec`]s. Codecs are built
//! lazily, memoized per registry, and shared as `Arc`s; pallet surfaces are
//! exposed as lazily built [`Section`]s.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use chainscale_registry::TypeRegistry;
//!
//! let registry = TypeRegistry::new(metadata);
//! registry.register_types(&serde_json::json!({ "Balance": "u64" }))?;
//! let call = registry.section("Balances")?.call("transfer")?.encode(&args)?;
//! ```
//!
//! [`Codec`]: chainscale_codec::Codec

#![recursion_limit = "512"]

pub mod builtins;
pub mod definition;
pub mod error;
pub mod registry;
pub mod section;
pub mod typename;

pub use definition::{Definitions, TypeDefinition};
pub use error::{RegistryError, ResolutionError};
pub use registry::{DecodedEvent, TypeRef, TypeRegistry};
pub use section::{CallDef, ConstantDef, ErrorDef, EventDef, Section, StorageEntryDef};
pub use typename::TypeName;
