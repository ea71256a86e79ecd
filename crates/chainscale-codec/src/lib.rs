//! chainscale-codec — SCALE codec primitives for chainscale.
//!
//! # Overview
//!
//! - [`compact`]: variable-length integers, canonical decoding only
//! - [`Codec`]: runtime type shapes that encode/decode [`Value`]s
//! - [`TypedValue`]: encoded bytes paired with their codec
//! - [`Encode`] / [`Decode`]: static codecs for fixed schema structures
//! - JSON mapping (`Codec::from_json` / `Codec::to_json`) for RPC payloads

pub mod codec;
pub mod compact;
pub mod error;
pub mod input;
pub mod instance;
pub mod json;
pub mod scale;
pub mod value;

pub use codec::{
    BitOrder, Codec, CodecRef, Field, Integer, RecursiveRef, VariantDef, MAX_ZERO_SIZED_ITEMS,
};
pub use compact::{compact_len, compact_to_vec, decode_compact, encode_compact};
pub use error::CodecError;
pub use input::{Input, MAX_DEPTH};
pub use instance::TypedValue;
pub use json::{parse_hex, to_hex};
pub use scale::{Compact, Decode, Encode};
pub use value::Value;
