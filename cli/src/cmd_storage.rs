//! `chainscale storage-key` — storage key construction.

use anyhow::{Context, Result};

use chainscale_codec::to_hex;
use chainscale_registry::TypeRegistry;
use chainscale_rpc::storage::{is_complete, storage_key};

pub fn key(registry: &TypeRegistry, pallet: &str, entry: &str, keys: &str) -> Result<()> {
    let keys: Vec<serde_json::Value> = serde_json::from_str(keys).context("parse keys JSON")?;
    let section = registry.section(pallet)?;
    let def = section.storage(entry)?;

    let key = storage_key(def, &keys)?;
    println!("{}", to_hex(&key));
    if !is_complete(def, &keys) {
        eprintln!(
            "(prefix: {} of {} key arguments given)",
            keys.len(),
            def.hashers().len()
        );
    }
    Ok(())
}
