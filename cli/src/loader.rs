//! Loads metadata from disk into a [`TypeRegistry`].

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::debug;

use chainscale_metadata::{decode_metadata, decode_metadata_hex, MetadataLatest, MAGIC};
use chainscale_registry::TypeRegistry;
use chainscale_rpc::ClientConfig;

fn read_metadata(path: &Path) -> Result<MetadataLatest> {
    let bytes = std::fs::read(path).with_context(|| format!("read metadata '{}'", path.display()))?;
    if bytes.starts_with(&MAGIC) {
        return Ok(decode_metadata(&bytes)?);
    }

    let text = String::from_utf8(bytes).context("metadata is neither binary nor text")?;
    let text = text.trim();
    if text.starts_with('{') {
        let response: serde_json::Value = serde_json::from_str(text).context("parse JSON-RPC response")?;
        let hex = response
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow!("JSON file has no string `result`"))?;
        return Ok(decode_metadata_hex(hex)?);
    }
    Ok(decode_metadata_hex(text)?)
}

pub fn registry(path: &Path, config: &ClientConfig) -> Result<TypeRegistry> {
    let metadata = read_metadata(path)?;
    debug!(version = metadata.source_version, pallets = metadata.pallets.len(), "metadata loaded");
    let registry = TypeRegistry::new(metadata);
    registry.register_types(&config.types)?;
    for (pallet, aliases) in &config.aliases {
        for (from, to) in aliases {
            registry.set_alias(pallet, from, to)?;
        }
    }
    Ok(registry)
}
