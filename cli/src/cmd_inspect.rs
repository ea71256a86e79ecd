//! `chainscale inspect` — metadata summaries.

use anyhow::Result;
use serde_json::{json, Value};

use chainscale_codec::Field;
use chainscale_registry::TypeRegistry;

fn signature(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| match &f.name {
            Some(name) => format!("{name}: {}", f.codec.name()),
            None => f.codec.name(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn summary(registry: &TypeRegistry, as_json: bool) -> Result<()> {
    let metadata = registry.metadata();
    if as_json {
        let pallets: Vec<_> = metadata
            .pallets
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "index": p.index,
                    "calls": metadata.call_names(p).len(),
                    "events": metadata.event_names(p).len(),
                    "errors": metadata.error_names(p).len(),
                    "storage": p.storage.as_ref().map_or(0, |s| s.entries.len()),
                    "constants": p.constants.len(),
                })
            })
            .collect();
        let out = json!({
            "source_version": metadata.source_version,
            "types": metadata.types.len(),
            "pallets": pallets,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Metadata V{} ({} types)", metadata.source_version, metadata.types.len());
    println!("Pallets:");
    for p in &metadata.pallets {
        println!(
            "  #{:<3} {:24} calls={:<3} events={:<3} errors={:<3} storage={:<3} constants={}",
            p.index,
            p.name,
            metadata.call_names(p).len(),
            metadata.event_names(p).len(),
            metadata.error_names(p).len(),
            p.storage.as_ref().map_or(0, |s| s.entries.len()),
            p.constants.len(),
        );
    }
    Ok(())
}

pub fn pallet(registry: &TypeRegistry, name: &str, as_json: bool) -> Result<()> {
    let section = registry.section(name)?;

    if as_json {
        let calls: Vec<_> = section
            .calls()
            .values()
            .map(|c| -> Result<Value> {
                Ok(json!({ "name": c.name, "index": c.index, "args": signature(&c.args()?) }))
            })
            .collect::<Result<_>>()?;
        let events: Vec<_> = section
            .events()
            .values()
            .map(|e| -> Result<Value> {
                Ok(json!({ "name": e.name, "index": e.index, "fields": signature(&e.fields()?) }))
            })
            .collect::<Result<_>>()?;
        let errors: Vec<_> = section
            .errors()
            .values()
            .map(|e| json!({ "name": e.name, "index": e.index }))
            .collect();
        let storage: Vec<_> = section
            .storage_entries()
            .values()
            .map(|s| {
                json!({
                    "name": s.name,
                    "hashers": format!("{:?}", s.hashers()),
                    "modifier": format!("{:?}", s.modifier),
                })
            })
            .collect();
        let out = json!({
            "name": section.name(),
            "index": section.index(),
            "calls": calls,
            "events": events,
            "errors": errors,
            "storage": storage,
            "constants": section.constants().keys().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Pallet {} (#{})", section.name(), section.index());
    println!("Calls:");
    for call in section.calls().values() {
        println!("  {:>3}  {}({})", call.index, call.name, signature(&call.args()?));
    }
    println!("Events:");
    for event in section.events().values() {
        println!("  {:>3}  {}({})", event.index, event.name, signature(&event.fields()?));
    }
    println!("Errors:");
    for error in section.errors().values() {
        println!("  {:>3}  {}", error.index, error.name);
    }
    println!("Storage:");
    for entry in section.storage_entries().values() {
        println!(
            "       {}: {} {:?} {:?}",
            entry.name,
            entry.value()?.name(),
            entry.modifier,
            entry.hashers()
        );
    }
    println!("Constants:");
    for constant in section.constants().values() {
        println!("       {} = {}", constant.name, constant.decoded()?.to_human());
    }
    Ok(())
}
