//! Built-in JSON-RPC method table.
//!
//! Each method names its parameter types and return type as registry type
//! names; arguments are validated against those types before a request is
//! sent. The return type `Json` skips decoding entirely.

use indexmap::IndexMap;

/// Return type that passes the raw JSON result through undecoded.
pub const RAW_JSON: &str = "Json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcParam {
    pub name: String,
    pub ty: String,
    /// Optional parameters must trail the required ones; they may be omitted.
    pub optional: bool,
}

/// Notification kind plus the subscribe/unsubscribe method names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSub {
    pub notification: String,
    pub subscribe: String,
    pub unsubscribe: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcMethod {
    pub section: String,
    pub method: String,
    pub description: String,
    pub params: Vec<RpcParam>,
    pub ty: String,
    pub pubsub: Option<PubSub>,
}

impl RpcMethod {
    pub fn new(section: &str, method: &str, ty: &str) -> Self {
        Self {
            section: section.to_string(),
            method: method.to_string(),
            description: String::new(),
            params: Vec::new(),
            ty: ty.to_string(),
            pubsub: None,
        }
    }

    pub fn param(mut self, name: &str, ty: &str) -> Self {
        self.params.push(RpcParam {
            name: name.to_string(),
            ty: ty.to_string(),
            optional: false,
        });
        self
    }

    pub fn optional(mut self, name: &str, ty: &str) -> Self {
        self.params.push(RpcParam {
            name: name.to_string(),
            ty: ty.to_string(),
            optional: true,
        });
        self
    }

    /// Make this a subscription. `notification` and the method names are
    /// given without the section prefix.
    pub fn pubsub(mut self, notification: &str, subscribe: &str, unsubscribe: &str) -> Self {
        self.pubsub = Some(PubSub {
            notification: format!("{}_{notification}", self.section),
            subscribe: format!("{}_{subscribe}", self.section),
            unsubscribe: format!("{}_{unsubscribe}", self.section),
        });
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// `section_method`, the name sent on the wire.
    pub fn rpc_name(&self) -> String {
        format!("{}_{}", self.section, self.method)
    }

    pub fn is_subscription(&self) -> bool {
        self.pubsub.is_some()
    }

    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }

    pub fn returns_raw(&self) -> bool {
        self.ty == RAW_JSON
    }
}

/// Methods keyed by `section_method`.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: IndexMap<String, RpcMethod>,
}

impl MethodTable {
    /// The standard `chain`, `state`, `system` and `author` sections.
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for method in builtin_methods() {
            table.register(method);
        }
        table
    }

    /// Add or replace a method.
    pub fn register(&mut self, method: RpcMethod) {
        self.methods.insert(method.rpc_name(), method);
    }

    pub fn get(&self, section: &str, method: &str) -> Option<&RpcMethod> {
        self.methods.get(&format!("{section}_{method}"))
    }

    pub fn sections(&self) -> Vec<&str> {
        let mut sections: Vec<&str> = self.methods.values().map(|m| m.section.as_str()).collect();
        sections.dedup();
        sections
    }

    pub fn iter(&self) -> impl Iterator<Item = &RpcMethod> {
        self.methods.values()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

fn builtin_methods() -> Vec<RpcMethod> {
    vec![
        // chain
        RpcMethod::new("chain", "getBlockHash", "Hash")
            .optional("blockNumber", "BlockNumber")
            .describe("Get the block hash for a specific block"),
        RpcMethod::new("chain", "getHeader", "Header")
            .optional("hash", "Hash")
            .describe("Retrieves the header for a specific block"),
        RpcMethod::new("chain", "getBlock", "SignedBlock")
            .optional("hash", "Hash")
            .describe("Get header and body of a relay chain block"),
        RpcMethod::new("chain", "getFinalizedHead", "Hash")
            .describe("Get hash of the last finalized block in the canon chain"),
        RpcMethod::new("chain", "subscribeNewHeads", "Header")
            .pubsub("newHead", "subscribeNewHead", "unsubscribeNewHead")
            .describe("Retrieves the best header via subscription"),
        RpcMethod::new("chain", "subscribeFinalizedHeads", "Header")
            .pubsub("finalizedHead", "subscribeFinalizedHeads", "unsubscribeFinalizedHeads")
            .describe("Retrieves the best finalized header via subscription"),
        RpcMethod::new("chain", "subscribeAllHeads", "Header")
            .pubsub("allHead", "subscribeAllHeads", "unsubscribeAllHeads")
            .describe("Retrieves the newest header via subscription"),
        // state
        RpcMethod::new("state", "getMetadata", "Bytes")
            .optional("at", "BlockHash")
            .describe("Returns the runtime metadata"),
        RpcMethod::new("state", "getRuntimeVersion", "RuntimeVersion")
            .optional("at", "BlockHash")
            .describe("Get the runtime version"),
        RpcMethod::new("state", "getStorage", "Option<StorageData>")
            .param("key", "StorageKey")
            .optional("at", "BlockHash")
            .describe("Retrieves the storage for a key"),
        RpcMethod::new("state", "getStorageSize", "Option<u64>")
            .param("key", "StorageKey")
            .optional("at", "BlockHash")
            .describe("Retrieves the storage size"),
        RpcMethod::new("state", "getKeys", "Vec<StorageKey>")
            .param("prefix", "StorageKey")
            .optional("at", "BlockHash")
            .describe("Retrieves the keys with a certain prefix"),
        RpcMethod::new("state", "getKeysPaged", "Vec<StorageKey>")
            .param("prefix", "StorageKey")
            .param("count", "u32")
            .optional("startKey", "StorageKey")
            .optional("at", "BlockHash")
            .describe("Returns the keys with prefix with pagination support"),
        RpcMethod::new("state", "queryStorageAt", "Vec<StorageChangeSet>")
            .param("keys", "Vec<StorageKey>")
            .optional("at", "BlockHash")
            .describe("Query storage entries (by key) starting at block hash given as the second parameter"),
        RpcMethod::new("state", "call", "Bytes")
            .param("method", "Text")
            .param("data", "Bytes")
            .optional("at", "BlockHash")
            .describe("Perform a call to a builtin on the chain"),
        RpcMethod::new("state", "subscribeStorage", "StorageChangeSet")
            .optional("keys", "Vec<StorageKey>")
            .pubsub("storage", "subscribeStorage", "unsubscribeStorage")
            .describe("Subscribes to storage changes for the provided keys"),
        RpcMethod::new("state", "subscribeRuntimeVersion", "RuntimeVersion")
            .pubsub("runtimeVersion", "subscribeRuntimeVersion", "unsubscribeRuntimeVersion")
            .describe("Retrieves the runtime version via subscription"),
        // system
        RpcMethod::new("system", "name", "Text").describe("Retrieves the node name"),
        RpcMethod::new("system", "version", "Text").describe("Retrieves the version of the node"),
        RpcMethod::new("system", "chain", "Text").describe("Retrieves the chain"),
        RpcMethod::new("system", "chainType", RAW_JSON).describe("Retrieves the chain type"),
        RpcMethod::new("system", "health", "Health").describe("Return health status of the node"),
        RpcMethod::new("system", "properties", RAW_JSON)
            .describe("Get a custom set of properties as a JSON object, defined in the chain spec"),
        RpcMethod::new("system", "accountNextIndex", "Index")
            .param("accountId", "AccountId")
            .describe("Retrieves the next accountIndex as available on the node"),
        // author
        RpcMethod::new("author", "submitExtrinsic", "Hash")
            .param("extrinsic", "Extrinsic")
            .describe("Submit a fully formatted extrinsic for block inclusion"),
        RpcMethod::new("author", "pendingExtrinsics", "Vec<Extrinsic>")
            .describe("Returns all pending extrinsics, potentially grouped by sender"),
        RpcMethod::new("author", "rotateKeys", "Bytes")
            .describe("Generate new session keys and returns the corresponding public keys"),
        RpcMethod::new("author", "submitAndWatchExtrinsic", "ExtrinsicStatus")
            .param("extrinsic", "Extrinsic")
            .pubsub("extrinsicUpdate", "submitAndWatchExtrinsic", "unwatchExtrinsic")
            .describe("Submit and subscribe to watch an extrinsic until unsubscribed"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_standard_sections() {
        let table = MethodTable::builtin();
        assert_eq!(table.sections(), vec!["chain", "state", "system", "author"]);
        let storage = table.get("state", "getStorage").unwrap();
        assert_eq!(storage.required_params(), 1);
        assert_eq!(storage.params.len(), 2);
        assert!(table.get("system", "properties").unwrap().returns_raw());
        assert!(table.get("chain", "nope").is_none());
    }

    #[test]
    fn pubsub_names_carry_the_section() {
        let table = MethodTable::builtin();
        let heads = table.get("chain", "subscribeNewHeads").unwrap();
        let pubsub = heads.pubsub.as_ref().unwrap();
        assert_eq!(pubsub.notification, "chain_newHead");
        assert_eq!(pubsub.subscribe, "chain_subscribeNewHead");
        assert_eq!(pubsub.unsubscribe, "chain_unsubscribeNewHead");
    }

    #[test]
    fn custom_methods_replace_builtins() {
        let mut table = MethodTable::builtin();
        let before = table.len();
        table.register(RpcMethod::new("system", "name", RAW_JSON));
        table.register(RpcMethod::new("babe", "epochAuthorship", RAW_JSON));
        assert_eq!(table.len(), before + 1);
        assert!(table.get("system", "name").unwrap().returns_raw());
    }
}
