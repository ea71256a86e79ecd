//! `Api` — the connected client.
//!
//! Bootstraps a [`TypeRegistry`] from the node's metadata, then exposes typed
//! storage reads, key iteration, storage subscriptions and multi-queries on
//! top of [`RpcCore`]. With `watch_runtime_upgrades` set, a runtime version
//! subscription replaces the registry wholesale whenever the spec version
//! changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::{json, Value as Json};
use tracing::{debug, info, warn};

use chainscale_codec::{to_hex, CodecError, CodecRef, TypedValue, Value};
use chainscale_metadata::decode_metadata_hex;
use chainscale_registry::{StorageEntryDef, TypeRegistry};
use chainscale_stream::{Combinator, StreamError, Subscription, Update};

use crate::config::ClientConfig;
use crate::dispatch::{Response, RpcCore};
use crate::error::RpcError;
use crate::provider::Provider;
use crate::storage::{decode_key_args, is_complete, storage_key};

/// One storage value addressed by pallet, entry and key arguments.
#[derive(Debug, Clone)]
pub struct StorageQuery {
    pub pallet: String,
    pub entry: String,
    pub keys: Vec<Json>,
}

impl StorageQuery {
    pub fn new(pallet: &str, entry: &str, keys: Vec<Json>) -> Self {
        Self {
            pallet: pallet.to_string(),
            entry: entry.to_string(),
            keys,
        }
    }
}

/// A key/value pair read while iterating a map entry.
#[derive(Debug, Clone)]
pub struct StorageItem {
    pub key: Vec<u8>,
    /// Key arguments; `None` where the hasher is not reversible.
    pub args: Vec<Option<TypedValue>>,
    pub value: Option<TypedValue>,
}

struct ApiInner {
    core: RpcCore,
    config: ClientConfig,
    spec_version: Mutex<Option<u32>>,
    watcher: Mutex<Option<Subscription>>,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct Api {
    inner: Arc<ApiInner>,
}

impl Api {
    /// Connect `provider` (if it is not already), load metadata and build
    /// the registry.
    pub async fn connect(provider: Arc<dyn Provider>, config: ClientConfig) -> Result<Self, RpcError> {
        if !provider.is_connected() {
            provider.connect().await?;
        }
        let registry = load_registry(provider.as_ref(), &config).await?;
        let pallets = registry.metadata().pallets.len();
        let source_version = registry.metadata().source_version;

        let core = RpcCore::new(provider, registry, config.teardown_delay());
        let version = core.call("state", "getRuntimeVersion", &[]).await?;
        let spec_version = spec_version_of(&version);

        let api = Self {
            inner: Arc::new(ApiInner {
                core,
                config,
                spec_version: Mutex::new(spec_version),
                watcher: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        };
        info!(
            endpoint = %api.inner.core.provider().endpoint(),
            metadata_version = source_version,
            pallets,
            spec_version = ?spec_version,
            "client connected"
        );

        if api.inner.config.watch_runtime_upgrades {
            api.watch_upgrades()?;
        }
        Ok(api)
    }

    fn watch_upgrades(&self) -> Result<(), RpcError> {
        let weak: Weak<ApiInner> = Arc::downgrade(&self.inner);
        let watcher = self
            .inner
            .core
            .subscribe("state", "subscribeRuntimeVersion", &[], move |update| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match update {
                    Ok(version) => {
                        let Some(next) = spec_version_of(&version) else {
                            return;
                        };
                        let previous = *inner.spec_version.lock().unwrap();
                        if previous == Some(next) {
                            return;
                        }
                        info!(from = ?previous, to = next, "runtime upgrade detected");
                        tokio::spawn(async move {
                            if let Err(e) = inner.refresh_to(Some(next)).await {
                                warn!(error = %e, spec_version = next, "metadata refresh failed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "runtime version subscription failed"),
                }
            })?;
        *self.inner.watcher.lock().unwrap() = Some(watcher);
        Ok(())
    }

    /// Re-fetch metadata and replace the registry. Live subscriptions pick
    /// up the new registry on their next update.
    pub async fn refresh_metadata(&self) -> Result<(), RpcError> {
        self.inner.refresh_to(None).await
    }

    pub fn registry(&self) -> TypeRegistry {
        self.inner.core.registry()
    }

    pub fn rpc(&self) -> &RpcCore {
        &self.inner.core
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Spec version of the runtime the current registry was built for.
    pub fn spec_version(&self) -> Option<u32> {
        *self.inner.spec_version.lock().unwrap()
    }

    pub async fn call(&self, section: &str, method: &str, args: &[Json]) -> Result<Response, RpcError> {
        self.inner.core.call(section, method, args).await
    }

    pub fn subscribe<F>(&self, section: &str, method: &str, args: &[Json], callback: F) -> Result<Subscription, RpcError>
    where
        F: FnMut(Update<Response>) + Send + 'static,
    {
        self.inner.core.subscribe(section, method, args, callback)
    }

    pub fn storage_entry(&self, pallet: &str, entry: &str) -> Result<StorageEntryDef, RpcError> {
        Ok(self.registry().section(pallet)?.storage(entry)?.clone())
    }

    /// Storage key for `pallet.entry` with zero or more key arguments.
    pub fn storage_key(&self, pallet: &str, entry: &str, keys: &[Json]) -> Result<Vec<u8>, RpcError> {
        storage_key(&self.storage_entry(pallet, entry)?, keys)
    }

    /// Read one storage value at the best block. Missing values read as the
    /// entry default, or `None` for optional entries.
    pub async fn storage(&self, pallet: &str, entry: &str, keys: &[Json]) -> Result<Option<TypedValue>, RpcError> {
        self.storage_at(pallet, entry, keys, None).await
    }

    pub async fn storage_at(
        &self,
        pallet: &str,
        entry: &str,
        keys: &[Json],
        at: Option<&str>,
    ) -> Result<Option<TypedValue>, RpcError> {
        let registry = self.registry();
        let def = registry.section(pallet)?.storage(entry)?.clone();
        let key = full_key(&def, keys)?;
        let mut args = vec![json!(to_hex(&key))];
        if let Some(at) = at {
            args.push(json!(at));
        }
        let response = self.inner.core.call("state", "getStorage", &args).await?;
        let value = response.value().ok_or_else(|| unexpected("state_getStorage", "undecoded result"))?;
        let data = storage_bytes(value)?;
        read_value(&def.value()?, data, &def)
    }

    /// Every key under `pallet.entry` (optionally narrowed by leading key
    /// arguments), fetched in pages of `page_size`.
    pub async fn storage_keys(&self, pallet: &str, entry: &str, keys: &[Json]) -> Result<Vec<Vec<u8>>, RpcError> {
        let def = self.storage_entry(pallet, entry)?;
        let prefix = to_hex(&storage_key(&def, keys)?);
        let page_size = self.inner.config.page_size;

        let mut out = Vec::new();
        let mut start: Option<String> = None;
        loop {
            let mut args = vec![json!(prefix), json!(page_size)];
            if let Some(start) = &start {
                args.push(json!(start));
            }
            let page = self.inner.core.call("state", "getKeysPaged", &args).await?;
            let Some(Value::Sequence(items)) = page.value() else {
                return Err(unexpected("state_getKeysPaged", "expected a list of keys"));
            };
            let fetched = items.len();
            for item in items {
                let key = item
                    .as_bytes()
                    .ok_or_else(|| unexpected("state_getKeysPaged", "key is not bytes"))?;
                out.push(key.to_vec());
            }
            debug!(entry = %format!("{pallet}.{entry}"), fetched, total = out.len(), "storage key page");
            if fetched < page_size as usize {
                break;
            }
            start = out.last().map(|k| to_hex(k));
        }
        Ok(out)
    }

    /// Keys and values under `pallet.entry`, with key arguments recovered
    /// where the hashers allow it.
    pub async fn storage_entries(&self, pallet: &str, entry: &str, keys: &[Json]) -> Result<Vec<StorageItem>, RpcError> {
        let registry = self.registry();
        let def = registry.section(pallet)?.storage(entry)?.clone();
        let all = self.storage_keys(pallet, entry, keys).await?;
        if all.is_empty() {
            return Ok(Vec::new());
        }
        let codec = def.value()?;
        let hex_keys: Vec<Json> = all.iter().map(|k| json!(to_hex(k))).collect();
        let response = self
            .inner
            .core
            .call("state", "queryStorageAt", &[Json::Array(hex_keys)])
            .await?;
        let Some(Value::Sequence(sets)) = response.value() else {
            return Err(unexpected("state_queryStorageAt", "expected a list of change sets"));
        };

        let mut items = Vec::with_capacity(all.len());
        for set in sets {
            for (key, data) in changes(set)? {
                items.push(StorageItem {
                    args: decode_key_args(&def, key)?,
                    value: read_value(&codec, data, &def)?,
                    key: key.to_vec(),
                });
            }
        }
        Ok(items)
    }

    /// Follow one storage value. The callback receives the decoded value
    /// each time the node reports a change for this key.
    pub fn subscribe_storage<F>(
        &self,
        pallet: &str,
        entry: &str,
        keys: &[Json],
        mut callback: F,
    ) -> Result<Subscription, RpcError>
    where
        F: FnMut(Result<Option<TypedValue>, StreamError>) + Send + 'static,
    {
        let def = self.storage_entry(pallet, entry)?;
        let key = full_key(&def, keys)?;
        let (pallet, entry) = (pallet.to_string(), entry.to_string());
        let resolved = self.inner.core.rebound(move |registry| {
            let section = registry.section(&pallet)?;
            let def = section.storage(&entry)?;
            Ok((def.value()?, def.default_value()?))
        });
        resolved.get()?;

        let args = [json!([to_hex(&key)])];
        self.inner.core.subscribe("state", "subscribeStorage", &args, move |update| {
            let found = update.and_then(|set| {
                let value = set
                    .value()
                    .ok_or_else(|| StreamError::Decode("undecoded change set".into()))?;
                let (codec, default) = resolved.get().map_err(|e| StreamError::Decode(e.to_string()))?;
                changed_value(&codec, &key, &default, value).map_err(|e| StreamError::Decode(e.to_string()))
            });
            match found {
                Ok(Some(value)) => callback(Ok(value)),
                Ok(None) => {}
                Err(e) => callback(Err(e)),
            }
        })
    }

    /// Follow several storage values at once. The callback first fires once
    /// every query has a value, then on each change, with values in query
    /// order. Cancelling the returned combinator unsubscribes all queries.
    pub fn query_multi<F>(&self, queries: &[StorageQuery], callback: F) -> Result<Combinator<Option<TypedValue>>, RpcError>
    where
        F: FnMut(Vec<Option<TypedValue>>) + Send + 'static,
    {
        let key = queries
            .iter()
            .map(|q| format!("{}.{}", q.pallet, q.entry))
            .collect::<Vec<_>>()
            .join(",");
        let combinator = Combinator::new(format!("query_multi[{key}]"), queries.len(), callback);
        for (index, query) in queries.iter().enumerate() {
            let mut set = combinator.updater(index);
            let label = format!("{}.{}", query.pallet, query.entry);
            let child = self.subscribe_storage(&query.pallet, &query.entry, &query.keys, move |update| {
                match update {
                    Ok(value) => set(value),
                    Err(e) => warn!(query = %label, error = %e, "storage query update failed"),
                }
            })?;
            combinator.attach(child);
        }
        Ok(combinator)
    }

    /// A pallet constant, decoded.
    pub fn constant(&self, pallet: &str, name: &str) -> Result<TypedValue, RpcError> {
        Ok(self.registry().section(pallet)?.constant(name)?.decoded()?)
    }

    /// `pallet index ++ call index ++ args` for `pallet.call`.
    pub fn encode_call(&self, pallet: &str, call: &str, args: &[Json]) -> Result<Vec<u8>, RpcError> {
        Ok(self.registry().section(pallet)?.call(call)?.encode(args)?)
    }

    /// The event records of the best block (`System.Events`).
    pub async fn events(&self) -> Result<Vec<Value>, RpcError> {
        match self.storage("System", "Events", &[]).await? {
            Some(records) => match records.into_value() {
                Value::Sequence(items) => Ok(items),
                other => Err(CodecError::TypeMismatch {
                    expected: "event records".into(),
                    got: other.kind().into(),
                }
                .into()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// Stop the upgrade watcher, tear down every subscription, close the
    /// registry and disconnect the provider. Idempotent.
    pub async fn disconnect(&self) -> Result<(), RpcError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let watcher = self.inner.watcher.lock().unwrap().take();
        drop(watcher);
        self.inner.core.shutdown().await;
        self.inner.core.registry().close();
        self.inner.core.provider().disconnect().await?;
        info!(endpoint = %self.inner.core.provider().endpoint(), "client disconnected");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl ApiInner {
    /// Spec version is only recorded once the new registry is in place, so a
    /// failed refresh is retried on the next version push.
    async fn refresh_to(&self, spec_version: Option<u32>) -> Result<(), RpcError> {
        let registry = load_registry(self.core.provider().as_ref(), &self.config).await?;
        let pallets = registry.metadata().pallets.len();
        self.core.replace_registry(registry);
        let mut current = self.spec_version.lock().unwrap();
        if spec_version.is_some() {
            *current = spec_version;
        }
        info!(pallets, spec_version = ?*current, "metadata refreshed");
        Ok(())
    }
}

async fn load_registry(provider: &dyn Provider, config: &ClientConfig) -> Result<TypeRegistry, RpcError> {
    let raw = provider.send("state_getMetadata", Vec::new()).await?;
    let hex = raw
        .as_str()
        .ok_or_else(|| unexpected("state_getMetadata", "expected a hex string"))?;
    let registry = TypeRegistry::new(decode_metadata_hex(hex)?);
    let registered = registry.register_types(&config.types)?;
    for (pallet, aliases) in &config.aliases {
        for (from, to) in aliases {
            registry.set_alias(pallet, from, to)?;
        }
    }
    debug!(registered, alias_scopes = config.aliases.len(), "registry built");
    Ok(registry)
}

fn spec_version_of(version: &Response) -> Option<u32> {
    version
        .value()?
        .field("specVersion")?
        .as_u128()
        .and_then(|v| u32::try_from(v).ok())
}

fn unexpected(method: &str, reason: &str) -> RpcError {
    RpcError::UnexpectedResponse {
        method: method.to_string(),
        reason: reason.to_string(),
    }
}

fn full_key(def: &StorageEntryDef, keys: &[Json]) -> Result<Vec<u8>, RpcError> {
    if !is_complete(def, keys) {
        return Err(RpcError::StorageKeyCount {
            entry: format!("{}.{}", def.prefix, def.name),
            expected: def.hashers().len(),
            got: keys.len(),
        });
    }
    storage_key(def, keys)
}

/// `Option<StorageData>` as raw bytes.
fn storage_bytes(value: &Value) -> Result<Option<&[u8]>, CodecError> {
    match value {
        Value::Option(None) | Value::Null => Ok(None),
        Value::Option(Some(inner)) => inner
            .as_bytes()
            .map(Some)
            .ok_or_else(|| CodecError::TypeMismatch {
                expected: "storage data".into(),
                got: inner.kind().into(),
            }),
        other => Err(CodecError::TypeMismatch {
            expected: "optional storage data".into(),
            got: other.kind().into(),
        }),
    }
}

fn read_value(codec: &CodecRef, data: Option<&[u8]>, def: &StorageEntryDef) -> Result<Option<TypedValue>, RpcError> {
    match data {
        Some(bytes) => Ok(Some(TypedValue::decode(codec.clone(), bytes)?)),
        None => Ok(def.default_value()?),
    }
}

/// The `(key, data)` pairs of one `StorageChangeSet`.
fn changes(set: &Value) -> Result<Vec<(&[u8], Option<&[u8]>)>, CodecError> {
    let Some(Value::Sequence(changes)) = set.field("changes") else {
        return Err(CodecError::TypeMismatch {
            expected: "StorageChangeSet".into(),
            got: set.kind().into(),
        });
    };
    changes
        .iter()
        .map(|change| match change {
            Value::Tuple(pair) if pair.len() == 2 => {
                let key = pair[0].as_bytes().ok_or_else(|| CodecError::TypeMismatch {
                    expected: "storage key".into(),
                    got: pair[0].kind().into(),
                })?;
                Ok((key, storage_bytes(&pair[1])?))
            }
            other => Err(CodecError::TypeMismatch {
                expected: "(StorageKey, Option<StorageData>)".into(),
                got: other.kind().into(),
            }),
        })
        .collect()
}

/// The new value for `key` if the change set mentions it.
fn changed_value(
    codec: &CodecRef,
    key: &[u8],
    default: &Option<TypedValue>,
    set: &Value,
) -> Result<Option<Option<TypedValue>>, CodecError> {
    for (changed, data) in changes(set)? {
        if changed != key {
            continue;
        }
        return match data {
            Some(bytes) => Ok(Some(Some(TypedValue::decode(codec.clone(), bytes)?))),
            None => Ok(Some(default.clone())),
        };
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{bootstrapped, runtime_version, sample_metadata_hex, MockProvider};
    use std::time::Duration;

    const ALICE: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const ALICE_ACCOUNT_KEY: &str = "0x26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9de1e86a9a8c739864cf3cc5ec2bea59fd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const EVENTS_KEY: &str = "0x26aa394eea5630e07c48ae0c9558cef780d41e5e16056765bc8461851072c9d7";

    fn quiet() -> ClientConfig {
        ClientConfig {
            watch_runtime_upgrades: false,
            ..ClientConfig::default()
        }
    }

    async fn connect(mock: &Arc<MockProvider>, config: ClientConfig) -> Api {
        Api::connect(mock.clone(), config).await.unwrap()
    }

    fn account_info(nonce: u32, free: u128) -> String {
        let mut bytes = Vec::new();
        bytes.extend(nonce.to_le_bytes());
        bytes.extend(1u32.to_le_bytes());
        bytes.extend(1u32.to_le_bytes());
        bytes.extend(0u32.to_le_bytes());
        bytes.extend(free.to_le_bytes());
        bytes.extend([0u8; 48]);
        to_hex(&bytes)
    }

    fn change_set(changes: Json) -> Json {
        json!({ "block": format!("0x{}", "11".repeat(32)), "changes": changes })
    }

    fn free_balance(value: &Option<TypedValue>) -> Option<u128> {
        value.as_ref()?.value().field("data")?.field("free")?.as_u128()
    }

    #[tokio::test]
    async fn bootstrap_builds_the_registry_from_node_metadata() {
        let mock = Arc::new(bootstrapped(7));
        let api = connect(&mock, quiet()).await;

        assert!(mock.is_connected());
        assert_eq!(api.spec_version(), Some(7));
        assert_eq!(api.registry().metadata().source_version, 13);
        assert_eq!(api.constant("Balances", "ExistentialDeposit").unwrap().value().as_u128(), Some(500));
        assert_eq!(
            api.encode_call("System", "remark", &[json!("0x0102")]).unwrap(),
            vec![0, 0, 8, 1, 2]
        );
    }

    #[tokio::test]
    async fn storage_keys_match_known_substrate_keys() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, quiet()).await;

        let key = api.storage_key("System", "Account", &[json!(ALICE)]).unwrap();
        assert_eq!(to_hex(&key), ALICE_ACCOUNT_KEY);
        let events = api.storage_key("System", "Events", &[]).unwrap();
        assert_eq!(to_hex(&events), EVENTS_KEY);
    }

    #[tokio::test]
    async fn storage_reads_decode_or_fall_back_to_defaults() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, quiet()).await;

        mock.respond("state_getStorage", json!(account_info(3, 10)));
        let account = api.storage("System", "Account", &[json!(ALICE)]).await.unwrap();
        assert_eq!(free_balance(&account), Some(10));
        assert_eq!(account.unwrap().value().field("nonce").and_then(Value::as_u128), Some(3));
        let (method, params) = mock.requests().pop().unwrap();
        assert_eq!(method, "state_getStorage");
        assert_eq!(params, vec![json!(ALICE_ACCOUNT_KEY)]);

        mock.respond("state_getStorage", Json::Null);
        let missing = api.storage("System", "Account", &[json!(ALICE)]).await.unwrap();
        assert_eq!(free_balance(&missing), Some(0));

        let bob = format!("0x{}", "8e".repeat(32));
        let allowance = api
            .storage("Balances", "Allowances", &[json!(ALICE), json!(bob)])
            .await
            .unwrap();
        assert!(allowance.is_none());
    }

    #[tokio::test]
    async fn partial_keys_are_rejected_for_reads() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, quiet()).await;
        let err = api.storage("Balances", "Allowances", &[json!(ALICE)]).await.unwrap_err();
        assert!(matches!(err, RpcError::StorageKeyCount { expected: 2, got: 1, .. }));
        let err = api.storage_key("System", "Account", &[json!(ALICE), json!(ALICE)]).unwrap_err();
        assert!(matches!(err, RpcError::StorageKeyCount { expected: 1, got: 2, .. }));
    }

    #[tokio::test]
    async fn double_map_keys_round_trip_through_concat_hashers() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, quiet()).await;
        let def = api.storage_entry("Balances", "Allowances").unwrap();
        let bob = format!("0x{}", "8e".repeat(32));

        let prefix = storage_key(&def, &[json!(ALICE)]).unwrap();
        assert_eq!(prefix.len(), 32 + 16 + 32);
        let key = storage_key(&def, &[json!(ALICE), json!(bob)]).unwrap();
        assert_eq!(key.len(), 32 + 16 + 32 + 8 + 32);
        assert!(key.starts_with(&prefix));

        let args = decode_key_args(&def, &key).unwrap();
        assert_eq!(args[0].as_ref().unwrap().to_hex(), ALICE);
        assert_eq!(args[1].as_ref().unwrap().to_hex(), bob);
    }

    #[tokio::test]
    async fn key_iteration_pages_until_a_short_page() {
        let mock = Arc::new(bootstrapped(1));
        let config = ClientConfig {
            page_size: 2,
            ..quiet()
        };
        let api = connect(&mock, config).await;
        let prefix = to_hex(&api.storage_key("System", "Account", &[]).unwrap());
        let key = |b: u8| format!("{prefix}{}", hex::encode([b; 48]));
        mock.respond_once("state_getKeysPaged", json!([key(1), key(2)]));
        mock.respond_once("state_getKeysPaged", json!([key(3)]));

        let all = api.storage_keys("System", "Account", &[]).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(to_hex(&all[2]), key(3));

        let paged: Vec<_> = mock
            .requests()
            .into_iter()
            .filter(|(m, _)| m == "state_getKeysPaged")
            .map(|(_, params)| params)
            .collect();
        assert_eq!(
            paged,
            vec![
                vec![json!(prefix), json!(2)],
                vec![json!(prefix), json!(2), json!(key(2))],
            ]
        );
    }

    #[tokio::test]
    async fn entries_recover_key_arguments() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, quiet()).await;
        mock.respond("state_getKeysPaged", json!([ALICE_ACCOUNT_KEY]));
        mock.respond(
            "state_queryStorageAt",
            json!([change_set(json!([[ALICE_ACCOUNT_KEY, account_info(0, 42)]]))]),
        );

        let items = api.storage_entries("System", "Account", &[]).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].args[0].as_ref().unwrap().to_hex(), ALICE);
        assert_eq!(free_balance(&items[0].value), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn storage_subscriptions_pick_their_key_from_change_sets() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, quiet()).await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = api
            .subscribe_storage("System", "Account", &[json!(ALICE)], move |update| {
                sink.lock().unwrap().push(free_balance(&update.unwrap()));
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(mock.subscribe_count("state_subscribeStorage"), 1);

        mock.push("state_storage", change_set(json!([[EVENTS_KEY, "0x00"]])));
        mock.push("state_storage", change_set(json!([[ALICE_ACCOUNT_KEY, account_info(1, 99)]])));
        mock.push("state_storage", change_set(json!([[ALICE_ACCOUNT_KEY, null]])));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*seen.lock().unwrap(), vec![Some(99), Some(0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn multi_queries_fire_once_every_value_is_known() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, quiet()).await;
        let fired = Arc::new(Mutex::new(Vec::new()));

        let issuance_key = to_hex(&api.storage_key("Balances", "TotalIssuance", &[]).unwrap());
        let sink = fired.clone();
        let combinator = api
            .query_multi(
                &[
                    StorageQuery::new("System", "Account", vec![json!(ALICE)]),
                    StorageQuery::new("Balances", "TotalIssuance", vec![]),
                ],
                move |values| {
                    let account = free_balance(&values[0]);
                    let issuance = values[1].as_ref().and_then(|v| v.value().as_u128());
                    sink.lock().unwrap().push((account, issuance));
                },
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(mock.subscribe_count("state_subscribeStorage"), 2);

        mock.push("state_storage", change_set(json!([[issuance_key, to_hex(&1000u128.to_le_bytes())]])));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(fired.lock().unwrap().is_empty());
        assert!(!combinator.is_ready());

        mock.push("state_storage", change_set(json!([[ALICE_ACCOUNT_KEY, null]])));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*fired.lock().unwrap(), vec![(Some(0), Some(1000))]);

        assert!(combinator.cancel().is_empty());
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(mock.unsubscribe_count("state_unsubscribeStorage"), 2);
    }

    #[tokio::test]
    async fn events_decode_through_the_runtime_event_enum() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, quiet()).await;

        let mut record = vec![4u8, 0];
        record.extend(1u32.to_le_bytes());
        record.extend([5, 0]);
        record.extend([1u8; 32]);
        record.extend([2u8; 32]);
        record.extend(1000u128.to_le_bytes());
        record.push(0);
        mock.respond("state_getStorage", json!(to_hex(&record)));

        let events = api.events().await.unwrap();
        assert_eq!(events.len(), 1);
        let Some(Value::Variant { name: pallet, value, .. }) = events[0].field("event") else {
            panic!("expected a runtime event");
        };
        assert_eq!(pallet, "Balances");
        assert!(matches!(&**value, Value::Variant { name, .. } if name == "Transfer"));
    }

    #[tokio::test(start_paused = true)]
    async fn runtime_upgrades_replace_the_registry() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, ClientConfig::default()).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(mock.live("state_runtimeVersion"), 1);
        api.registry().register_types(&json!({ "Marker": "u8" })).unwrap();

        mock.push("state_runtimeVersion", runtime_version(1));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(api.registry().resolve("Marker").is_ok());

        mock.push("state_runtimeVersion", runtime_version(2));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(api.registry().resolve("Marker").is_err());
        assert!(!api.registry().is_closed());
        assert_eq!(api.spec_version(), Some(2));
        let fetches = mock
            .requests()
            .iter()
            .filter(|(m, _)| m == "state_getMetadata")
            .count();
        assert_eq!(fetches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_is_retried_on_the_next_version() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, ClientConfig::default()).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        mock.fail("state_getMetadata", -32000, "busy");
        mock.push("state_runtimeVersion", runtime_version(2));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(api.spec_version(), Some(1));

        mock.respond("state_getMetadata", json!(sample_metadata_hex()));
        mock.push("state_runtimeVersion", runtime_version(2));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(api.spec_version(), Some(2));
        let fetches = mock
            .requests()
            .iter()
            .filter(|(m, _)| m == "state_getMetadata")
            .count();
        assert_eq!(fetches, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn recursive_values_decode_across_upgrades() {
        let mock = Arc::new(bootstrapped(1));
        let config = ClientConfig {
            types: json!({
                "Balance": { "head": "[u8; 15]", "tail": "Option<Chain>" },
                "Chain": { "_enum": { "End": "Null", "Link": "Balance" } }
            }),
            ..ClientConfig::default()
        };
        let api = connect(&mock, config).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        // Building Chain first leaves the cached Balance pointing back at it.
        api.registry().resolve("Chain").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = api
            .subscribe_storage("Balances", "TotalIssuance", &[], move |update| {
                sink.lock().unwrap().push(update.map(|v| v.is_some()).map_err(|e| e.to_string()));
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let key = to_hex(&api.storage_key("Balances", "TotalIssuance", &[]).unwrap());
        let mut linked = vec![0u8; 15];
        linked.extend([1, 1]);
        linked.extend([7u8; 15]);
        linked.push(0);
        let linked = to_hex(&linked);

        mock.push("state_storage", change_set(json!([[key, linked]])));
        tokio::time::sleep(Duration::from_millis(1)).await;
        mock.push("state_runtimeVersion", runtime_version(2));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(api.spec_version(), Some(2));

        mock.push("state_storage", change_set(json!([[key, linked]])));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*seen.lock().unwrap(), vec![Ok(true), Ok(true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_tears_everything_down() {
        let mock = Arc::new(bootstrapped(1));
        let api = connect(&mock, ClientConfig::default()).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        let registry = api.registry();

        api.disconnect().await.unwrap();
        assert!(api.is_closed());
        assert!(registry.is_closed());
        assert!(!mock.is_connected());
        assert_eq!(mock.unsubscribe_count("state_unsubscribeRuntimeVersion"), 1);
        assert!(api.rpc().multiplexer().is_empty());

        api.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn bad_metadata_fails_the_bootstrap() {
        let mock = Arc::new(MockProvider::new());
        mock.respond("state_getMetadata", json!("0x6d657461ff"));
        let err = Api::connect(mock.clone(), quiet()).await.err().unwrap();
        assert!(matches!(err, RpcError::Metadata(_)));
    }
}
