//! `RpcCore` — typed request/response and subscription dispatch.
//!
//! Arguments are checked against the registry type of each parameter and
//! converted to their wire JSON before anything is sent. Return codecs are
//! resolved once per method and reused until the registry is replaced; codecs
//! held by live subscriptions are rebuilt from the new registry on next use.
//! Subscriptions go through the [`Multiplexer`], keyed by the wire method and
//! its parameters, so identical subscriptions share one upstream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use serde_json::Value as Json;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use chainscale_codec::{CodecError, CodecRef, TypedValue, Value};
use chainscale_registry::TypeRegistry;
use chainscale_stream::{factory, Multiplexer, StreamError, Subscription, Update, Upstream};

use crate::definitions::{MethodTable, RpcMethod};
use crate::error::RpcError;
use crate::provider::Provider;

/// A method result: decoded through the registry, or raw for `Json` methods.
#[derive(Debug, Clone)]
pub enum Response {
    Decoded(TypedValue),
    Raw(Json),
}

impl Response {
    pub fn decoded(&self) -> Option<&TypedValue> {
        match self {
            Self::Decoded(v) => Some(v),
            Self::Raw(_) => None,
        }
    }

    pub fn into_decoded(self) -> Option<TypedValue> {
        match self {
            Self::Decoded(v) => Some(v),
            Self::Raw(_) => None,
        }
    }

    /// The decoded value; `None` for raw responses.
    pub fn value(&self) -> Option<&Value> {
        self.decoded().map(TypedValue::value)
    }

    pub fn to_json(&self) -> Result<Json, CodecError> {
        match self {
            Self::Decoded(v) => v.to_json(),
            Self::Raw(json) => Ok(json.clone()),
        }
    }

    pub fn to_human(&self) -> Json {
        match self {
            Self::Decoded(v) => v.to_human(),
            Self::Raw(json) => json.clone(),
        }
    }
}

fn decode_response(codec: Option<&CodecRef>, json: &Json) -> Result<Response, CodecError> {
    match codec {
        Some(codec) => Ok(Response::Decoded(TypedValue::from_json(codec.clone(), json)?)),
        None => Ok(Response::Raw(json.clone())),
    }
}

struct Generation {
    number: u64,
    registry: TypeRegistry,
}

/// The registry in use, numbered so holders can tell when it was swapped.
#[derive(Clone)]
struct RegistrySlot(Arc<RwLock<Generation>>);

impl RegistrySlot {
    fn new(registry: TypeRegistry) -> Self {
        Self(Arc::new(RwLock::new(Generation { number: 0, registry })))
    }

    fn current(&self) -> (u64, TypeRegistry) {
        let current = self.0.read().unwrap();
        (current.number, current.registry.clone())
    }

    fn replace(&self, registry: TypeRegistry) -> TypeRegistry {
        let mut current = self.0.write().unwrap();
        current.number += 1;
        std::mem::replace(&mut current.registry, registry)
    }
}

type Build<T> = Box<dyn Fn(&TypeRegistry) -> Result<T, RpcError> + Send + Sync>;

/// Something resolved from the registry, such as a codec captured by a
/// long-lived subscription. Rebuilt on first use after each registry swap.
///
/// The registry it was built from is held alongside it, so recursive codecs
/// stay bound for as long as the value is cached.
pub struct Rebound<T> {
    slot: RegistrySlot,
    build: Build<T>,
    cached: Mutex<Option<(u64, T, TypeRegistry)>>,
}

impl<T: Clone> Rebound<T> {
    pub fn get(&self) -> Result<T, RpcError> {
        let (number, registry) = self.slot.current();
        let mut cached = self.cached.lock().unwrap();
        if let Some((built_for, value, _)) = cached.as_ref() {
            if *built_for == number {
                return Ok(value.clone());
            }
        }
        let value = (self.build)(&registry)?;
        if cached.is_some() {
            debug!(generation = number, "rebuilt against replaced registry");
        }
        *cached = Some((number, value.clone(), registry));
        Ok(value)
    }
}

pub struct RpcCore {
    provider: Arc<dyn Provider>,
    registry: RegistrySlot,
    methods: RwLock<MethodTable>,
    returns: Mutex<HashMap<String, Option<CodecRef>>>,
    mux: Multiplexer<Response>,
}

impl RpcCore {
    pub fn new(provider: Arc<dyn Provider>, registry: TypeRegistry, teardown_delay: Duration) -> Self {
        Self {
            provider,
            registry: RegistrySlot::new(registry),
            methods: RwLock::new(MethodTable::builtin()),
            returns: Mutex::new(HashMap::new()),
            mux: Multiplexer::new(teardown_delay),
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn registry(&self) -> TypeRegistry {
        self.registry.current().1
    }

    /// Swap in a registry built from new metadata. Memoized return codecs
    /// are dropped and every [`Rebound`] rebuilds on its next use. The
    /// previous registry is returned.
    pub fn replace_registry(&self, registry: TypeRegistry) -> TypeRegistry {
        let old = self.registry.replace(registry);
        let dropped = {
            let mut returns = self.returns.lock().unwrap();
            let n = returns.len();
            returns.clear();
            n
        };
        info!(dropped_return_codecs = dropped, "type registry replaced");
        old
    }

    /// A value built from the current registry and rebuilt after swaps.
    pub fn rebound<T, F>(&self, build: F) -> Rebound<T>
    where
        F: Fn(&TypeRegistry) -> Result<T, RpcError> + Send + Sync + 'static,
    {
        Rebound {
            slot: self.registry.clone(),
            build: Box::new(build),
            cached: Mutex::new(None),
        }
    }

    /// Add or replace a method definition.
    pub fn register_method(&self, method: RpcMethod) {
        debug!(method = %method.rpc_name(), "custom RPC method registered");
        self.methods.write().unwrap().register(method);
        self.returns.lock().unwrap().clear();
    }

    pub fn method(&self, section: &str, method: &str) -> Result<RpcMethod, RpcError> {
        self.methods
            .read()
            .unwrap()
            .get(section, method)
            .cloned()
            .ok_or_else(|| RpcError::UnknownMethod {
                section: section.to_string(),
                method: method.to_string(),
            })
    }

    pub fn methods(&self) -> MethodTable {
        self.methods.read().unwrap().clone()
    }

    pub fn multiplexer(&self) -> &Multiplexer<Response> {
        &self.mux
    }

    pub fn cached_returns(&self) -> usize {
        self.returns.lock().unwrap().len()
    }

    /// Validate `args` against the declared parameter types and convert them
    /// to wire JSON. Trailing optional parameters may be omitted.
    pub fn encode_params(&self, def: &RpcMethod, args: &[Json]) -> Result<Vec<Json>, RpcError> {
        let required = def.required_params();
        if args.len() < required || args.len() > def.params.len() {
            return Err(RpcError::ArgumentCount {
                method: def.rpc_name(),
                min: required,
                max: def.params.len(),
                got: args.len(),
            });
        }

        let registry = self.registry();
        let mut wire = Vec::with_capacity(args.len());
        for (param, arg) in def.params.iter().zip(args) {
            if param.optional && arg.is_null() {
                wire.push(Json::Null);
                continue;
            }
            let codec = registry.resolve(param.ty.as_str())?;
            let value = TypedValue::from_json(codec, arg).map_err(|source| RpcError::Argument {
                method: def.rpc_name(),
                param: param.name.clone(),
                source,
            })?;
            wire.push(value.to_json()?);
        }
        while wire.last().is_some_and(Json::is_null) {
            wire.pop();
        }
        Ok(wire)
    }

    /// The memoized return codec for `def`; `None` for raw JSON methods.
    fn return_codec(&self, def: &RpcMethod) -> Result<Option<CodecRef>, RpcError> {
        let name = def.rpc_name();
        if let Some(codec) = self.returns.lock().unwrap().get(&name) {
            trace!(method = %name, "return codec cache hit");
            return Ok(codec.clone());
        }
        let codec = if def.returns_raw() {
            None
        } else {
            Some(self.registry().resolve(def.ty.as_str())?)
        };
        self.returns.lock().unwrap().insert(name, codec.clone());
        Ok(codec)
    }

    /// Request/response call.
    pub async fn call(&self, section: &str, method: &str, args: &[Json]) -> Result<Response, RpcError> {
        let def = self.method(section, method)?;
        if def.is_subscription() {
            return Err(RpcError::SubscriptionRequired {
                method: def.rpc_name(),
            });
        }
        let params = self.encode_params(&def, args)?;
        let codec = self.return_codec(&def)?;
        let result = self.provider.send(&def.rpc_name(), params).await?;
        Ok(decode_response(codec.as_ref(), &result)?)
    }

    /// Send an arbitrary method without typing or decoding.
    pub async fn call_raw(&self, method: &str, params: Vec<Json>) -> Result<Json, RpcError> {
        Ok(self.provider.send(method, params).await?)
    }

    /// Subscribe through the multiplexer. Identical `(method, args)` pairs
    /// share one upstream subscription.
    pub fn subscribe<F>(
        &self,
        section: &str,
        method: &str,
        args: &[Json],
        callback: F,
    ) -> Result<Subscription, RpcError>
    where
        F: FnMut(Update<Response>) + Send + 'static,
    {
        let def = self.method(section, method)?;
        let pubsub = def.pubsub.clone().ok_or_else(|| RpcError::NotSubscription {
            method: def.rpc_name(),
        })?;
        let params = self.encode_params(&def, args)?;
        let raw = def.returns_raw();
        let ty = def.ty.clone();
        let codec = Arc::new(self.rebound(move |registry| {
            Ok(if raw { None } else { Some(registry.resolve(ty.as_str())?) })
        }));
        codec.get()?;
        let key = format!("{}({})", def.rpc_name(), Json::Array(params.clone()));

        let provider = Arc::clone(&self.provider);
        let source = factory(move || {
            let provider = Arc::clone(&provider);
            let pubsub = pubsub.clone();
            let params = params.clone();
            let codec = Arc::clone(&codec);
            async move {
                let (sink, pushes) = mpsc::unbounded_channel();
                let id = provider
                    .subscribe(&pubsub.notification, &pubsub.subscribe, params, sink)
                    .await
                    .map_err(|e| StreamError::Upstream(e.to_string()))?;
                let updates = futures::stream::unfold(pushes, |mut pushes| async move {
                    pushes.recv().await.map(|push| (push, pushes))
                })
                .map(move |push| {
                    let codec = codec.get().map_err(|e| StreamError::Decode(e.to_string()))?;
                    decode_response(codec.as_ref(), &push).map_err(|e| StreamError::Decode(e.to_string()))
                })
                .boxed();
                let teardown = async move {
                    provider
                        .unsubscribe(&pubsub.notification, &pubsub.unsubscribe, &id)
                        .await
                        .map(|_| ())
                        .map_err(|e| StreamError::Teardown(e.to_string()))
                }
                .boxed();
                Ok(Upstream::new(updates, teardown))
            }
        });

        Ok(self.mux.subscribe(key, source, callback))
    }

    /// Tear down every shared subscription immediately.
    pub async fn shutdown(&self) {
        self.mux.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use serde_json::json;

    fn hash(byte: u8) -> String {
        format!("0x{}", hex::encode([byte; 32]))
    }

    fn core(mock: &Arc<MockProvider>) -> RpcCore {
        RpcCore::new(mock.clone(), TypeRegistry::empty(), Duration::from_millis(1_750))
    }

    fn header(number: u32) -> Json {
        json!({
            "parentHash": hash(1),
            "number": format!("0x{number:x}"),
            "stateRoot": hash(2),
            "extrinsicsRoot": hash(3),
            "digest": { "logs": [] }
        })
    }

    #[tokio::test]
    async fn call_encodes_arguments_and_decodes_result() {
        let mock = Arc::new(MockProvider::new());
        mock.respond("chain_getBlockHash", json!(hash(9)));
        let core = core(&mock);

        let response = core.call("chain", "getBlockHash", &[json!(42)]).await.unwrap();
        assert_eq!(response.value().unwrap().as_bytes(), Some(&[9u8; 32][..]));
        assert_eq!(mock.requests(), vec![("chain_getBlockHash".to_string(), vec![json!(42)])]);

        core.call("chain", "getBlockHash", &[]).await.unwrap();
        assert_eq!(core.cached_returns(), 1);
    }

    #[tokio::test]
    async fn malformed_arguments_fail_before_sending() {
        let mock = Arc::new(MockProvider::new());
        let core = core(&mock);

        let err = core.call("chain", "getHeader", &[json!("0x1234")]).await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::Argument { source: CodecError::LengthMismatch { expected: 32, got: 2 }, .. }
        ));
        let err = core
            .call("chain", "getHeader", &[json!(hash(0)), json!(hash(0))])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::ArgumentCount { min: 0, max: 1, got: 2, .. }));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn raw_methods_and_misuse() {
        let mock = Arc::new(MockProvider::new());
        mock.respond("system_properties", json!({"ss58Format": 42, "tokenSymbol": "UNIT"}));
        let core = core(&mock);

        let props = core.call("system", "properties", &[]).await.unwrap();
        assert!(props.decoded().is_none());
        assert_eq!(props.to_json().unwrap()["tokenSymbol"], "UNIT");

        assert!(matches!(
            core.call("chain", "subscribeNewHeads", &[]).await,
            Err(RpcError::SubscriptionRequired { .. })
        ));
        assert!(matches!(
            core.subscribe("system", "name", &[], |_| {}),
            Err(RpcError::NotSubscription { .. })
        ));
        assert!(matches!(
            core.call("system", "nope", &[]).await,
            Err(RpcError::UnknownMethod { .. })
        ));
    }

    #[tokio::test]
    async fn node_errors_surface_as_transport_errors() {
        let mock = Arc::new(MockProvider::new());
        let core = core(&mock);
        let err = core.call("system", "name", &[]).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(e) if e.is_execution_error()));
    }

    #[tokio::test(start_paused = true)]
    async fn identical_subscriptions_share_one_upstream() {
        let mock = Arc::new(MockProvider::new());
        let core = core(&mock);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut subs = Vec::new();
        for _ in 0..2 {
            let seen = seen.clone();
            subs.push(
                core.subscribe("chain", "subscribeNewHeads", &[], move |update| {
                    let number = update.unwrap().value().unwrap().field("number").cloned();
                    seen.lock().unwrap().push(number);
                })
                .unwrap(),
            );
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(mock.subscribe_count("chain_subscribeNewHead"), 1);

        assert_eq!(mock.push("chain_newHead", header(42)), 1);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*seen.lock().unwrap(), vec![Some(Value::Uint(42)); 2]);

        drop(subs);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(mock.unsubscribe_count("chain_unsubscribeNewHead"), 0);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(mock.unsubscribe_count("chain_unsubscribeNewHead"), 1);

        let _again = core.subscribe("chain", "subscribeNewHeads", &[], |_| {}).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(mock.subscribe_count("chain_subscribeNewHead"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn different_arguments_do_not_share() {
        let mock = Arc::new(MockProvider::new());
        let core = core(&mock);
        let _a = core
            .subscribe("state", "subscribeStorage", &[json!(["0x01"])], |_| {})
            .unwrap();
        let _b = core
            .subscribe("state", "subscribeStorage", &[json!(["0x02"])], |_| {})
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(mock.subscribe_count("state_subscribeStorage"), 2);
        assert_eq!(core.multiplexer().len(), 2);
    }

    #[tokio::test]
    async fn replacing_the_registry_drops_return_codecs() {
        let mock = Arc::new(MockProvider::new());
        mock.respond("system_name", json!("node"));
        let core = core(&mock);
        core.call("system", "name", &[]).await.unwrap();
        assert_eq!(core.cached_returns(), 1);

        let old = core.replace_registry(TypeRegistry::empty());
        old.close();
        assert_eq!(core.cached_returns(), 0);
        let name = core.call("system", "name", &[]).await.unwrap();
        assert_eq!(name.value().unwrap().as_str(), Some("node"));
    }

    #[tokio::test]
    async fn rebound_values_follow_the_current_registry() {
        let mock = Arc::new(MockProvider::new());
        let core = core(&mock);
        core.registry().register_types(&json!({ "Counter": "u32" })).unwrap();
        let builds = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = builds.clone();
        let codec = core.rebound(move |registry| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(registry.resolve("Counter")?)
        });

        codec.get().unwrap();
        codec.get().unwrap();
        assert_eq!(builds.load(std::sync::atomic::Ordering::SeqCst), 1);

        let replacement = TypeRegistry::empty();
        replacement.register_types(&json!({ "Counter": "u8" })).unwrap();
        core.replace_registry(replacement);
        let rebuilt = codec.get().unwrap();
        assert_eq!(builds.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(rebuilt.decode_all(&[7]).unwrap().as_u128(), Some(7));
    }

    #[tokio::test]
    async fn custom_methods_can_be_registered() {
        let mock = Arc::new(MockProvider::new());
        mock.respond("babe_epochAuthorship", json!({}));
        let core = core(&mock);
        core.register_method(RpcMethod::new("babe", "epochAuthorship", "Json"));
        assert!(core.call("babe", "epochAuthorship", &[]).await.is_ok());
    }
}
