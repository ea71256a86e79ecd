//! In-memory [`Provider`] for tests, plus a small sample runtime.
//!
//! Responses are canned per method; subscriptions get ids `sub-1`, `sub-2`, …
//! and pushes are injected with [`MockProvider::push`]. Every request is
//! recorded so tests can assert on what went over the wire.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use chainscale_metadata::legacy::{
    ConstantMetadata, ErrorMetadata, EventMetadata, ExtrinsicMetadata, FunctionArgument,
    FunctionMetadata, MetadataV13, ModuleMetadataV13, StorageEntryTypeV13, StorageEntryV13,
    StorageMetadataV13,
};
use chainscale_metadata::{encode_envelope, RuntimeMetadata, StorageHasher, StorageModifier};

use crate::error::TransportError;
use crate::provider::{Provider, ProviderEvent, SubscriptionId, SubscriptionSink};
use crate::request::JsonRpcError;

#[derive(Default)]
struct MockState {
    responses: HashMap<String, Result<Value, JsonRpcError>>,
    queued: HashMap<String, VecDeque<Value>>,
    requests: Vec<(String, Vec<Value>)>,
    /// notification kind → live subscriptions
    sinks: HashMap<String, Vec<(SubscriptionId, SubscriptionSink)>>,
    subscribes: HashMap<String, usize>,
    unsubscribes: HashMap<String, usize>,
}

pub struct MockProvider {
    state: Mutex<MockState>,
    next_id: AtomicU64,
    connected: AtomicBool,
    events: broadcast::Sender<ProviderEvent>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(MockState::default()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
            events,
        }
    }

    /// Answer every `method` request with `result`.
    pub fn respond(&self, method: &str, result: Value) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(method.to_string(), Ok(result));
    }

    /// Answer the next `method` request with `result`. Queued results are
    /// used up in order before falling back to [`Self::respond`].
    pub fn respond_once(&self, method: &str, result: Value) {
        self.state
            .lock()
            .unwrap()
            .queued
            .entry(method.to_string())
            .or_default()
            .push_back(result);
    }

    /// Answer every `method` request with a JSON-RPC error.
    pub fn fail(&self, method: &str, code: i64, message: &str) {
        self.state.lock().unwrap().responses.insert(
            method.to_string(),
            Err(JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
        );
    }

    /// Every request seen so far, subscribe and unsubscribe calls included.
    pub fn requests(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn subscribe_count(&self, method: &str) -> usize {
        self.state.lock().unwrap().subscribes.get(method).copied().unwrap_or(0)
    }

    pub fn unsubscribe_count(&self, method: &str) -> usize {
        self.state.lock().unwrap().unsubscribes.get(method).copied().unwrap_or(0)
    }

    /// Live subscriptions of notification kind `kind`.
    pub fn live(&self, kind: &str) -> usize {
        self.state.lock().unwrap().sinks.get(kind).map_or(0, Vec::len)
    }

    /// Deliver `result` to every live subscription of kind `kind`. Returns
    /// how many subscriptions received it.
    pub fn push(&self, kind: &str, result: Value) -> usize {
        let state = self.state.lock().unwrap();
        state.sinks.get(kind).map_or(0, |sinks| {
            sinks
                .iter()
                .filter(|(_, sink)| sink.send(result.clone()).is_ok())
                .count()
        })
    }

    /// Drop every sink of kind `kind`, ending those upstream streams.
    pub fn close_subscriptions(&self, kind: &str) {
        self.state.lock().unwrap().sinks.remove(kind);
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(ProviderEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        self.state.lock().unwrap().sinks.clear();
        let _ = self.events.send(ProviderEvent::Disconnected);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push((method.to_string(), params));
        if let Some(result) = state.queued.get_mut(method).and_then(VecDeque::pop_front) {
            return Ok(result);
        }
        match state.responses.get(method) {
            Some(Ok(result)) => Ok(result.clone()),
            Some(Err(err)) => Err(TransportError::Rpc(err.clone())),
            None => Err(TransportError::Rpc(JsonRpcError {
                code: -32601,
                message: format!("Method not found: {method}"),
                data: None,
            })),
        }
    }

    async fn subscribe(
        &self,
        kind: &str,
        method: &str,
        params: Vec<Value>,
        sink: SubscriptionSink,
    ) -> Result<SubscriptionId, TransportError> {
        let id = SubscriptionId(format!("sub-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        let mut state = self.state.lock().unwrap();
        state.requests.push((method.to_string(), params));
        *state.subscribes.entry(method.to_string()).or_default() += 1;
        state
            .sinks
            .entry(kind.to_string())
            .or_default()
            .push((id.clone(), sink));
        Ok(id)
    }

    async fn unsubscribe(
        &self,
        kind: &str,
        method: &str,
        id: &SubscriptionId,
    ) -> Result<bool, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push((method.to_string(), vec![json!(id.0)]));
        *state.unsubscribes.entry(method.to_string()).or_default() += 1;
        let Some(sinks) = state.sinks.get_mut(kind) else {
            return Ok(false);
        };
        let before = sinks.len();
        sinks.retain(|(live, _)| live != id);
        Ok(sinks.len() < before)
    }

    fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    fn endpoint(&self) -> &str {
        "mock://"
    }
}

// ─── Sample runtime ─────────────────────────────────────────────────────────

fn args(names: &[(&str, &str)]) -> Vec<FunctionArgument> {
    names
        .iter()
        .map(|(name, ty)| FunctionArgument {
            name: name.to_string(),
            ty: ty.to_string(),
        })
        .collect()
}

fn event(name: &str, arg_types: &[&str]) -> EventMetadata {
    EventMetadata {
        name: name.into(),
        args: arg_types.iter().map(|t| t.to_string()).collect(),
        docs: vec![],
    }
}

fn entry(name: &str, modifier: StorageModifier, ty: StorageEntryTypeV13, default: Vec<u8>) -> StorageEntryV13 {
    StorageEntryV13 {
        name: name.into(),
        modifier,
        ty,
        default,
        docs: vec![],
    }
}

/// A two-pallet V13 runtime: `System` (index 0) and `Balances` (index 5).
pub fn sample_metadata() -> MetadataV13 {
    MetadataV13 {
        modules: vec![
            ModuleMetadataV13 {
                name: "System".into(),
                storage: Some(StorageMetadataV13 {
                    prefix: "System".into(),
                    entries: vec![
                        entry(
                            "Account",
                            StorageModifier::Default,
                            StorageEntryTypeV13::Map {
                                hasher: StorageHasher::Blake2_128Concat,
                                key: "T::AccountId".into(),
                                value: "AccountInfo".into(),
                                unused: false,
                            },
                            vec![0; 80],
                        ),
                        entry(
                            "Events",
                            StorageModifier::Default,
                            StorageEntryTypeV13::Plain("Vec<EventRecord<T::Event, T::Hash>>".into()),
                            vec![0],
                        ),
                        entry(
                            "Number",
                            StorageModifier::Default,
                            StorageEntryTypeV13::Plain("T::BlockNumber".into()),
                            vec![0; 4],
                        ),
                    ],
                }),
                calls: Some(vec![FunctionMetadata {
                    name: "remark".into(),
                    args: args(&[("remark", "Vec<u8>")]),
                    docs: vec![],
                }]),
                events: Some(vec![
                    event("ExtrinsicSuccess", &[]),
                    event("NewAccount", &["AccountId"]),
                ]),
                constants: vec![],
                errors: vec![],
                index: 0,
            },
            ModuleMetadataV13 {
                name: "Balances".into(),
                storage: Some(StorageMetadataV13 {
                    prefix: "Balances".into(),
                    entries: vec![
                        entry(
                            "TotalIssuance",
                            StorageModifier::Default,
                            StorageEntryTypeV13::Plain("T::Balance".into()),
                            vec![0; 16],
                        ),
                        entry(
                            "Allowances",
                            StorageModifier::Optional,
                            StorageEntryTypeV13::DoubleMap {
                                hasher: StorageHasher::Blake2_128Concat,
                                key1: "T::AccountId".into(),
                                key2: "T::AccountId".into(),
                                value: "T::Balance".into(),
                                key2_hasher: StorageHasher::Twox64Concat,
                            },
                            vec![0],
                        ),
                    ],
                }),
                calls: Some(vec![FunctionMetadata {
                    name: "transfer".into(),
                    args: args(&[
                        ("dest", "<T::Lookup as StaticLookup>::Source"),
                        ("value", "Compact<T::Balance>"),
                    ]),
                    docs: vec![],
                }]),
                events: Some(vec![event("Transfer", &["AccountId", "AccountId", "Balance"])]),
                constants: vec![ConstantMetadata {
                    name: "ExistentialDeposit".into(),
                    ty: "T::Balance".into(),
                    value: 500u128.to_le_bytes().to_vec(),
                    docs: vec![],
                }],
                errors: vec![
                    ErrorMetadata {
                        name: "VestingBalance".into(),
                        docs: vec![],
                    },
                    ErrorMetadata {
                        name: "InsufficientBalance".into(),
                        docs: vec!["Balance too low to send value".into()],
                    },
                ],
                index: 5,
            },
        ],
        extrinsic: ExtrinsicMetadata::default(),
    }
}

/// [`sample_metadata`] as the `0x`-prefixed envelope `state_getMetadata`
/// returns.
pub fn sample_metadata_hex() -> String {
    let bytes = encode_envelope(&RuntimeMetadata::V13(sample_metadata()))
        .unwrap_or_default();
    format!("0x{}", hex::encode(bytes))
}

/// A `state_getRuntimeVersion` result.
pub fn runtime_version(spec_version: u32) -> Value {
    json!({
        "specName": "sample",
        "implName": "sample-node",
        "authoringVersion": 1,
        "specVersion": spec_version,
        "implVersion": 0,
        "apis": [],
        "transactionVersion": 1
    })
}

/// A mock already answering the calls a client makes while connecting.
pub fn bootstrapped(spec_version: u32) -> MockProvider {
    let mock = MockProvider::new();
    mock.respond("state_getMetadata", json!(sample_metadata_hex()));
    mock.respond("state_getRuntimeVersion", runtime_version(spec_version));
    mock
}
