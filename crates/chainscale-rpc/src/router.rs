//! JSON-RPC frame routing over any text-frame transport.
//!
//! [`WireRouter`] correlates responses with pending requests by id (they may
//! arrive in any order) and routes subscription pushes to their sinks.
//! [`FrameProvider`] wraps a router around a pair of frame channels, so a
//! WebSocket or IPC adapter only has to move strings.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::provider::{Provider, ProviderEvent, SubscriptionId, SubscriptionSink};
use crate::request::{Frame, JsonRpcRequest, RpcId};

/// Pushes kept per subscription id while its subscribe response is in flight.
const MAX_EARLY_PUSHES: usize = 64;

/// Unregistered subscription ids buffered at once.
const MAX_EARLY_IDS: usize = 32;

/// Removed subscription ids whose late pushes are dropped outright.
const MAX_CLOSED_IDS: usize = 64;

type Reply = oneshot::Sender<Result<Value, TransportError>>;

#[derive(Default)]
struct RouterState {
    next_id: u64,
    pending: HashMap<u64, Reply>,
    subscriptions: HashMap<SubscriptionId, SubscriptionSink>,
    early: HashMap<SubscriptionId, Vec<Value>>,
    closed: VecDeque<SubscriptionId>,
}

/// Correlation-id and subscription-id routing table.
#[derive(Clone, Default)]
pub struct WireRouter {
    state: Arc<Mutex<RouterState>>,
}

impl WireRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for `method` and return the request with the receiver
    /// its response will be delivered to.
    pub fn request(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> (JsonRpcRequest, oneshot::Receiver<Result<Value, TransportError>>) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.pending.insert(id, tx);
        (JsonRpcRequest::new(id, method, params), rx)
    }

    /// Forget an in-flight request whose caller stopped waiting.
    pub fn cancel(&self, id: &RpcId) -> bool {
        let RpcId::Number(id) = id else {
            return false;
        };
        self.state.lock().unwrap().pending.remove(id).is_some()
    }

    /// Route pushes for `id` into `sink`, flushing any that arrived early.
    pub fn register(&self, id: SubscriptionId, sink: SubscriptionSink) {
        let mut state = self.state.lock().unwrap();
        state.closed.retain(|closed| closed != &id);
        for push in state.early.remove(&id).unwrap_or_default() {
            let _ = sink.send(push);
        }
        state.subscriptions.insert(id, sink);
    }

    pub fn remove(&self, id: &SubscriptionId) -> bool {
        let mut state = self.state.lock().unwrap();
        state.early.remove(id);
        if state.closed.len() == MAX_CLOSED_IDS {
            state.closed.pop_front();
        }
        state.closed.push_back(id.clone());
        state.subscriptions.remove(id).is_some()
    }

    /// Parse and route one incoming text frame.
    pub fn route(&self, text: &str) -> Result<(), TransportError> {
        let frame = Frame::parse(text)?;
        self.route_frame(frame);
        Ok(())
    }

    pub fn route_frame(&self, frame: Frame) {
        let mut state = self.state.lock().unwrap();
        match frame {
            Frame::Response(resp) => {
                let RpcId::Number(id) = resp.id else {
                    warn!(id = %resp.id, "response with a foreign id dropped");
                    return;
                };
                match state.pending.remove(&id) {
                    Some(reply) => {
                        let _ = reply.send(resp.into_result().map_err(TransportError::Rpc));
                    }
                    None => warn!(id, "response for unknown request dropped"),
                }
            }
            Frame::Notification(push) => {
                let id = SubscriptionId::from(&push.params.subscription);
                trace!(method = %push.method, subscription = %id, "subscription push");
                match state.subscriptions.get(&id) {
                    Some(sink) => {
                        if sink.send(push.params.result).is_err() {
                            state.subscriptions.remove(&id);
                        }
                    }
                    None if state.closed.contains(&id) => {
                        trace!(subscription = %id, "push after unsubscribe dropped");
                    }
                    None if !state.early.contains_key(&id) && state.early.len() == MAX_EARLY_IDS => {
                        warn!(subscription = %id, "push for unknown subscription dropped");
                    }
                    None => {
                        let early = state.early.entry(id).or_default();
                        if early.len() == MAX_EARLY_PUSHES {
                            early.remove(0);
                        }
                        early.push(push.params.result);
                    }
                }
            }
        }
    }

    /// Fail every in-flight request and drop every subscription sink.
    pub fn fail_all(&self, err: TransportError) {
        let mut state = self.state.lock().unwrap();
        let pending = state.pending.len();
        for (_, reply) in state.pending.drain() {
            let _ = reply.send(Err(err.clone()));
        }
        state.subscriptions.clear();
        state.early.clear();
        state.closed.clear();
        debug!(pending, error = %err, "router reset");
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn subscription_len(&self) -> usize {
        self.state.lock().unwrap().subscriptions.len()
    }

    /// Subscription ids with buffered pushes and no sink yet.
    pub fn early_len(&self) -> usize {
        self.state.lock().unwrap().early.len()
    }
}

/// Drops the pending entry for a request when its caller goes away.
struct PendingGuard<'a> {
    router: &'a WireRouter,
    id: RpcId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.router.cancel(&self.id) {
            trace!(id = %self.id, "abandoned request forgotten");
        }
    }
}

/// A [`Provider`] over an outgoing/incoming pair of text-frame channels.
pub struct FrameProvider {
    endpoint: String,
    router: WireRouter,
    outgoing: mpsc::UnboundedSender<String>,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
    events: broadcast::Sender<ProviderEvent>,
}

impl FrameProvider {
    pub fn new(
        endpoint: impl Into<String>,
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            endpoint: endpoint.into(),
            router: WireRouter::new(),
            outgoing,
            incoming: Mutex::new(Some(incoming)),
            reader: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub fn router(&self) -> &WireRouter {
        &self.router
    }
}

#[async_trait]
impl Provider for FrameProvider {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }
        let mut incoming = self
            .incoming
            .lock()
            .unwrap()
            .take()
            .ok_or(TransportError::Closed)?;

        let router = self.router.clone();
        let connected = self.connected.clone();
        let events = self.events.clone();
        let endpoint = self.endpoint.clone();
        let reader = tokio::spawn(async move {
            while let Some(text) = incoming.recv().await {
                if let Err(err) = router.route(&text) {
                    warn!(%endpoint, error = %err, "unreadable frame");
                    let _ = events.send(ProviderEvent::Error(err.to_string()));
                }
            }
            connected.store(false, Ordering::SeqCst);
            router.fail_all(TransportError::Closed);
            debug!(%endpoint, "frame stream ended");
            let _ = events.send(ProviderEvent::Disconnected);
        });

        *self.reader.lock().unwrap() = Some(reader);
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.send(ProviderEvent::Connected);
        debug!(endpoint = %self.endpoint, "provider connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(reader) = self.reader.lock().unwrap().take() {
            reader.abort();
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            self.router.fail_all(TransportError::Closed);
            let _ = self.events.send(ProviderEvent::Disconnected);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        let (req, rx) = self.router.request(method, params);
        let _pending = PendingGuard {
            router: &self.router,
            id: req.id.clone(),
        };
        let text = serde_json::to_string(&req)?;
        trace!(id = %req.id, method, "request sent");
        self.outgoing
            .send(text)
            .map_err(|_| TransportError::Connection("outgoing frame channel closed".into()))?;
        rx.await.map_err(|_| TransportError::Closed)?
    }

    async fn subscribe(
        &self,
        kind: &str,
        method: &str,
        params: Vec<Value>,
        sink: SubscriptionSink,
    ) -> Result<SubscriptionId, TransportError> {
        let result = self.send(method, params).await?;
        let id: RpcId = serde_json::from_value(result)?;
        let id = SubscriptionId::from(&id);
        debug!(kind, method, subscription = %id, "subscribed");
        self.router.register(id.clone(), sink);
        Ok(id)
    }

    async fn unsubscribe(
        &self,
        kind: &str,
        method: &str,
        id: &SubscriptionId,
    ) -> Result<bool, TransportError> {
        self.router.remove(id);
        let result = self.send(method, vec![Value::String(id.0.clone())]).await?;
        debug!(kind, method, subscription = %id, "unsubscribed");
        Ok(result.as_bool().unwrap_or(false))
    }

    fn events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn responses_correlate_out_of_order() {
        let router = WireRouter::new();
        let (first, rx1) = router.request("system_name", vec![]);
        let (second, rx2) = router.request("system_version", vec![]);
        assert_eq!(router.pending_len(), 2);

        router
            .route(&json!({"jsonrpc": "2.0", "id": second.id, "result": "1.0.0"}).to_string())
            .unwrap();
        router
            .route(&json!({"jsonrpc": "2.0", "id": first.id, "result": "node"}).to_string())
            .unwrap();

        assert_eq!(rx1.await.unwrap().unwrap(), json!("node"));
        assert_eq!(rx2.await.unwrap().unwrap(), json!("1.0.0"));
        assert_eq!(router.pending_len(), 0);
    }

    #[tokio::test]
    async fn error_objects_reach_the_caller() {
        let router = WireRouter::new();
        let (req, rx) = router.request("bogus", vec![]);
        router
            .route(
                &json!({"jsonrpc": "2.0", "id": req.id, "error": {"code": -32601, "message": "Method not found"}})
                    .to_string(),
            )
            .unwrap();
        let err = rx.await.unwrap().unwrap_err();
        assert!(err.is_execution_error());
    }

    #[test]
    fn early_pushes_are_flushed_on_register() {
        let router = WireRouter::new();
        let push = |n: u32| {
            json!({"jsonrpc": "2.0", "method": "chain_newHead",
                   "params": {"subscription": "s1", "result": n}})
            .to_string()
        };
        router.route(&push(1)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        router.register(SubscriptionId("s1".into()), tx);
        router.route(&push(2)).unwrap();

        assert_eq!(rx.try_recv().unwrap(), json!(1));
        assert_eq!(rx.try_recv().unwrap(), json!(2));
        assert!(router.remove(&SubscriptionId("s1".into())));
        assert_eq!(router.subscription_len(), 0);
    }

    #[test]
    fn pushes_for_removed_or_unknown_ids_are_bounded() {
        let router = WireRouter::new();
        let push = |sub: &str| {
            json!({"jsonrpc": "2.0", "method": "chain_newHead",
                   "params": {"subscription": sub, "result": 1}})
            .to_string()
        };

        let (tx, _rx) = mpsc::unbounded_channel();
        router.register(SubscriptionId("gone".into()), tx);
        router.remove(&SubscriptionId("gone".into()));
        router.route(&push("gone")).unwrap();
        assert_eq!(router.early_len(), 0);

        for n in 0..100 {
            router.route(&push(&format!("stray-{n}"))).unwrap();
        }
        assert_eq!(router.early_len(), MAX_EARLY_IDS);
    }

    #[test]
    fn garbage_frames_are_rejected() {
        let router = WireRouter::new();
        assert!(matches!(
            router.route("not json"),
            Err(TransportError::Deserialization(_))
        ));
    }

    /// A node that answers every request with a canned result and opens
    /// subscription "sub-1" for any `*_subscribe*` method.
    fn fake_node(
        mut requests: mpsc::UnboundedReceiver<String>,
        replies: mpsc::UnboundedSender<String>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(text) = requests.recv().await {
                let req: JsonRpcRequest = serde_json::from_str(&text).unwrap();
                let result = if req.method.contains("_subscribe") {
                    json!("sub-1")
                } else if req.method.contains("_unsubscribe") {
                    json!(true)
                } else {
                    json!(format!("reply to {}", req.method))
                };
                let reply = json!({"jsonrpc": "2.0", "id": req.id, "result": result});
                replies.send(reply.to_string()).unwrap();
                if req.method.contains("_subscribe") {
                    let push = json!({"jsonrpc": "2.0", "method": "chain_newHead",
                        "params": {"subscription": "sub-1", "result": {"number": "0x2a"}}});
                    replies.send(push.to_string()).unwrap();
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_requests_are_forgotten() {
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (_in_tx, in_rx) = mpsc::unbounded_channel();
        let provider = FrameProvider::new("silent", out_tx, in_rx);
        provider.connect().await.unwrap();

        for _ in 0..100 {
            let waited = tokio::time::timeout(
                std::time::Duration::from_millis(1),
                provider.send("system_name", vec![]),
            )
            .await;
            assert!(waited.is_err());
        }
        assert_eq!(provider.router().pending_len(), 0);
    }

    #[tokio::test]
    async fn failed_write_leaves_nothing_pending() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (_in_tx, in_rx) = mpsc::unbounded_channel();
        let provider = FrameProvider::new("broken", out_tx, in_rx);
        provider.connect().await.unwrap();
        drop(out_rx);

        assert!(matches!(
            provider.send("system_name", vec![]).await,
            Err(TransportError::Connection(_))
        ));
        assert_eq!(provider.router().pending_len(), 0);
    }

    #[tokio::test]
    async fn frame_provider_round_trip() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let _node = fake_node(out_rx, in_tx);
        let provider = FrameProvider::new("memory", out_tx, in_rx);
        let mut events = provider.events();

        assert!(matches!(
            provider.send("system_name", vec![]).await,
            Err(TransportError::Closed)
        ));
        provider.connect().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), ProviderEvent::Connected);

        let name = provider.send("system_name", vec![]).await.unwrap();
        assert_eq!(name, json!("reply to system_name"));

        let (sink, mut pushes) = mpsc::unbounded_channel();
        let id = provider
            .subscribe("chain_newHead", "chain_subscribeNewHead", vec![], sink)
            .await
            .unwrap();
        assert_eq!(id, SubscriptionId("sub-1".into()));
        assert_eq!(pushes.recv().await.unwrap()["number"], "0x2a");

        assert!(provider
            .unsubscribe("chain_newHead", "chain_unsubscribeNewHead", &id)
            .await
            .unwrap());

        provider.disconnect().await.unwrap();
        assert!(!provider.is_connected());
        assert_eq!(events.recv().await.unwrap(), ProviderEvent::Disconnected);
    }
}
