//! The `Provider` trait — the transport collaborator behind the dispatch core.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::error::TransportError;
use crate::request::RpcId;

/// Identifier a node assigns to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&RpcId> for SubscriptionId {
    fn from(id: &RpcId) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a provider forwards the `result` of each subscription push.
pub type SubscriptionSink = mpsc::UnboundedSender<Value>;

/// Connection-state notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Connected,
    Disconnected,
    Error(String),
}

/// A JSON-RPC transport to a node.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Send one request and return its `result`.
    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError>;

    /// Issue `method` and route every push of type `kind` for the returned
    /// subscription into `sink`.
    async fn subscribe(
        &self,
        kind: &str,
        method: &str,
        params: Vec<Value>,
        sink: SubscriptionSink,
    ) -> Result<SubscriptionId, TransportError>;

    /// Returns whether the node acknowledged the unsubscribe.
    async fn unsubscribe(
        &self,
        kind: &str,
        method: &str,
        id: &SubscriptionId,
    ) -> Result<bool, TransportError>;

    /// Connection-state events. Each call returns a fresh receiver.
    fn events(&self) -> broadcast::Receiver<ProviderEvent>;

    /// The endpoint this provider talks to (URL or name).
    fn endpoint(&self) -> &str;
}
