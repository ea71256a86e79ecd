//! Transport and dispatch error types.

use thiserror::Error;

use chainscale_codec::CodecError;
use chainscale_metadata::MetadataError;
use chainscale_registry::{RegistryError, ResolutionError};
use chainscale_stream::StreamError;

use crate::request::JsonRpcError;

/// Errors raised by a [`Provider`](crate::provider::Provider).
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connect, send or receive failed on the underlying byte stream.
    #[error("connection error: {0}")]
    Connection(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// The provider is not connected, or was disconnected while waiting.
    #[error("transport closed")]
    Closed,

    /// Request timed out after the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// A frame or result could not be deserialized.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Closed | Self::Timeout { .. }
        )
    }

    /// Returns `true` if the node rejected the request itself.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Deserialization(e.to_string())
    }
}

/// Everything the dispatch core and client can fail with.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("unknown RPC method {section}_{method}")]
    UnknownMethod { section: String, method: String },

    #[error("{method}: expected {min}..={max} arguments, got {got}")]
    ArgumentCount {
        method: String,
        min: usize,
        max: usize,
        got: usize,
    },

    #[error("{method}: argument `{param}` is invalid: {source}")]
    Argument {
        method: String,
        param: String,
        #[source]
        source: CodecError,
    },

    #[error("{method} is a subscription; use subscribe()")]
    SubscriptionRequired { method: String },

    #[error("{method} is not a subscription")]
    NotSubscription { method: String },

    #[error("storage {entry}: expected {expected} keys, got {got}")]
    StorageKeyCount {
        entry: String,
        expected: usize,
        got: usize,
    },

    #[error("unexpected response from {method}: {reason}")]
    UnexpectedResponse { method: String, reason: String },

    #[error("client disconnected")]
    Disconnected,
}

impl From<RegistryError> for RpcError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Resolution(e) => Self::Resolution(e),
            RegistryError::Codec(e) => Self::Codec(e),
        }
    }
}
