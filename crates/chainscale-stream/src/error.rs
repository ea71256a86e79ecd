//! Stream-level error types.

use std::any::Any;

use thiserror::Error;

/// Errors delivered to subscribers in place of an update.
///
/// `Clone` because a single upstream failure fans out to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("upstream failed: {0}")]
    Upstream(String),

    #[error("stream closed")]
    Closed,

    #[error("decode error in stream: {0}")]
    Decode(String),

    #[error("teardown failed: {0}")]
    Teardown(String),

    #[error("{0}")]
    Other(String),
}

/// A subscriber callback panicked. Logged and counted; never propagated.
#[derive(Debug, Clone, Error)]
#[error("subscription callback for `{key}` panicked: {message}")]
pub struct SubscriptionCallbackError {
    pub key: String,
    pub message: String,
}

impl SubscriptionCallbackError {
    pub(crate) fn from_panic(key: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            key: key.to_string(),
            message,
        }
    }
}
