//! # chainscale-rpc
//!
//! Registry-typed JSON-RPC for Substrate nodes.
//!
//! - [`RpcCore`]: typed `call` / `subscribe` over the built-in method table,
//!   with arguments validated against the registry before sending and
//!   subscriptions shared through a [`Multiplexer`](chainscale_stream::Multiplexer).
//! - [`storage`]: storage key construction and key argument recovery.
//! - [`Api`]: a connected client that bootstraps its registry from the node's
//!   metadata and follows runtime upgrades.
//! - [`WireRouter`] / [`FrameProvider`]: JSON-RPC 2.0 frame routing for any
//!   text-frame transport.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use chainscale_rpc::{Api, ClientConfig, StorageQuery};
//! use serde_json::json;
//!
//! let api = Api::connect(provider, ClientConfig::default()).await?;
//! let account = api.storage("System", "Account", &[json!(alice)]).await?;
//! let _heads = api.subscribe("chain", "subscribeNewHeads", &[], |header| {
//!     println!("{:?}", header);
//! })?;
//! ```

pub mod api;
pub mod config;
pub mod definitions;
pub mod dispatch;
pub mod error;
pub mod hashing;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod provider;
pub mod request;
pub mod router;
pub mod storage;

pub use api::{Api, StorageItem, StorageQuery};
pub use config::{ClientConfig, ConfigError};
pub use definitions::{MethodTable, PubSub, RpcMethod, RpcParam, RAW_JSON};
pub use dispatch::{Response, RpcCore};
pub use error::{RpcError, TransportError};
pub use provider::{Provider, ProviderEvent, SubscriptionId, SubscriptionSink};
pub use request::{Frame, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use router::{FrameProvider, WireRouter};
