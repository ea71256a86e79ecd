//! # chainscale-stream
//!
//! Subscription sharing for chainscale clients.
//!
//! Identical subscriptions (same RPC method and parameters) share one
//! upstream. Late joiners get the latest value replayed, and the upstream is
//! torn down a short while after its last subscriber leaves so that quick
//! resubscribes reuse it.
//!
//! ## Architecture
//! ```text
//! Multiplexer::subscribe(key, factory, callback)
//!       │
//!       ▼
//! Entry (per key) ── factory() once ──► Upstream { updates, teardown }
//!       │                                      │
//!       ▼                                      ▼
//! per-subscriber delivery task  ◄──── pump task fans updates out
//!       │
//!       ▼
//! callback (panics caught and logged)
//! ```
//!
//! [`Combinator`] joins several subscriptions and fires once all of them
//! have produced a value.

pub mod combinator;
pub mod config;
pub mod error;
pub mod multiplexer;

pub use combinator::{Cancel, CancelFn, Combinator};
pub use config::MultiplexerConfig;
pub use error::{StreamError, SubscriptionCallbackError};
pub use multiplexer::{
    factory, Factory, Multiplexer, MultiplexerStats, Shared, Subscription, Update, Upstream,
    DEFAULT_TEARDOWN_DELAY,
};
