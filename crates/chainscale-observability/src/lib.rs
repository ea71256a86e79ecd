//! # chainscale-observability
//!
//! Structured logging for chainscale.
//!
//! Every chainscale crate logs through `tracing`; this crate installs the
//! subscriber. Levels are set globally and per component (crate name), and
//! output is either human-readable text or JSON lines for log shippers.
//!
//! ```rust,ignore
//! let mut log = LogConfig::default();
//! log.components.insert("chainscale-stream".into(), "debug".into());
//! chainscale_observability::init_tracing(&log)?;
//! ```

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, LogConfig, LogSetupError};
