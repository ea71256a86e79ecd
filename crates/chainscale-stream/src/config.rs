//! Multiplexer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplexerConfig {
    /// Grace period between the last unsubscribe and upstream teardown.
    #[serde(default = "default_teardown_delay_ms")]
    pub teardown_delay_ms: u64,
}

fn default_teardown_delay_ms() -> u64 { 1_750 }

impl MultiplexerConfig {
    pub fn teardown_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_delay_ms)
    }
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            teardown_delay_ms: default_teardown_delay_ms(),
        }
    }
}
