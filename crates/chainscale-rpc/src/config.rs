//! Client configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for one client connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Node endpoint, e.g. "ws://127.0.0.1:9944". Informational for
    /// providers constructed elsewhere.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Grace period between the last unsubscribe and upstream teardown.
    #[serde(default = "default_teardown_delay_ms")]
    pub teardown_delay_ms: u64,
    /// Refresh metadata and replace the registry on runtime upgrades.
    #[serde(default = "bool_true")]
    pub watch_runtime_upgrades: bool,
    /// Extra type definitions, in bundle format (`{"Name": "Definition"}`).
    #[serde(default = "empty_bundle")]
    pub types: Json,
    /// pallet → (type name → replacement), applied within that pallet only.
    #[serde(default)]
    pub aliases: HashMap<String, HashMap<String, String>>,
    /// Page size for storage key iteration.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_teardown_delay_ms() -> u64 { 1_750 }
fn bool_true() -> bool { true }
fn empty_bundle() -> Json { Json::Object(Default::default()) }
fn default_page_size() -> u32 { 1_000 }

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            teardown_delay_ms: default_teardown_delay_ms(),
            watch_runtime_upgrades: bool_true(),
            types: empty_bundle(),
            aliases: HashMap::new(),
            page_size: default_page_size(),
        }
    }
}

impl ClientConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()
    }

    /// Load from a `.json` file, or YAML for any other extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    pub fn teardown_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_delay_ms)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if !self.types.is_object() {
            return Err(ConfigError::Invalid("`types` must be a map of definitions".into()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("`page_size` must be positive".into()));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_documents() {
        let config = ClientConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.teardown_delay_ms, 1_750);
        assert!(config.watch_runtime_upgrades);
        assert!(config.aliases.is_empty());
        assert_eq!(config.page_size, 1_000);
        assert_eq!(config.teardown_delay(), Duration::from_millis(1_750));
    }

    #[test]
    fn yaml_types_and_aliases() {
        let config = ClientConfig::from_yaml_str(
            r#"
endpoint: ws://127.0.0.1:9944
teardown_delay_ms: 500
watch_runtime_upgrades: false
types:
  Balance: u64
  Keys: "(AccountId, AccountId)"
aliases:
  treasury:
    Proposal: TreasuryProposal
"#,
        )
        .unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("ws://127.0.0.1:9944"));
        assert_eq!(config.teardown_delay_ms, 500);
        assert!(!config.watch_runtime_upgrades);
        assert_eq!(config.types["Balance"], "u64");
        assert_eq!(config.aliases["treasury"]["Proposal"], "TreasuryProposal");
    }

    #[test]
    fn json_config_validates() {
        let config = ClientConfig::from_json_str(r#"{"types": {"Balance": "u64"}}"#).unwrap();
        assert_eq!(config.types["Balance"], "u64");
        assert!(matches!(
            ClientConfig::from_json_str(r#"{"types": ["Balance"]}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ClientConfig::from_json_str(r#"{"page_size": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
    }
}
