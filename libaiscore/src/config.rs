use std::{fs, time::Duration};

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::PluginError;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/instance_allocation_online";
pub const DEFAULT_ENV: &str = "TEST";
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
/// Business code the oracle uses to signal a usable answer.
pub const DEFAULT_SUCCESS_CODE: i64 = 100000;

/// Arguments of the `AiScore` plugin.
///
/// Every field is optional in the serialized form.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct AiScoreArgs {
    /// URL the scoring request is posted to.
    pub endpoint: String,
    /// Top-level `env` field of every scoring request.
    pub env: String,
    /// Upper bound for one oracle round trip, in milliseconds.
    pub timeout_ms: u64,
    pub success_code: i64,
    /// Only pods carrying this label are sent to the oracle.
    pub label_gate: Option<LabelGate>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LabelGate {
    pub key: String,
    pub value: String,
}

impl Default for AiScoreArgs {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            env: DEFAULT_ENV.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            success_code: DEFAULT_SUCCESS_CODE,
            label_gate: None,
        }
    }
}

impl AiScoreArgs {
    /// Decodes the free-form plugin configuration. `None` means defaults.
    pub fn decode(configuration: Option<&serde_yaml::Value>) -> Result<Self, PluginError> {
        let args = match configuration {
            Some(value) if !value.is_null() => serde_yaml::from_value(value.clone())?,
            _ => Self::default(),
        };
        args.validate()?;
        Ok(args)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, PluginError> {
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        Self::decode(Some(&value))
    }

    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read plugin args from {path}"))?;
        let args = Self::from_yaml_str(&content).context("Failed to parse plugin args")?;
        Ok(args)
    }

    pub fn validate(&self) -> Result<(), PluginError> {
        if self.timeout_ms == 0 {
            return Err(PluginError::InvalidConfig(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        let url = Url::parse(&self.endpoint).map_err(|e| {
            PluginError::InvalidConfig(format!("endpoint {:?}: {e}", self.endpoint))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PluginError::InvalidConfig(format!(
                "endpoint {:?} must use http or https",
                self.endpoint
            )));
        }
        if let Some(gate) = &self.label_gate
            && gate.key.is_empty()
        {
            return Err(PluginError::InvalidConfig(
                "label_gate.key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
