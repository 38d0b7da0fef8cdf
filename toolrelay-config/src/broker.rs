use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the tool broker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// Base URL of the broker. JSON-RPC goes to `{endpoint}/rpc` and
    /// notifications stream from `{endpoint}/events`.
    #[serde(default = "BrokerConfig::default_endpoint")]
    pub endpoint: String,

    /// Name of the remote server the tools are submitted to.
    #[serde(default = "BrokerConfig::default_target")]
    pub target: String,

    /// Method tag identifying asynchronous tool-result notifications.
    #[serde(default = "BrokerConfig::default_result_method")]
    pub result_method: String,

    /// Deadline for a single tool invocation, covering submission and any
    /// later notification.
    #[serde(default = "BrokerConfig::default_invocation_timeout_seconds")]
    pub invocation_timeout_seconds: u64,

    /// Timeout for one HTTP round-trip to the broker.
    #[serde(default = "BrokerConfig::default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Optional environment variable holding a bearer token for the broker.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            target: Self::default_target(),
            result_method: Self::default_result_method(),
            invocation_timeout_seconds: Self::default_invocation_timeout_seconds(),
            request_timeout_seconds: Self::default_request_timeout_seconds(),
            api_key_env: None,
        }
    }
}

impl BrokerConfig {
    fn default_endpoint() -> String {
        "http://127.0.0.1:8931".to_string()
    }

    fn default_target() -> String {
        "slack".to_string()
    }

    fn default_result_method() -> String {
        "notifications/tools/result".to_string()
    }

    const fn default_invocation_timeout_seconds() -> u64 {
        300
    }

    const fn default_request_timeout_seconds() -> u64 {
        30
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.endpoint.trim().is_empty(),
            "broker.endpoint cannot be empty"
        );
        ensure!(
            !self.target.trim().is_empty(),
            "broker.target cannot be empty"
        );
        ensure!(
            !self.result_method.trim().is_empty(),
            "broker.result_method cannot be empty"
        );
        ensure!(
            self.invocation_timeout_seconds > 0,
            "broker.invocation_timeout_seconds must be at least 1"
        );
        ensure!(
            self.request_timeout_seconds > 0,
            "broker.request_timeout_seconds must be at least 1"
        );
        Ok(())
    }
}
