use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A tool known ahead of discovery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StaticToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Input property names, only used as prompt hints.
    #[serde(default)]
    pub properties: Vec<String>,
}

/// Refresh cadence and parsing hints for the tool and destination caches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_tool_refresh_seconds")]
    pub tool_refresh_seconds: u64,

    #[serde(default = "CacheConfig::default_destination_refresh_seconds")]
    pub destination_refresh_seconds: u64,

    /// Tool invoked to list destinations. Its text result is the
    /// comma-separated table.
    #[serde(default = "CacheConfig::default_destination_tool")]
    pub destination_tool: String,

    /// Header prefix marking a destination payload as tabular.
    #[serde(default = "CacheConfig::default_destination_header_prefix")]
    pub destination_header_prefix: String,

    /// Input field that carries the destination id on tool calls. Filled from
    /// the conversation when the decision leaves it out.
    #[serde(default = "CacheConfig::default_destination_field")]
    pub destination_field: String,

    /// Tools that are always offered, merged under the discovered list.
    #[serde(default)]
    pub static_tools: Vec<StaticToolConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tool_refresh_seconds: Self::default_tool_refresh_seconds(),
            destination_refresh_seconds: Self::default_destination_refresh_seconds(),
            destination_tool: Self::default_destination_tool(),
            destination_header_prefix: Self::default_destination_header_prefix(),
            destination_field: Self::default_destination_field(),
            static_tools: Vec::new(),
        }
    }
}

impl CacheConfig {
    const fn default_tool_refresh_seconds() -> u64 {
        300
    }

    const fn default_destination_refresh_seconds() -> u64 {
        600
    }

    fn default_destination_tool() -> String {
        "channels_list".to_string()
    }

    fn default_destination_header_prefix() -> String {
        "ID,".to_string()
    }

    fn default_destination_field() -> String {
        "channel_id".to_string()
    }

    pub fn tool_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.tool_refresh_seconds)
    }

    pub fn destination_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.destination_refresh_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.tool_refresh_seconds > 0,
            "cache.tool_refresh_seconds must be at least 1"
        );
        ensure!(
            self.destination_refresh_seconds > 0,
            "cache.destination_refresh_seconds must be at least 1"
        );
        ensure!(
            !self.destination_field.trim().is_empty(),
            "cache.destination_field cannot be empty"
        );
        for tool in &self.static_tools {
            ensure!(
                !tool.name.trim().is_empty(),
                "cache.static_tools entries need a non-empty name"
            );
        }
        Ok(())
    }
}
