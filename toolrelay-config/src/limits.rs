use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-user message volume and tool-call spacing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Minimum spacing between two tool calls from the same user.
    #[serde(default = "LimitsConfig::default_tool_cooldown_ms")]
    pub tool_cooldown_ms: u64,
    /// Length of the fixed message-counting window.
    #[serde(default = "LimitsConfig::default_message_window_ms")]
    pub message_window_ms: u64,
    /// Messages accepted per user inside one window.
    #[serde(default = "LimitsConfig::default_max_messages_per_window")]
    pub max_messages_per_window: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            tool_cooldown_ms: Self::default_tool_cooldown_ms(),
            message_window_ms: Self::default_message_window_ms(),
            max_messages_per_window: Self::default_max_messages_per_window(),
        }
    }
}

impl LimitsConfig {
    const fn default_tool_cooldown_ms() -> u64 {
        2_000
    }

    const fn default_message_window_ms() -> u64 {
        60_000
    }

    const fn default_max_messages_per_window() -> u32 {
        20
    }

    pub fn tool_cooldown(&self) -> Duration {
        Duration::from_millis(self.tool_cooldown_ms)
    }

    pub fn message_window(&self) -> Duration {
        Duration::from_millis(self.message_window_ms)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.message_window_ms > 0,
            "limits.message_window_ms must be greater than zero"
        );
        ensure!(
            self.max_messages_per_window > 0,
            "limits.max_messages_per_window must be at least 1"
        );
        Ok(())
    }
}
