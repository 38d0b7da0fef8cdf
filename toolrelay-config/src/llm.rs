use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the OpenAI-compatible model that turns chat text into a
/// decision and writes summaries.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Base URL; requests go to `{endpoint}/chat/completions`.
    #[serde(default = "LlmConfig::default_endpoint")]
    pub endpoint: String,

    #[serde(default = "LlmConfig::default_model")]
    pub model: String,

    /// Environment variable that holds the API key.
    #[serde(default = "LlmConfig::default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "LlmConfig::default_temperature")]
    pub temperature: f32,

    #[serde(default = "LlmConfig::default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Words in a message that ask for the tool result to be summarized.
    #[serde(default = "LlmConfig::default_summary_keywords")]
    pub summary_keywords: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            model: Self::default_model(),
            api_key_env: Self::default_api_key_env(),
            temperature: Self::default_temperature(),
            request_timeout_seconds: Self::default_request_timeout_seconds(),
            summary_keywords: Self::default_summary_keywords(),
        }
    }
}

impl LlmConfig {
    fn default_endpoint() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_model() -> String {
        "gpt-4o-mini".to_string()
    }

    fn default_api_key_env() -> String {
        "OPENAI_API_KEY".to_string()
    }

    const fn default_temperature() -> f32 {
        0.0
    }

    const fn default_request_timeout_seconds() -> u64 {
        60
    }

    fn default_summary_keywords() -> Vec<String> {
        ["summary", "summarize", "summarise"]
            .iter()
            .map(|s| (*s).to_string())
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.endpoint.trim().is_empty(), "llm.endpoint cannot be empty");
        ensure!(!self.model.trim().is_empty(), "llm.model cannot be empty");
        ensure!(
            (0.0..=2.0).contains(&self.temperature),
            "llm.temperature must be between 0.0 and 2.0"
        );
        Ok(())
    }
}
