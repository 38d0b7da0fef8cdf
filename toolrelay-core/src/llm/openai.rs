use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use toolrelay_config::LlmConfig;
use tracing::{debug, warn};

use super::prompt::{decision_system_prompt, summary_system_prompt, summary_user_prompt};
use super::reply::parse_decision;
use crate::decision::{Decision, DecisionError, DecisionPrompt, DecisionSource};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// [`DecisionSource`] backed by an OpenAI-compatible `/chat/completions`
/// endpoint.
pub struct OpenAiDecisionSource {
    http_client: HttpClient,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiDecisionSource {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, DecisionError> {
        Self::build(base_url.into(), model.into(), api_key, 0.0, None)
    }

    /// Build from `[llm]`; the key is read from the configured environment
    /// variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self, DecisionError> {
        config
            .validate()
            .map_err(|e| DecisionError::Backend(format!("invalid model settings: {e}")))?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "no API key for the decision model; requests are sent unauthenticated"
            );
        }
        Self::build(
            config.endpoint.clone(),
            config.model.clone(),
            api_key,
            config.temperature,
            Some(config.request_timeout()),
        )
    }

    fn build(
        base_url: String,
        model: String,
        api_key: Option<String>,
        temperature: f32,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self, DecisionError> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| DecisionError::Backend(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            temperature,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, DecisionError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let mut builder = self.http_client.post(self.chat_url()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| DecisionError::Backend(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DecisionError::Backend(format!("HTTP {status}: {body}")));
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| DecisionError::Backend(format!("invalid completion response: {e}")))?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        debug!(model = %self.model, reply_len = content.len(), "model replied");
        Ok(content)
    }
}

#[async_trait]
impl DecisionSource for OpenAiDecisionSource {
    async fn decide(&self, prompt: &DecisionPrompt) -> Result<Decision, DecisionError> {
        let system = decision_system_prompt(prompt);
        let reply = self.complete(&system, &prompt.text).await?;
        parse_decision(&reply)
    }

    async fn summarize(&self, request: &str, raw: &str) -> Result<String, DecisionError> {
        let reply = self
            .complete(summary_system_prompt(), &summary_user_prompt(request, raw))
            .await?;
        Ok(reply.trim().to_string())
    }
}
