use serde_json::{Map, Value};
use std::sync::Arc;
use toolrelay_config::{CacheConfig, LlmConfig};
use tracing::{debug, info, warn};

use super::{Decision, DecisionSource, MessageContext};
use crate::cache::CapabilityCache;
use crate::errors::ErrorCode;
use crate::gateway::{GatewayError, InvocationGateway};
use crate::limits::RateLimiter;
use crate::payload::format_tool_result;

pub(crate) const UNCLEAR_REPLY: &str =
    "I'm not sure which tool to use for that. Could you rephrase the request?";

/// Acts on a [`Decision`] and always produces a reply.
///
/// Tool calls are checked against the catalogue first, then against the
/// caller's cooldown, and only then submitted.
pub struct DecisionExecutor {
    capabilities: Arc<CapabilityCache>,
    limiter: Arc<RateLimiter>,
    gateway: Arc<InvocationGateway>,
    summarizer: Arc<dyn DecisionSource>,
    destination_field: String,
    summary_keywords: Vec<String>,
}

impl DecisionExecutor {
    pub fn new(
        capabilities: Arc<CapabilityCache>,
        limiter: Arc<RateLimiter>,
        gateway: Arc<InvocationGateway>,
        summarizer: Arc<dyn DecisionSource>,
    ) -> Self {
        Self {
            capabilities,
            limiter,
            gateway,
            summarizer,
            destination_field: CacheConfig::default().destination_field,
            summary_keywords: LlmConfig::default().summary_keywords,
        }
    }

    /// Input field that carries the destination id.
    pub fn with_destination_field(mut self, field: impl Into<String>) -> Self {
        self.destination_field = field.into();
        self
    }

    /// Words that mark a request for a summarized result.
    pub fn with_summary_keywords(mut self, keywords: Vec<String>) -> Self {
        self.summary_keywords = keywords
            .into_iter()
            .map(|keyword| keyword.to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        self
    }

    pub async fn execute(&self, context: &MessageContext, decision: Decision) -> String {
        match decision {
            Decision::Answer(answer) => answer,
            Decision::Unclear => UNCLEAR_REPLY.to_string(),
            Decision::Tool { name, input } => self.run_tool(context, &name, input).await,
        }
    }

    async fn run_tool(
        &self,
        context: &MessageContext,
        tool: &str,
        mut input: Map<String, Value>,
    ) -> String {
        if !self.capabilities.contains(tool) {
            info!(tool, user = %context.user, "decision named an unknown tool");
            return format!(
                "The tool `{tool}` is not available right now. ({})",
                ErrorCode::ToolNotAvailable.user_guidance()
            );
        }

        if let Some(destination) = &context.destination
            && !input.contains_key(&self.destination_field)
        {
            debug!(tool, field = %self.destination_field, "injecting ambient destination");
            input.insert(
                self.destination_field.clone(),
                Value::String(destination.clone()),
            );
        }

        if let Err(denied) = self.limiter.check_tool_cooldown(&context.user) {
            return denied.to_string();
        }

        let result = match self.gateway.invoke(tool, input).await {
            Ok(result) => result,
            Err(error) => return failure_reply(tool, &error),
        };
        let formatted = format_tool_result(&result);

        if !self.wants_summary(&context.text) {
            return formatted;
        }
        match self.summarizer.summarize(&context.text, &formatted).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => formatted,
            Err(error) => {
                warn!(tool, %error, "summary failed; replying with the raw result");
                formatted
            }
        }
    }

    fn wants_summary(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.summary_keywords
            .iter()
            .any(|keyword| lowered.contains(keyword.as_str()))
    }
}

fn failure_reply(tool: &str, error: &GatewayError) -> String {
    let code = error.code();
    format!(
        "Sorry, the `{tool}` call failed: {error} [{code}]. {}",
        code.user_guidance()
    )
}
