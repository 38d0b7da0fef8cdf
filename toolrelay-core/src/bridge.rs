use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CapabilityCache, DestinationCache};
use crate::decision::{DecisionExecutor, DecisionPrompt, DecisionSource, MessageContext};
use crate::limits::RateLimiter;

/// Entry point for chat messages: limiter, decision, execution.
///
/// Every failure becomes the reply text; nothing propagates past
/// [`ChatBridge::handle_message`].
pub struct ChatBridge {
    limiter: Arc<RateLimiter>,
    capabilities: Arc<CapabilityCache>,
    destinations: Arc<DestinationCache>,
    decisions: Arc<dyn DecisionSource>,
    executor: DecisionExecutor,
}

impl ChatBridge {
    pub fn new(
        limiter: Arc<RateLimiter>,
        capabilities: Arc<CapabilityCache>,
        destinations: Arc<DestinationCache>,
        decisions: Arc<dyn DecisionSource>,
        executor: DecisionExecutor,
    ) -> Self {
        Self {
            limiter,
            capabilities,
            destinations,
            decisions,
            executor,
        }
    }

    pub async fn handle_message(&self, context: &MessageContext) -> String {
        if let Err(denied) = self.limiter.check_message_rate(&context.user) {
            return denied.to_string();
        }

        let prompt = DecisionPrompt {
            text: context.text.clone(),
            tools: self.capabilities.snapshot(),
            destinations: self.destinations.snapshot(),
            destination: context.destination.clone(),
        };

        let decision = match self.decisions.decide(&prompt).await {
            Ok(decision) => decision,
            Err(error) => {
                warn!(user = %context.user, %error, "decision failed");
                let code = error.code();
                return format!("{} [{code}]", code.user_guidance());
            }
        };
        debug!(user = %context.user, ?decision, "decision made");

        let reply = self.executor.execute(context, decision).await;
        info!(user = %context.user, reply_len = reply.len(), "message handled");
        reply
    }
}
