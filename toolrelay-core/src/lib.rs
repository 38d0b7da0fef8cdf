//! Core of toolrelay: turns chat messages into answers or remote tool calls.
//!
//! - [`limits`]: per-user message rate and tool cooldown
//! - [`cache`]: tool catalogue and destination list, refreshed periodically
//! - [`gateway`]: submits tool calls and correlates out-of-band results
//! - [`decision`]: acts on the decision for one message
//! - [`bridge`]: ties the above together behind one `handle_message` call

pub mod bridge;
pub mod cache;
pub mod decision;
pub mod errors;
pub mod gateway;
pub mod limits;
pub mod llm;
pub mod payload;

pub use bridge::ChatBridge;
pub use cache::{CapabilityCache, DestinationCache, ToolDefinition};
pub use decision::{
    Decision, DecisionError, DecisionExecutor, DecisionPrompt, DecisionSource, MessageContext,
};
pub use errors::ErrorCode;
pub use gateway::{
    ConnectionError, GatewayError, HttpBrokerConnection, InvocationGateway, SubmitOutcome,
    ToolConnection, ToolNotification,
};
pub use limits::{LimitError, LimitPolicy, RateLimiter};
pub use llm::OpenAiDecisionSource;
