//! What to do with a chat message: answer directly, call one tool, or admit
//! the request is unclear.

pub mod executor;

pub use executor::DecisionExecutor;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::cache::{DestinationSet, ToolCatalog};
use crate::errors::ErrorCode;

/// One incoming chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub user: String,
    pub text: String,
    /// Destination the message was posted in, injected into tool calls that
    /// do not name one.
    pub destination: Option<String>,
}

impl MessageContext {
    pub fn new(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            text: text.into(),
            destination: None,
        }
    }

    pub fn in_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Answer(String),
    Tool {
        name: String,
        input: Map<String, Value>,
    },
    Unclear,
}

impl Decision {
    pub fn answer(text: impl Into<String>) -> Self {
        Self::Answer(text.into())
    }

    pub fn tool(name: impl Into<String>, input: Map<String, Value>) -> Self {
        Self::Tool {
            name: name.into(),
            input,
        }
    }

    /// Decode a decision object: `{"tool": ..., "input": {...}}` or
    /// `{"answer": ...}`. When both are present the tool branch wins; when
    /// neither is, the decision is [`Decision::Unclear`].
    pub fn from_value(value: Value) -> Result<Self, DecisionError> {
        let Value::Object(mut map) = value else {
            return Err(DecisionError::Malformed(
                "decision is not a JSON object".to_string(),
            ));
        };

        if let Some(tool) = map.get("tool").and_then(Value::as_str) {
            let name = tool.trim().to_string();
            if !name.is_empty() {
                let input = match map.remove("input") {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(input)) => input,
                    Some(other) => {
                        return Err(DecisionError::Malformed(format!(
                            "tool input must be an object, got {other}"
                        )));
                    }
                };
                return Ok(Self::Tool { name, input });
            }
        }

        match map.remove("answer") {
            Some(Value::String(answer)) => Ok(Self::Answer(answer)),
            _ => Ok(Self::Unclear),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    #[error("malformed decision: {0}")]
    Malformed(String),
    #[error("decision backend failed: {0}")]
    Backend(String),
}

impl DecisionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Malformed(_) => ErrorCode::MalformedDecision,
            Self::Backend(_) => ErrorCode::ModelUnavailable,
        }
    }
}

/// Everything the decision step may look at.
#[derive(Debug, Clone)]
pub struct DecisionPrompt {
    pub text: String,
    pub tools: Arc<ToolCatalog>,
    pub destinations: Arc<DestinationSet>,
    pub destination: Option<String>,
}

/// Produces decisions and summaries, usually backed by a language model.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    async fn decide(&self, prompt: &DecisionPrompt) -> Result<Decision, DecisionError>;

    /// Summarize `raw` tool output in answer to `request`.
    async fn summarize(&self, request: &str, raw: &str) -> Result<String, DecisionError>;
}
