use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

/// Transport-level failures of a broker connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("network error: {0}")]
    Network(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("broker error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("connection closed")]
    Closed,
}

/// A server-initiated message from the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolNotification {
    pub method: String,
    #[serde(
        default,
        rename = "correlationId",
        alias = "correlation_id",
        deserialize_with = "deserialize_correlation_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl ToolNotification {
    pub fn new(method: impl Into<String>, correlation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            method: method.into(),
            correlation_id: Some(correlation_id.into()),
            payload,
        }
    }
}

/// What the broker answered to a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The result itself.
    Inline(Value),
    /// An acknowledgment; the result follows as a notification carrying
    /// this id.
    Pending { correlation_id: String },
}

impl SubmitOutcome {
    /// Interpret a `tools/call` result. An object carrying a `correlationId`
    /// (or `correlation_id`) field is an acknowledgment; anything else is the
    /// result. Numeric ids are kept in their decimal form. A marker that is
    /// empty, null or not a scalar id is a protocol error.
    pub fn from_result(result: Value) -> Result<Self, ConnectionError> {
        let marker = match &result {
            Value::Object(map) => map
                .get("correlationId")
                .or_else(|| map.get("correlation_id"))
                .cloned(),
            _ => None,
        };
        let Some(marker) = marker else {
            return Ok(Self::Inline(result));
        };

        match correlation_id_text(&marker) {
            Some(correlation_id) => Ok(Self::Pending { correlation_id }),
            None => Err(ConnectionError::Protocol(format!(
                "acknowledgment carries an unusable correlation id: {marker}"
            ))),
        }
    }
}

fn correlation_id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn deserialize_correlation_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(correlation_id_text))
}

/// A live link to a tool broker.
///
/// Implementations push every notification they receive to all current
/// subscribers; the gateway does the correlation.
#[async_trait]
pub trait ToolConnection: Send + Sync {
    fn is_live(&self) -> bool;

    async fn submit(
        &self,
        target: &str,
        tool: &str,
        input: &Map<String, Value>,
    ) -> Result<SubmitOutcome, ConnectionError>;

    async fn list_tools(&self, target: &str) -> Result<Value, ConnectionError>;

    fn subscribe(&self) -> broadcast::Receiver<ToolNotification>;
}
