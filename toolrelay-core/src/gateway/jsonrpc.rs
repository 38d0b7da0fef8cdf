//! JSON-RPC 2.0 envelopes for the broker transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Submit a tool call to the broker.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// List the tools the broker offers for a target.
pub const METHOD_TOOLS_LIST: &str = "tools/list";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Value::Number(id.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallParams<'a> {
    pub target: &'a str,
    pub name: &'a str,
    pub arguments: &'a serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolListParams<'a> {
    pub target: &'a str,
}
