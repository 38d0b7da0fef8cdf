use arc_swap::ArcSwap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use toolrelay_config::StaticToolConfig;

use crate::errors::ErrorCode;

/// A tool the decision step may pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Top-level input property names, in schema order.
    #[serde(default)]
    pub input_properties: Vec<String>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_properties: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_properties = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn accepts(&self, property: &str) -> bool {
        self.input_properties.iter().any(|p| p == property)
    }

    /// Read one entry of a `tools/list` result. Entries without a name are
    /// rejected.
    pub fn from_discovered(entry: &Value) -> Option<Self> {
        let name = entry.get("name")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }
        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let input_properties = entry
            .get("inputSchema")
            .or_else(|| entry.get("input_schema"))
            .and_then(|schema| schema.get("properties"))
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();

        Some(Self {
            name: name.to_string(),
            description,
            input_properties,
        })
    }
}

impl From<&StaticToolConfig> for ToolDefinition {
    fn from(config: &StaticToolConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            input_properties: config.properties.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheDataError {
    #[error("malformed tool list: {0}")]
    Malformed(String),
}

impl CacheDataError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::MalformedCacheData
    }
}

/// Decode a `tools/list` result: either `{"tools": [...]}` or a bare array.
/// Unusable entries are skipped; a payload of any other shape is an error.
pub fn parse_tool_list(result: &Value) -> Result<Vec<ToolDefinition>, CacheDataError> {
    let entries = match result {
        Value::Array(entries) => entries,
        Value::Object(map) => map
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| CacheDataError::Malformed("missing `tools` array".to_string()))?,
        other => {
            return Err(CacheDataError::Malformed(format!(
                "expected an object or array, got {}",
                json_kind(other)
            )));
        }
    };

    let tools: Vec<ToolDefinition> = entries
        .iter()
        .filter_map(ToolDefinition::from_discovered)
        .collect();
    if tools.len() < entries.len() {
        tracing::debug!(
            skipped = entries.len() - tools.len(),
            "skipped tool entries without a name"
        );
    }
    Ok(tools)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub type ToolCatalog = IndexMap<String, ToolDefinition>;

/// Catalogue of available tools: configured tools overlaid with whatever the
/// broker last reported. A discovered tool replaces a configured one of the
/// same name.
pub struct CapabilityCache {
    static_tools: Vec<ToolDefinition>,
    current: ArcSwap<ToolCatalog>,
}

impl CapabilityCache {
    pub fn new(static_tools: Vec<ToolDefinition>) -> Self {
        let catalog = Self::merge(&static_tools, Vec::new());
        Self {
            static_tools,
            current: ArcSwap::from_pointee(catalog),
        }
    }

    pub fn from_config(static_tools: &[StaticToolConfig]) -> Self {
        Self::new(static_tools.iter().map(ToolDefinition::from).collect())
    }

    fn merge(static_tools: &[ToolDefinition], discovered: Vec<ToolDefinition>) -> ToolCatalog {
        let mut catalog: ToolCatalog = static_tools
            .iter()
            .map(|tool| (tool.name.clone(), tool.clone()))
            .collect();
        for tool in discovered {
            catalog.insert(tool.name.clone(), tool);
        }
        catalog
    }

    /// Swap in a freshly discovered tool list. Returns the catalogue size.
    pub fn replace_discovered(&self, discovered: Vec<ToolDefinition>) -> usize {
        let catalog = Self::merge(&self.static_tools, discovered);
        let count = catalog.len();
        self.current.store(Arc::new(catalog));
        count
    }

    pub fn contains(&self, name: &str) -> bool {
        self.current.load().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<ToolDefinition> {
        self.current.load().get(name).cloned()
    }

    pub fn snapshot(&self) -> Arc<ToolCatalog> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}
