//! Configuration layers and how they combine.
//!
//! Layers apply lowest precedence first. Tables merge key by key. A list
//! whose entries are all tables with a `name` key (such as
//! `cache.static_tools`) merges by name: a higher layer replaces the entry
//! with the same name and appends the rest, so a workspace file can add a
//! tool without repeating the user's list. Any other value, including an
//! empty list, replaces what was below it.

use std::path::{Path, PathBuf};
use toml::{Table, Value};

const ENTRY_KEY: &str = "name";

/// Where a layer was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerOrigin {
    /// `~/.toolrelay/toolrelay.toml`
    UserFile(PathBuf),
    /// `toolrelay.toml` in the workspace, or the explicit `--config` file
    WorkspaceFile(PathBuf),
    /// A dotted `key=value` override
    Override { key: String },
}

impl LayerOrigin {
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::UserFile(path) | Self::WorkspaceFile(path) => Some(path),
            Self::Override { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    pub origin: LayerOrigin,
    pub value: Table,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigLayerStack {
    layers: Vec<ConfigLayer>,
}

impl ConfigLayerStack {
    pub fn push(&mut self, origin: LayerOrigin, value: Table) {
        self.layers.push(ConfigLayer { origin, value });
    }

    pub fn layers(&self) -> &[ConfigLayer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Highest-precedence layer that came from a file.
    pub fn source_file(&self) -> Option<&Path> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.origin.file())
    }

    pub fn effective_config(&self) -> Value {
        let mut merged = Table::new();
        for layer in &self.layers {
            overlay_table(&mut merged, &layer.value);
        }
        Value::Table(merged)
    }
}

fn overlay_table(base: &mut Table, overlay: &Table) {
    for (key, incoming) in overlay {
        match base.get_mut(key) {
            Some(existing) => overlay_value(existing, incoming),
            None => {
                base.insert(key.clone(), incoming.clone());
            }
        }
    }
}

fn overlay_value(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Table(base), Value::Table(incoming)) => overlay_table(base, incoming),
        (Value::Array(base), Value::Array(incoming))
            if is_named_list(base.as_slice()) && is_named_list(incoming) =>
        {
            overlay_named(base, incoming);
        }
        (base, incoming) => *base = incoming.clone(),
    }
}

fn entry_name(entry: &Value) -> Option<&str> {
    entry.get(ENTRY_KEY).and_then(Value::as_str)
}

fn is_named_list(entries: &[Value]) -> bool {
    !entries.is_empty() && entries.iter().all(|entry| entry_name(entry).is_some())
}

fn overlay_named(base: &mut Vec<Value>, incoming: &[Value]) {
    for entry in incoming {
        let name = entry_name(entry);
        match base.iter_mut().find(|existing| entry_name(existing) == name) {
            Some(existing) => *existing = entry.clone(),
            None => base.push(entry.clone()),
        }
    }
}
