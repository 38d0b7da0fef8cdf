use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::loader::config::RelayConfig;
use crate::loader::layers::{ConfigLayerStack, LayerOrigin};
use crate::{CONFIG_FILE_NAME, CONFIG_PATH_ENV};

/// Loads, merges, and validates configuration layers.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: RelayConfig,
    config_path: Option<PathBuf>,
    layer_stack: ConfigLayerStack,
}

impl ConfigManager {
    /// Load configuration from the default locations.
    ///
    /// `TOOLRELAY_CONFIG_PATH` wins when set; otherwise the user file and the
    /// file in the current directory are layered.
    pub fn load() -> Result<Self> {
        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed).with_context(|| {
                    format!("Failed to load configuration from {CONFIG_PATH_ENV}={trimmed}")
                });
            }
        }

        Self::load_from_workspace(std::env::current_dir()?)
    }

    /// Load the user layer and `toolrelay.toml` from `workspace`.
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        Self::load_layers(Self::user_config_path(), None, workspace.as_ref())
    }

    /// Load the user layer plus an explicit file on top of it.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let workspace = path.parent().unwrap_or_else(|| Path::new("."));
        Self::load_layers(Self::user_config_path(), Some(path), workspace)
    }

    pub(crate) fn load_layers(
        user_config: Option<PathBuf>,
        explicit: Option<&Path>,
        workspace: &Path,
    ) -> Result<Self> {
        let mut layer_stack = ConfigLayerStack::default();

        if let Some(user_path) = user_config
            && user_path.exists()
        {
            let toml = Self::load_toml_from_file(&user_path)?;
            layer_stack.push(LayerOrigin::UserFile(user_path), toml);
        }

        match explicit {
            Some(path) => {
                let toml = Self::load_toml_from_file(path)?;
                layer_stack.push(LayerOrigin::WorkspaceFile(path.to_path_buf()), toml);
            }
            None => {
                let workspace_path = workspace.join(CONFIG_FILE_NAME);
                if workspace_path.exists() {
                    let toml = Self::load_toml_from_file(&workspace_path)?;
                    layer_stack.push(LayerOrigin::WorkspaceFile(workspace_path), toml);
                }
            }
        }

        Self::from_layers(layer_stack)
    }

    fn from_layers(layer_stack: ConfigLayerStack) -> Result<Self> {
        if layer_stack.is_empty() {
            let config = RelayConfig::default();
            config
                .validate()
                .context("Default configuration failed validation")?;
            debug!("no configuration files found; using defaults");
            return Ok(Self {
                config,
                config_path: None,
                layer_stack,
            });
        }

        let effective_toml = layer_stack.effective_config();
        let config: RelayConfig = effective_toml
            .try_into()
            .context("Failed to deserialize effective configuration")?;
        config
            .validate()
            .context("Configuration failed validation")?;

        let config_path = layer_stack.source_file().map(Path::to_path_buf);

        Ok(Self {
            config,
            config_path,
            layer_stack,
        })
    }

    /// Apply a dotted-key override, e.g. `limits.tool_cooldown_ms = 500`,
    /// on top of the loaded layers.
    pub fn with_override(mut self, key: &str, value: toml::Value) -> Result<Self> {
        let mut root = toml::Table::new();
        let mut segments: Vec<&str> = key.split('.').collect();
        let leaf = segments
            .pop()
            .filter(|segment| !segment.is_empty())
            .with_context(|| format!("Invalid override key: {key}"))?;

        let mut current = &mut root;
        for segment in segments {
            current = current
                .entry(segment.to_string())
                .or_insert(toml::Value::Table(toml::Table::new()))
                .as_table_mut()
                .with_context(|| format!("Invalid override key: {key}"))?;
        }
        current.insert(leaf.to_string(), value);

        self.layer_stack.push(
            LayerOrigin::Override {
                key: key.to_string(),
            },
            root,
        );
        Self::from_layers(self.layer_stack)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".toolrelay").join(CONFIG_FILE_NAME))
    }

    fn load_toml_from_file(path: &Path) -> Result<toml::Table> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let value: toml::Table = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(value)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Consume the manager, keeping only the configuration.
    pub fn into_config(self) -> RelayConfig {
        self.config
    }

    /// Highest-precedence file that contributed to the configuration.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn layer_stack(&self) -> &ConfigLayerStack {
        &self.layer_stack
    }
}
