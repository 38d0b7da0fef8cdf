use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{BrokerConfig, CacheConfig, DebugConfig, LimitsConfig, LlmConfig};

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        self.broker.validate()?;
        self.cache.validate()?;
        self.llm.validate()?;
        Ok(())
    }
}
