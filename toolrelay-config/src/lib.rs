//! Configuration for toolrelay.
//!
//! Every section deserializes with constant defaults so an empty file (or no
//! file at all) yields a working configuration. Use [`ConfigManager`] to load
//! the layered user/workspace files, or [`RelayConfig::default`] in tests.

pub mod broker;
pub mod cache;
pub mod debug;
pub mod limits;
pub mod llm;
pub mod loader;

pub use broker::BrokerConfig;
pub use cache::{CacheConfig, StaticToolConfig};
pub use debug::{DebugConfig, TraceLevel};
pub use limits::LimitsConfig;
pub use llm::LlmConfig;
pub use loader::{ConfigManager, RelayConfig};

/// Name of the configuration file looked up in the home and workspace dirs.
pub const CONFIG_FILE_NAME: &str = "toolrelay.toml";

/// Environment variable pointing at an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "TOOLRELAY_CONFIG_PATH";
