//! Tool and destination caches plus their refresh loops.

pub mod capabilities;
pub mod destinations;
pub mod refresh;
pub mod tabular;

pub use capabilities::{CacheDataError, CapabilityCache, ToolCatalog, ToolDefinition, parse_tool_list};
pub use destinations::{Destination, DestinationCache, DestinationSet, DestinationUpdate};
pub use refresh::{
    CacheRefresher, DestinationRefresher, RefreshError, ToolCatalogRefresher, eager_load,
    spawn_refresh_loop,
};
