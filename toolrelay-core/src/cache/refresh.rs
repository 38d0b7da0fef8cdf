//! Periodic cache refresh.
//!
//! Each cache has a [`CacheRefresher`]. Startup runs [`eager_load`] once and
//! then hands the refresher to [`spawn_refresh_loop`]. Failures are logged
//! and retried on the next tick; they never reach in-flight invocations.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::capabilities::{CacheDataError, CapabilityCache, parse_tool_list};
use super::destinations::{DestinationCache, DestinationUpdate};
use crate::gateway::{GatewayError, InvocationGateway};
use crate::payload::payload_text;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Data(#[from] CacheDataError),
}

#[async_trait]
pub trait CacheRefresher: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch and apply one refresh. Returns the number of cached entries.
    async fn refresh(&self) -> Result<usize, RefreshError>;
}

/// Refreshes the tool catalogue from the broker's tool list.
pub struct ToolCatalogRefresher {
    gateway: Arc<InvocationGateway>,
    cache: Arc<CapabilityCache>,
}

impl ToolCatalogRefresher {
    pub fn new(gateway: Arc<InvocationGateway>, cache: Arc<CapabilityCache>) -> Self {
        Self { gateway, cache }
    }
}

#[async_trait]
impl CacheRefresher for ToolCatalogRefresher {
    fn name(&self) -> &'static str {
        "tools"
    }

    async fn refresh(&self) -> Result<usize, RefreshError> {
        let listing = self.gateway.list_tools().await?;
        let tools = parse_tool_list(&listing)?;
        Ok(self.cache.replace_discovered(tools))
    }
}

/// Refreshes destinations by invoking the listing tool and decoding its
/// tabular text.
pub struct DestinationRefresher {
    gateway: Arc<InvocationGateway>,
    cache: Arc<DestinationCache>,
    listing_tool: String,
}

impl DestinationRefresher {
    pub fn new(
        gateway: Arc<InvocationGateway>,
        cache: Arc<DestinationCache>,
        listing_tool: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            cache,
            listing_tool: listing_tool.into(),
        }
    }
}

#[async_trait]
impl CacheRefresher for DestinationRefresher {
    fn name(&self) -> &'static str {
        "destinations"
    }

    async fn refresh(&self) -> Result<usize, RefreshError> {
        let payload = self.gateway.invoke(&self.listing_tool, Map::new()).await?;
        let text = match (&payload, payload_text(&payload)) {
            (_, Some(text)) => text,
            (Value::Null, None) => String::new(),
            (other, None) => {
                return Err(CacheDataError::Malformed(format!(
                    "destination listing has no text content: {other}"
                ))
                .into());
            }
        };

        match self.cache.apply_payload(&text) {
            DestinationUpdate::Replaced(count) => Ok(count),
            DestinationUpdate::Unchanged | DestinationUpdate::Discarded => Ok(self.cache.len()),
        }
    }
}

/// Run one refresh before traffic is accepted. A failure is logged and the
/// cache stays as it is.
pub async fn eager_load(refresher: &dyn CacheRefresher) -> Option<usize> {
    match refresher.refresh().await {
        Ok(count) => {
            info!(cache = refresher.name(), count, "cache loaded");
            Some(count)
        }
        Err(error) => {
            warn!(cache = refresher.name(), %error, "initial cache load failed; continuing");
            None
        }
    }
}

/// Refresh every `period` until `shutdown` is cancelled. The first tick
/// fires one period from now. Cancellation also abandons a refresh that is
/// still running; the cache keeps its last snapshot.
pub fn spawn_refresh_loop(
    refresher: Arc<dyn CacheRefresher>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(cache = refresher.name(), "refresh abandoned on shutdown");
                    break;
                }
                outcome = refresher.refresh() => outcome,
            };
            match outcome {
                Ok(count) => debug!(cache = refresher.name(), count, "cache refreshed"),
                Err(error) => warn!(cache = refresher.name(), %error, "cache refresh failed"),
            }
        }
        debug!(cache = refresher.name(), "refresh loop stopped");
    })
}
