use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use toolrelay_config::{ConfigManager, RelayConfig};
use toolrelay_core::cache::{
    CacheRefresher, DestinationRefresher, ToolCatalogRefresher, eager_load, spawn_refresh_loop,
};
use toolrelay_core::gateway::HttpBrokerConnectionBuilder;
use toolrelay_core::{
    CapabilityCache, ChatBridge, DecisionExecutor, DecisionSource, DestinationCache,
    HttpBrokerConnection, InvocationGateway, LimitPolicy, OpenAiDecisionSource, RateLimiter,
    ToolConnection,
};

const LIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Split `--config` entries into an optional file path and `key=value`
/// overrides. The first bare entry wins as the path.
pub fn parse_config_entries(entries: &[String]) -> (Option<PathBuf>, Vec<(String, String)>) {
    let mut path = None;
    let mut overrides = Vec::new();

    for entry in entries {
        if let Some((key, value)) = entry.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                overrides.push((key.to_string(), value.trim().to_string()));
            }
        } else if path.is_none() {
            path = Some(PathBuf::from(entry));
        }
    }

    (path, overrides)
}

/// Interpret an override value as TOML, falling back to a plain string so
/// `broker.target=slack` works without quotes.
pub fn parse_override_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {raw}"))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

pub fn load_config(entries: &[String]) -> Result<RelayConfig> {
    let (path, overrides) = parse_config_entries(entries);
    let mut manager = match path {
        Some(path) => ConfigManager::load_from_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => ConfigManager::load().context("failed to load configuration")?,
    };

    for (key, raw) in overrides {
        manager = manager
            .with_override(&key, parse_override_value(&raw))
            .with_context(|| format!("invalid configuration override `{key}`"))?;
    }

    Ok(manager.into_config())
}

/// Everything a running relay owns. Built once, torn down by [`Self::shutdown`].
pub struct Runtime {
    pub config: RelayConfig,
    pub capabilities: Arc<CapabilityCache>,
    pub destinations: Arc<DestinationCache>,
    pub bridge: ChatBridge,
    gateway: Arc<InvocationGateway>,
    connection: Arc<HttpBrokerConnection>,
    shutdown: CancellationToken,
    refresh_tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    pub async fn start(config: RelayConfig) -> Result<Self> {
        // Fallible construction happens before any task is spawned.
        let decisions: Arc<dyn DecisionSource> = Arc::new(
            OpenAiDecisionSource::from_config(&config.llm)
                .context("failed to configure the decision model")?,
        );
        let connection = Arc::new(
            HttpBrokerConnectionBuilder::from_config(&config.broker)
                .build()
                .context("failed to build broker connection")?,
        );
        connection.start();

        let gateway = Arc::new(InvocationGateway::from_config(&config.broker));
        gateway.attach(Arc::clone(&connection) as Arc<dyn ToolConnection>);
        wait_until_live(connection.as_ref(), config.broker.request_timeout()).await;

        let capabilities = Arc::new(CapabilityCache::from_config(&config.cache.static_tools));
        let destinations = Arc::new(DestinationCache::new(
            config.cache.destination_header_prefix.clone(),
        ));

        let tool_refresher: Arc<dyn CacheRefresher> = Arc::new(ToolCatalogRefresher::new(
            Arc::clone(&gateway),
            Arc::clone(&capabilities),
        ));
        let destination_refresher: Arc<dyn CacheRefresher> = Arc::new(DestinationRefresher::new(
            Arc::clone(&gateway),
            Arc::clone(&destinations),
            config.cache.destination_tool.clone(),
        ));
        eager_load(tool_refresher.as_ref()).await;
        eager_load(destination_refresher.as_ref()).await;

        let shutdown = CancellationToken::new();
        let refresh_tasks = vec![
            spawn_refresh_loop(
                tool_refresher,
                config.cache.tool_refresh_interval(),
                shutdown.child_token(),
            ),
            spawn_refresh_loop(
                destination_refresher,
                config.cache.destination_refresh_interval(),
                shutdown.child_token(),
            ),
        ];

        let limiter = Arc::new(RateLimiter::new(LimitPolicy::from(&config.limits)));
        let executor = DecisionExecutor::new(
            Arc::clone(&capabilities),
            Arc::clone(&limiter),
            Arc::clone(&gateway),
            Arc::clone(&decisions),
        )
        .with_destination_field(config.cache.destination_field.clone())
        .with_summary_keywords(config.llm.summary_keywords.clone());
        let bridge = ChatBridge::new(
            limiter,
            Arc::clone(&capabilities),
            Arc::clone(&destinations),
            decisions,
            executor,
        );

        info!(
            broker_target = gateway.target(),
            tools = capabilities.len(),
            destinations = destinations.len(),
            "relay ready"
        );

        Ok(Self {
            config,
            capabilities,
            destinations,
            bridge,
            gateway,
            connection,
            shutdown,
            refresh_tasks,
        })
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.refresh_tasks {
            if let Err(error) = task.await {
                debug!(%error, "refresh task ended abnormally");
            }
        }
        self.gateway.detach();
        self.connection.close();
        debug!("relay stopped");
    }
}

/// Give the event stream a moment to connect. Calls made before it is live
/// fail fast, so a broker that is down is only logged here.
async fn wait_until_live(connection: &HttpBrokerConnection, limit: Duration) {
    let deadline = Instant::now() + limit;
    while !connection.is_live() {
        if Instant::now() >= deadline {
            warn!(
                timeout_secs = limit.as_secs(),
                "broker event stream not connected; tool calls will fail until it is"
            );
            return;
        }
        tokio::time::sleep(LIVE_POLL_INTERVAL).await;
    }
    debug!("broker event stream connected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entries(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn splits_path_from_overrides() {
        let (path, overrides) = parse_config_entries(&entries(&[
            "relay.toml",
            "limits.tool_cooldown_ms = 500",
            "other.toml",
        ]));

        assert_eq!(path, Some(PathBuf::from("relay.toml")));
        assert_eq!(
            overrides,
            vec![("limits.tool_cooldown_ms".to_string(), "500".to_string())]
        );
    }

    #[test]
    fn override_without_key_is_skipped() {
        let (path, overrides) = parse_config_entries(&entries(&["=5"]));
        assert_eq!(path, None);
        assert!(overrides.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_model_settings_fail_before_the_broker_is_contacted() {
        let mut config = RelayConfig::default();
        config.llm.model = String::new();

        let started = Instant::now();
        let outcome = Runtime::start(config).await;

        let Err(error) = outcome else {
            panic!("start must fail on an empty model name");
        };
        assert!(format!("{error:#}").contains("decision model"), "{error:#}");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn override_values_parse_as_toml_or_string() {
        assert_eq!(parse_override_value("500"), toml::Value::Integer(500));
        assert_eq!(parse_override_value("true"), toml::Value::Boolean(true));
        assert_eq!(
            parse_override_value("\"quoted\""),
            toml::Value::String("quoted".to_string())
        );
        assert_eq!(
            parse_override_value("slack"),
            toml::Value::String("slack".to_string())
        );
    }

    #[test]
    fn overrides_apply_on_top_of_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[limits]\ntool_cooldown_ms = 2000\n").expect("write config");

        let config = load_config(&[
            path.display().to_string(),
            "limits.tool_cooldown_ms=750".to_string(),
            "broker.target=github".to_string(),
        ])
        .expect("config loads");

        assert_eq!(config.limits.tool_cooldown_ms, 750);
        assert_eq!(config.broker.target, "github");
    }
}
