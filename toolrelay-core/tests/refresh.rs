mod common;

use common::{Script, ScriptedConnection, attached_gateway, gateway, text_result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use toolrelay_core::cache::{
    CacheRefresher, CapabilityCache, DestinationCache, DestinationRefresher, RefreshError,
    ToolCatalogRefresher, ToolDefinition, eager_load,
};
use toolrelay_core::gateway::{ConnectionError, GatewayError};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn destinations_load_from_listing_tool() {
    let connection = ScriptedConnection::new([Script::Inline(text_result(
        "ID,Name,Topic\nC1,general,company news\nC2,random",
    ))]);
    let gateway = attached_gateway(&connection, TIMEOUT);
    let cache = Arc::new(DestinationCache::new("ID,"));
    let refresher = DestinationRefresher::new(gateway, Arc::clone(&cache), "channels_list");

    assert_eq!(eager_load(&refresher).await, Some(2));

    assert_eq!(cache.get("C1").and_then(|d| d.name), Some("general".to_string()));
    assert_eq!(
        cache.get("C2").map(|d| d.field("Topic").is_none()),
        Some(true)
    );
    let submissions = connection.submissions();
    assert_eq!(submissions.first().map(|s| s.tool.as_str()), Some("channels_list"));
    assert!(submissions.first().is_some_and(|s| s.input.is_empty()));
}

#[tokio::test]
async fn destination_listing_delivered_later_is_applied() {
    let connection = ScriptedConnection::new([Script::Pending("list-1".to_string())]);
    let gateway = attached_gateway(&connection, TIMEOUT);
    let cache = Arc::new(DestinationCache::new("ID,"));
    let refresher = Arc::new(DestinationRefresher::new(
        gateway,
        Arc::clone(&cache),
        "channels_list",
    ));

    let task = tokio::spawn({
        let refresher = Arc::clone(&refresher);
        async move { refresher.refresh().await }
    });
    connection.wait_for_submissions(1).await;
    connection.emit_result("list-1", json!("ID,Name\nC9,ops"));

    assert_eq!(task.await.expect("joins").ok(), Some(1));
    assert!(cache.contains("C9"));
}

#[tokio::test]
async fn non_tabular_listing_keeps_previous_destinations() {
    let connection = ScriptedConnection::new([
        Script::Inline(json!("ID,Name\nC1,general")),
        Script::Inline(text_result("rate limited by upstream")),
        Script::Inline(json!("")),
    ]);
    let gateway = attached_gateway(&connection, TIMEOUT);
    let cache = Arc::new(DestinationCache::new("ID,"));
    let refresher = DestinationRefresher::new(gateway, Arc::clone(&cache), "channels_list");

    assert_eq!(eager_load(&refresher).await, Some(1));
    assert_eq!(eager_load(&refresher).await, Some(1));
    assert_eq!(eager_load(&refresher).await, Some(1));
    assert!(cache.contains("C1"));
}

#[tokio::test]
async fn failed_destination_load_leaves_cache_empty() {
    let gateway = gateway(TIMEOUT);
    let cache = Arc::new(DestinationCache::new("ID,"));
    let refresher = DestinationRefresher::new(gateway, Arc::clone(&cache), "channels_list");

    assert!(matches!(
        refresher.refresh().await,
        Err(RefreshError::Gateway(GatewayError::ConnectionUnavailable))
    ));
    assert_eq!(eager_load(&refresher).await, None);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn tool_catalogue_merges_discovered_over_static() {
    let connection = ScriptedConnection::new([]);
    connection.set_tool_list(Ok(json!({
        "tools": [
            {"name": "search", "description": "Search messages"},
            {"name": "channels_list", "inputSchema": {"properties": {"limit": {}}}}
        ]
    })));
    let gateway = attached_gateway(&connection, TIMEOUT);
    let cache = Arc::new(CapabilityCache::new(vec![
        ToolDefinition::new("search").with_description("configured"),
        ToolDefinition::new("echo"),
    ]));
    let refresher = ToolCatalogRefresher::new(gateway, Arc::clone(&cache));

    assert_eq!(eager_load(&refresher).await, Some(3));
    assert_eq!(
        cache.get("search").and_then(|t| t.description),
        Some("Search messages".to_string())
    );
    assert!(cache.get("channels_list").is_some_and(|t| t.accepts("limit")));
    assert!(cache.contains("echo"));
}

#[tokio::test]
async fn malformed_tool_list_keeps_catalogue() {
    let connection = ScriptedConnection::new([]);
    connection.set_tool_list(Ok(json!({"tools": [{"name": "search"}]})));
    let gateway = attached_gateway(&connection, TIMEOUT);
    let cache = Arc::new(CapabilityCache::new(Vec::new()));
    let refresher = ToolCatalogRefresher::new(gateway, Arc::clone(&cache));
    assert_eq!(eager_load(&refresher).await, Some(1));

    connection.set_tool_list(Ok(json!("oops")));
    assert!(matches!(refresher.refresh().await, Err(RefreshError::Data(_))));

    connection.set_tool_list(Err(ConnectionError::Closed));
    assert!(matches!(
        refresher.refresh().await,
        Err(RefreshError::Gateway(GatewayError::Remote(ConnectionError::Closed)))
    ));
    assert!(cache.contains("search"));
}
