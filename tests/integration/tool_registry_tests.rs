//! Integration tests for tool discovery and invocation over HTTP
//!
//! These tests verify that the registry and invoker can:
//! - Build a catalog when some servers are down
//! - Refuse catalogs with cross-server name collisions
//! - Reject malformed manifest entries individually
//! - Stop bad arguments and hung servers without unbounded waits

use assert_matches::assert_matches;
use oboe_common::{RegistryConfig, ToolServerConfig};
use oboe_core::{Broker, BrokerError};
use oboe_tests::common::*;
use oboe_tools::{
    HttpManifestSource, HttpToolInvoker, InvocationError, ToolError, ToolInvoker, ToolRegistry,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn registry(servers: Vec<ToolServerConfig>) -> ToolRegistry {
    let source = Arc::new(HttpManifestSource::new(Duration::from_secs(5)).unwrap());
    ToolRegistry::new(
        servers,
        ["graph".to_string(), "emptyapi".to_string()],
        source,
        &RegistryConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_unreachable_server_is_excluded() {
    setup_test_logging();
    let tools = MockServer::start().await;
    mount_manifest(&tools, "mail", json!([tool_entry("send_mail", "to")])).await;
    mount_manifest(&tools, "calendar", json!([tool_entry("list_events", "day")])).await;
    Mock::given(method("GET"))
        .and(path("/files/manifest"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&tools)
        .await;

    let registry = registry(vec![
        tool_server(&tools, "mail", "graph"),
        tool_server(&tools, "calendar", "graph"),
        tool_server(&tools, "files", "emptyapi"),
    ]);
    let report = registry.refresh().await.unwrap();

    assert!(report.is_partial());
    assert_eq!(report.loaded, vec!["mail".to_string(), "calendar".to_string()]);
    assert_eq!(report.unreachable.len(), 1);
    assert_eq!(report.unreachable[0].0, "files");
    assert_eq!(report.tool_count, 2);

    let catalog = registry.catalog();
    assert!(catalog.get("send_mail").is_some());
    assert!(catalog.get("list_events").is_some());
    assert_eq!(registry.counts_by_server().get("files"), None);
}

#[tokio::test]
async fn test_name_collision_fails_refresh() {
    let tools = MockServer::start().await;
    mount_manifest(&tools, "mail", json!([tool_entry("search", "query")])).await;
    mount_manifest(&tools, "files", json!([tool_entry("search", "query")])).await;

    let servers = vec![
        tool_server(&tools, "mail", "graph"),
        tool_server(&tools, "files", "emptyapi"),
    ];

    let result = registry(servers.clone()).refresh().await;
    assert_matches!(result, Err(ToolError::NameCollision { ref name, ref first, ref second }) => {
        assert_eq!(name, "search");
        assert_eq!(first, "mail");
        assert_eq!(second, "files");
    });

    let idp = MockServer::start().await;
    let started = Broker::start(broker_config(&idp, servers)).await;
    assert_matches!(started, Err(BrokerError::Tools(ToolError::NameCollision { .. })));
}

#[tokio::test]
async fn test_malformed_entries_are_rejected_individually() {
    let tools = MockServer::start().await;
    mount_manifest(
        &tools,
        "mail",
        json!([
            tool_entry("send_mail", "to"),
            {"name": "send mail!", "description": "bad name"},
            {"name": "bad_schema", "inputSchema": {"type": "string"}},
            {"name": "elsewhere", "scope": "sharepoint"},
            {"name": "ping"},
        ]),
    )
    .await;

    let registry = registry(vec![tool_server(&tools, "mail", "graph")]);
    let report = registry.refresh().await.unwrap();

    let rejected: Vec<&str> = report.rejected.iter().map(|r| r.tool.as_str()).collect();
    assert_eq!(rejected, vec!["send mail!", "bad_schema", "elsewhere"]);
    assert_eq!(report.tool_count, 2);

    let catalog = registry.catalog();
    let ping = catalog.get("ping").unwrap();
    assert_eq!(ping.input.schema_json(), json!({"type": "object", "properties": {}}));
    assert_eq!(ping.endpoint.path(), "/mail/rpc");
}

#[tokio::test]
async fn test_unchanged_refresh_keeps_catalog() {
    let tools = MockServer::start().await;
    mount_manifest(&tools, "mail", json!([tool_entry("send_mail", "to")])).await;

    let registry = registry(vec![tool_server(&tools, "mail", "graph")]);
    let first = registry.refresh().await.unwrap();
    let before = registry.catalog();
    let second = registry.refresh().await.unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    assert!(Arc::ptr_eq(&before, &registry.catalog()));
    assert_eq!(before.fingerprint(), registry.catalog().fingerprint());
}

#[tokio::test]
async fn test_schema_mismatch_makes_no_network_call() {
    let tools = MockServer::start().await;
    mount_manifest(&tools, "mail", json!([tool_entry("send_mail", "to")])).await;
    Mock::given(method("POST"))
        .and(path("/mail/rpc"))
        .respond_with(rpc_text("sent"))
        .expect(0)
        .mount(&tools)
        .await;

    let registry = registry(vec![tool_server(&tools, "mail", "graph")]);
    registry.refresh().await.unwrap();
    let send_mail = registry.catalog().get("send_mail").cloned().unwrap();

    let invoker = HttpToolInvoker::new(reqwest::Client::new(), Duration::from_secs(5));
    let result = invoker
        .invoke(&send_mail, &json!({"to": 42}), "graph-token")
        .await;

    assert_matches!(result, Err(InvocationError::SchemaMismatch(ref errors)) if !errors.is_empty());
    tools.verify().await;
}

#[tokio::test]
async fn test_invocation_carries_delegated_token() {
    let tools = MockServer::start().await;
    mount_manifest(&tools, "mail", json!([tool_entry("send_mail", "to")])).await;
    Mock::given(method("POST"))
        .and(path("/mail/rpc"))
        .and(header("authorization", "Bearer graph-token"))
        .respond_with(rpc_text("sent"))
        .expect(1)
        .mount(&tools)
        .await;

    let registry = registry(vec![tool_server(&tools, "mail", "graph")]);
    registry.refresh().await.unwrap();
    let send_mail = registry.catalog().get("send_mail").cloned().unwrap();

    let invoker = HttpToolInvoker::new(reqwest::Client::new(), Duration::from_secs(5));
    let result = invoker
        .invoke(&send_mail, &json!({"to": "bob@contoso.example"}), "graph-token")
        .await
        .unwrap();

    assert_eq!(result.text(), "sent");
    assert!(!result.is_error);
}

#[tokio::test]
async fn test_hung_server_times_out() {
    let tools = MockServer::start().await;
    mount_manifest(&tools, "mail", json!([tool_entry("send_mail", "to")])).await;
    Mock::given(method("POST"))
        .and(path("/mail/rpc"))
        .respond_with(rpc_text("late").set_delay(Duration::from_secs(10)))
        .mount(&tools)
        .await;

    let registry = registry(vec![tool_server(&tools, "mail", "graph")]);
    registry.refresh().await.unwrap();
    let send_mail = registry.catalog().get("send_mail").cloned().unwrap();

    let timeout = Duration::from_millis(300);
    let invoker = HttpToolInvoker::new(reqwest::Client::new(), timeout);
    let started = Instant::now();
    let result = invoker
        .invoke(&send_mail, &json!({"to": "bob"}), "graph-token")
        .await;
    let elapsed = started.elapsed();

    assert_matches!(result, Err(InvocationError::Timeout(t)) if t == timeout);
    assert!(elapsed >= timeout);
    assert!(elapsed < Duration::from_secs(5));
}
