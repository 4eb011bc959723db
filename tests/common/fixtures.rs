//! Mock identity provider, tool servers and broker configuration

use super::{AUDIENCE, CLIENT_ID, ISSUER, SHARED_SECRET, TENANT};
use oboe_common::{
    BrokerConfig, CacheConfig, ConsentConfig, ConsentStoreKind, IdentityConfig, RegistryConfig,
    ResourceScope, ToolServerConfig, TurnConfig,
};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fragment of the form-encoded exchange body that identifies the graph resource
pub const GRAPH_FRAGMENT: &str = "graph.example";

/// Fragment of the form-encoded exchange body that identifies the empty API
pub const EMPTY_API_FRAGMENT: &str = "empty-api";

pub fn graph_scope() -> ResourceScope {
    ResourceScope::new("graph", "https://graph.example", ["User.Read", "Mail.Send"])
        .with_display_name("Microsoft Graph")
}

pub fn empty_api_scope() -> ResourceScope {
    ResourceScope::new("emptyapi", "api://empty-api", ["access_as_user"]).with_display_name("Empty API")
}

fn url(raw: String) -> Url {
    Url::parse(&raw).expect("Invalid mock server URL")
}

/// Broker configuration pointing at `idp`, with an in-memory consent store
/// and short backoffs
pub fn broker_config(idp: &MockServer, tool_servers: Vec<ToolServerConfig>) -> BrokerConfig {
    let mut identity = IdentityConfig::new(TENANT, CLIENT_ID, url(format!("{}/token", idp.uri())));
    identity.client_secret = Some("client-secret".to_string());
    identity.shared_secret = Some(SHARED_SECRET.to_string());
    identity.issuers = vec![ISSUER.to_string()];
    identity.audiences = vec![AUDIENCE.to_string()];
    identity.retry_backoff = Duration::from_millis(10);

    BrokerConfig {
        identity,
        resources: vec![graph_scope(), empty_api_scope()],
        tool_servers,
        profile: None,
        cache: CacheConfig::default(),
        consent: ConsentConfig {
            store: ConsentStoreKind::Memory,
            database_url: None,
        },
        registry: RegistryConfig::default(),
        turn: TurnConfig {
            retry_backoff: Duration::from_millis(10),
            ..TurnConfig::default()
        },
    }
}

/// Successful exchange response
pub fn token_response(access_token: &str, expires_in: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "scope": "User.Read Mail.Send",
    }))
}

/// The provider's "user has not consented" error
pub fn consent_required_response() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "error": "invalid_grant",
        "error_description": "AADSTS65001: The user or administrator has not consented to use the application.",
        "error_codes": [65001],
        "suberror": "consent_required",
    }))
}

/// Exchange mock for the resource identified by `fragment`
pub fn exchange_mock(fragment: &str, response: ResponseTemplate) -> Mock {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("requested_token_use=on_behalf_of"))
        .and(body_string_contains(fragment))
        .respond_with(response)
}

/// Tool server `name` hosted on `tools`, manifest at `/{name}/manifest`
/// and invocations at `/{name}/rpc`
pub fn tool_server(tools: &MockServer, name: &str, scope: &str) -> ToolServerConfig {
    ToolServerConfig {
        name: name.to_string(),
        manifest_url: url(format!("{}/{}/manifest", tools.uri(), name)),
        invoke_url: Some(url(format!("{}/{}/rpc", tools.uri(), name))),
        scope: scope.to_string(),
    }
}

/// Serve a manifest listing `entries` for server `name`
pub async fn mount_manifest(tools: &MockServer, name: &str, entries: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/{}/manifest", name)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tools": entries })))
        .mount(tools)
        .await;
}

/// A manifest entry taking a single required string argument `arg`
pub fn tool_entry(name: &str, arg: &str) -> Value {
    json!({
        "name": name,
        "description": format!("{} tool", name),
        "inputSchema": {
            "type": "object",
            "properties": { arg: { "type": "string" } },
            "required": [arg],
        },
    })
}

/// JSON-RPC success carrying one text item
pub fn rpc_text(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": { "content": [{ "type": "text", "text": text }] },
    }))
}
