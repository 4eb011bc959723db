//! Integration tests for inbound validation and on-behalf-of exchange
//!
//! These run the real provider and cache against a mock token endpoint:
//! - concurrent misses share one exchange
//! - consent errors are surfaced without a retry
//! - an unavailable provider is retried exactly once
//! - tokens inside the safety margin are never handed out

use assert_matches::assert_matches;
use chrono::Utc;
use oboe_auth::{AuthError, IdentityProvider, OboIdentityProvider, TokenCache};
use oboe_common::CacheConfig;
use oboe_tests::common::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_test::traced_test;
use wiremock::{MockServer, ResponseTemplate};

fn provider(idp: &MockServer) -> Arc<OboIdentityProvider> {
    let config = broker_config(idp, Vec::new());
    Arc::new(OboIdentityProvider::new(config.identity).expect("provider"))
}

#[tokio::test]
async fn test_authenticate_builds_principal() {
    let idp = MockServer::start().await;
    let principal = provider(&idp)
        .authenticate(&mint_token("alice"))
        .await
        .unwrap();

    assert_eq!(principal.subject_id, "alice");
    assert_eq!(principal.tenant_id, TENANT);
    assert_eq!(principal.canonical_id(), "alice@contoso");
    assert!(!format!("{:?}", principal).contains(principal.raw_token()));
}

#[tokio::test]
async fn test_expired_and_foreign_tokens_rejected() {
    let idp = MockServer::start().await;
    let provider = provider(&idp);

    let expired = provider.authenticate(&mint_expired_token("alice")).await;
    assert_matches!(expired, Err(AuthError::InvalidToken(ref m)) if m == "token expired");

    let foreign = provider.authenticate(&mint_foreign_token("alice")).await;
    assert_matches!(foreign, Err(AuthError::InvalidToken(ref m)) if m == "issuer not accepted");

    let garbage = provider.authenticate("not-a-jwt").await;
    assert_matches!(garbage, Err(AuthError::InvalidToken(_)));
}

#[tokio::test]
async fn test_concurrent_misses_share_one_exchange() {
    setup_test_logging();
    let idp = MockServer::start().await;
    exchange_mock(
        GRAPH_FRAGMENT,
        token_response("graph-token", 3600).set_delay(Duration::from_millis(200)),
    )
    .expect(1)
    .mount(&idp)
    .await;

    let provider = provider(&idp);
    let principal = provider.authenticate(&mint_token("alice")).await.unwrap();
    let cache = Arc::new(TokenCache::new(provider, &CacheConfig::default()));
    let graph = graph_scope();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let principal = principal.clone();
            let graph = graph.clone();
            tokio::spawn(async move { cache.get(&principal, &graph).await })
        })
        .collect();

    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token.value(), "graph-token");
    }

    // Served from cache now
    let again = cache.get(&principal, &graph).await.unwrap();
    assert_eq!(again.value(), "graph-token");
    idp.verify().await;
}

#[tokio::test]
async fn test_cached_token_outlives_safety_margin() {
    let idp = MockServer::start().await;
    exchange_mock(GRAPH_FRAGMENT, token_response("graph-token", 3600))
        .expect(1)
        .mount(&idp)
        .await;

    let provider = provider(&idp);
    let principal = provider.authenticate(&mint_token("alice")).await.unwrap();
    let config = CacheConfig::default();
    let cache = TokenCache::new(provider, &config);

    let token = cache.get(&principal, &graph_scope()).await.unwrap();
    let remaining = token.usable_for(Utc::now(), config.safety_margin).unwrap();
    assert!(remaining > Duration::from_secs(3000));
    assert_eq!(token.granted_scope.as_deref(), Some("User.Read Mail.Send"));
}

#[tokio::test]
async fn test_short_lived_token_is_never_returned() {
    let idp = MockServer::start().await;
    exchange_mock(GRAPH_FRAGMENT, token_response("graph-token", 120))
        .mount(&idp)
        .await;

    let provider = provider(&idp);
    let principal = provider.authenticate(&mint_token("alice")).await.unwrap();
    let cache = TokenCache::new(provider, &CacheConfig::default());

    let result = cache.get(&principal, &graph_scope()).await;
    assert_matches!(result, Err(AuthError::ProviderUnavailable(_)));
    assert!(!cache.contains(&principal, &graph_scope()).await);
}

#[tokio::test]
async fn test_consent_error_is_not_retried() {
    let idp = MockServer::start().await;
    exchange_mock(EMPTY_API_FRAGMENT, consent_required_response())
        .expect(1)
        .mount(&idp)
        .await;

    let token = mint_token("alice");
    let result = provider(&idp).exchange(&token, &empty_api_scope()).await;

    assert_matches!(result, Err(AuthError::ConsentRequired { ref scope, ref message }) => {
        assert_eq!(scope, "emptyapi");
        assert!(message.contains("AADSTS65001"));
    });
    idp.verify().await;
}

#[tokio::test]
#[traced_test]
async fn test_unavailable_provider_is_retried_once() {
    let idp = MockServer::start().await;
    exchange_mock(GRAPH_FRAGMENT, ResponseTemplate::new(503))
        .expect(2)
        .mount(&idp)
        .await;

    let token = mint_token("alice");
    let result = provider(&idp).exchange(&token, &graph_scope()).await;

    assert_matches!(result, Err(AuthError::ProviderUnavailable(_)));
    assert!(logs_contain("Token exchange failed, retrying"));
    idp.verify().await;
}

#[tokio::test]
async fn test_rejected_assertion_is_invalid_token() {
    let idp = MockServer::start().await;
    exchange_mock(
        GRAPH_FRAGMENT,
        ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "AADSTS50013: Assertion failed signature validation.",
            "error_codes": [50013],
        })),
    )
    .expect(1)
    .mount(&idp)
    .await;

    let result = provider(&idp)
        .exchange(&mint_token("alice"), &graph_scope())
        .await;
    let err = tokio_test::assert_err!(result);
    assert!(!err.is_retryable());
    assert_matches!(err, AuthError::InvalidToken(ref m) if m.contains("AADSTS50013"));
}

#[tokio::test]
async fn test_sign_out_forces_new_exchange() {
    let idp = MockServer::start().await;
    exchange_mock(GRAPH_FRAGMENT, token_response("graph-token", 3600))
        .expect(2)
        .mount(&idp)
        .await;

    let provider = provider(&idp);
    let alice = provider.authenticate(&mint_token("alice")).await.unwrap();
    let cache = TokenCache::new(provider, &CacheConfig::default());
    let graph = graph_scope();

    tokio_test::assert_ok!(cache.get(&alice, &graph).await);
    tokio_test::assert_ok!(cache.get(&alice, &graph).await);

    cache.invalidate_subject("alice").await;
    assert!(!cache.contains(&alice, &graph).await);

    tokio_test::assert_ok!(cache.get(&alice, &graph).await);
    idp.verify().await;
}

#[tokio::test]
async fn test_exchange_refuses_unvalidated_assertion() {
    let idp = MockServer::start().await;
    exchange_mock(GRAPH_FRAGMENT, token_response("graph-token", 3600))
        .expect(0)
        .mount(&idp)
        .await;
    let provider = provider(&idp);

    let garbage = provider.exchange("not-a-jwt-at-all", &graph_scope()).await;
    assert_matches!(garbage, Err(AuthError::InvalidToken(_)));

    let foreign = provider
        .exchange(&mint_foreign_token("alice"), &graph_scope())
        .await;
    assert_matches!(foreign, Err(AuthError::InvalidToken(ref m)) if m == "issuer not accepted");

    idp.verify().await;
}
