//! Integration tests for consent storage through the broker

use assert_matches::assert_matches;
use oboe_auth::ConsentStatus;
use oboe_common::{ConsentConfig, ConsentStoreKind};
use oboe_core::{Broker, BrokerError};
use oboe_tests::common::*;
use tempfile::TempDir;
use wiremock::MockServer;

fn sqlite_consent(dir: &TempDir) -> ConsentConfig {
    ConsentConfig {
        store: ConsentStoreKind::Sqlite,
        database_url: Some(format!("sqlite://{}", dir.path().join("consent.db").display())),
    }
}

#[tokio::test]
async fn test_consent_survives_restart() {
    setup_test_logging();
    let idp = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = broker_config(&idp, Vec::new());
    config.consent = sqlite_consent(&dir);

    let broker = Broker::start(config.clone()).await.unwrap();
    broker.grant_consent("alice", "graph").await.unwrap();
    broker.grant_consent("alice", "emptyapi").await.unwrap();
    broker.revoke_consent("alice", "emptyapi").await.unwrap();
    broker.shutdown().await.unwrap();
    drop(broker);

    let broker = Broker::start(config).await.unwrap();
    let gate = broker.consent();
    assert_eq!(
        gate.check("alice", &graph_scope()).await.unwrap(),
        ConsentStatus::Granted
    );
    assert_eq!(
        gate.check("alice", &empty_api_scope()).await.unwrap(),
        ConsentStatus::NotGranted
    );
    assert_eq!(
        gate.check("bob", &graph_scope()).await.unwrap(),
        ConsentStatus::NotGranted
    );

    let records = gate.records("alice").await.unwrap();
    assert_eq!(records.len(), 2);
    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_grant_is_idempotent() {
    let idp = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = broker_config(&idp, Vec::new());
    config.consent = sqlite_consent(&dir);
    let broker = Broker::start(config).await.unwrap();

    let first = broker.grant_consent("alice", "graph").await.unwrap();
    let second = broker.grant_consent("alice", "graph").await.unwrap();

    assert_eq!((first.subject_id.as_str(), first.scope.as_str()), ("alice", "graph"));
    assert_eq!(
        first.updated_at.timestamp_millis(),
        second.updated_at.timestamp_millis()
    );
    assert_eq!(broker.consent().records("alice").await.unwrap(), vec![second]);
}

#[tokio::test]
async fn test_revoke_drops_cached_tokens() {
    let idp = MockServer::start().await;
    exchange_mock(GRAPH_FRAGMENT, token_response("graph-token", 3600))
        .expect(2)
        .mount(&idp)
        .await;

    let broker = Broker::start(broker_config(&idp, Vec::new())).await.unwrap();
    let alice = broker
        .identity()
        .authenticate(&mint_token("alice"))
        .await
        .unwrap();
    let graph = graph_scope();

    broker.grant_consent("alice", "graph").await.unwrap();
    broker.tokens().get(&alice, &graph).await.unwrap();
    assert!(broker.tokens().contains(&alice, &graph).await);

    broker.revoke_consent("alice", "graph").await.unwrap();
    assert!(!broker.tokens().contains(&alice, &graph).await);

    broker.grant_consent("alice", "graph").await.unwrap();
    broker.tokens().get(&alice, &graph).await.unwrap();
    idp.verify().await;
}

#[tokio::test]
async fn test_unknown_scope_is_a_configuration_error() {
    let idp = MockServer::start().await;
    let broker = Broker::start(broker_config(&idp, Vec::new())).await.unwrap();

    let result = broker.grant_consent("alice", "sharepoint").await;
    assert_matches!(result, Err(BrokerError::Config(_)));
}
