//! CouchDB backend and provisioning client against a mock HTTP server.

mod common;

use common::test_store;
use provisioning_broker::cache::Collection;
use provisioning_broker::clock::ManualClock;
use provisioning_broker::config::{BrokerConfig, CouchDbConfig, ProvisioningConfig};
use provisioning_broker::deployment::{
    HttpProvisioningClient, OperationStatus, ProvisioningError, ProvisioningService,
};
use provisioning_broker::error::BrokerError;
use provisioning_broker::resilience::CircuitState;
use provisioning_broker::store::{BackendError, CouchDbBackend, Document, DocumentBackend};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn couchdb(server: &MockServer) -> CouchDbBackend {
    CouchDbBackend::new(&CouchDbConfig {
        url: server.uri(),
        ..CouchDbConfig::default()
    })
    .unwrap()
}

fn provisioner(server: &MockServer, token: Option<&str>) -> HttpProvisioningClient {
    HttpProvisioningClient::new(&ProvisioningConfig {
        base_url: server.uri(),
        api_token: token.map(str::to_string),
        ..ProvisioningConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_same_id_in_two_collections_is_two_documents() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/broker/users:alice"))
        .and(body_partial_json(json!({"_id": "users:alice", "type": "users"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": "users:alice", "rev": "1-u"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/broker/chats:alice"))
        .and(body_partial_json(json!({"_id": "chats:alice", "type": "chats"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": "chats:alice", "rev": "1-c"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = couchdb(&server);
    let user_rev = backend
        .save(Collection::Users, &Document::new("alice"))
        .await
        .unwrap();
    let chat_rev = backend
        .save(Collection::Chats, &Document::new("alice"))
        .await
        .unwrap();

    assert_eq!(user_rev, "1-u");
    assert_eq!(chat_rev, "1-c");
}

#[tokio::test]
async fn test_get_strips_namespace_and_type_tag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broker/users:alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "users:alice",
            "_rev": "2-abc",
            "type": "users",
            "email": "alice@example.com"
        })))
        .mount(&server)
        .await;

    let document = couchdb(&server).get(Collection::Users, "alice").await.unwrap();

    assert_eq!(document.id, "alice");
    assert_eq!(document.revision.as_deref(), Some("2-abc"));
    assert_eq!(document.get("type"), None);
    assert_eq!(document.get_str("email"), Some("alice@example.com"));
}

#[tokio::test]
async fn test_list_all_reads_the_collection_key_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broker/_all_docs"))
        .and(query_param("include_docs", "true"))
        .and(query_param("startkey", "\"agents:\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_rows": 2,
            "rows": [
                {"id": "agents:a1", "doc": {"_id": "agents:a1", "_rev": "1-x", "type": "agents"}},
                {"id": "agents:a2", "doc": {"_id": "agents:a2", "_rev": "1-y", "type": "agents"}}
            ]
        })))
        .mount(&server)
        .await;

    let documents = couchdb(&server).list_all(Collection::Agents).await.unwrap();
    let ids: Vec<_> = documents.iter().map(|d| d.id.as_str()).collect();

    assert_eq!(ids, ["a1", "a2"]);
}

#[tokio::test]
async fn test_status_codes_map_to_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broker/users:ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not_found"})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/broker/users:alice"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"error": "conflict"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broker/users:bob"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broker/users:carol"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad_request"))
        .mount(&server)
        .await;

    let backend = couchdb(&server);

    let missing = backend.get(Collection::Users, "ghost").await.unwrap_err();
    assert_eq!(missing, BackendError::not_found(Collection::Users, "ghost"));
    assert!(!missing.counts_against_breaker());

    let conflict = backend
        .save(Collection::Users, &Document::new("alice").with_revision("1-stale"))
        .await
        .unwrap_err();
    assert_eq!(conflict, BackendError::conflict(Collection::Users, "alice"));
    assert!(!conflict.counts_against_breaker());

    let down = backend.get(Collection::Users, "bob").await.unwrap_err();
    assert!(matches!(down, BackendError::Unavailable(ref msg) if msg.contains("503")));
    assert!(down.counts_against_breaker());

    let rejected = backend.get(Collection::Users, "carol").await.unwrap_err();
    assert!(matches!(rejected, BackendError::Other(ref msg) if msg.contains("400")));
}

#[tokio::test]
async fn test_server_errors_open_the_breaker_through_the_facade() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(5)
        .mount(&server)
        .await;

    let store = test_store(
        &BrokerConfig::for_test(),
        Arc::new(couchdb(&server)),
        Arc::new(ManualClock::new()),
    );

    for _ in 0..5 {
        let err = store.get(Collection::Agents, "a1").await.unwrap_err();
        assert!(matches!(err, BrokerError::Backend(BackendError::Unavailable(_))));
    }
    assert_eq!(store.breaker().state(), CircuitState::Open);

    // Rejected locally; the server sees no sixth request
    let err = store.get(Collection::Agents, "a1").await.unwrap_err();
    assert!(matches!(err, BrokerError::BreakerOpen(_)));
}

#[tokio::test]
async fn test_ping_probes_server_root() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"couchdb": "Welcome"})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(couchdb(&server).ping().await.is_ok());
}

#[tokio::test]
async fn test_provisioning_status_is_fetched_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "RUNNING"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "deploying"})))
        .mount(&server)
        .await;

    let client = provisioner(&server, Some("secret-token"));

    assert_eq!(client.operation_status("op-1").await.unwrap(), OperationStatus::Ready);
    assert_eq!(
        client.operation_status("op-2").await.unwrap(),
        OperationStatus::InProgress("deploying".to_string())
    );
}

#[tokio::test]
async fn test_provisioning_failures_map_to_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/operations/op-busy"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op-garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = provisioner(&server, None);

    assert_eq!(
        client.operation_status("op-busy").await.unwrap_err(),
        ProvisioningError::Status {
            status: 502,
            body: "bad gateway".to_string()
        }
    );
    assert!(matches!(
        client.operation_status("op-garbled").await.unwrap_err(),
        ProvisioningError::InvalidResponse(_)
    ));
}
