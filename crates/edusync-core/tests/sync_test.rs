#![allow(clippy::unwrap_used)]
// End-to-end tests for `SyncClient` against a wiremock backend: cached
// reads with deduplication, mutations with invalidation, store refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use edusync_core::{CollectionKind, QueryOptions, SyncClient, SyncConfig, SyncError, WriteVerb};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, SyncClient) {
    let server = MockServer::start().await;
    let config = SyncConfig {
        base_url: Url::parse(&server.uri()).unwrap(),
        refresh_interval_secs: 0,
        ..SyncConfig::default()
    };
    (server, SyncClient::new(config).unwrap())
}

fn student_body() -> serde_json::Value {
    json!([{
        "id": "s-1",
        "userId": "u-7",
        "schoolId": "sch-1",
        "rollNumber": "R-042",
        "class": "10",
        "section": "B",
        "admissionDate": "2023-06-01",
        "status": "active"
    }])
}

async fn mock_empty_collections(server: &MockServer) {
    for kind in CollectionKind::ALL {
        Mock::given(method("GET"))
            .and(path(kind.path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
    }
}

// ── Cached reads ────────────────────────────────────────────────────

#[tokio::test]
async fn test_back_to_back_queries_issue_one_network_call() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/students"))
        .respond_with(ResponseTemplate::new(200).set_body_json(student_body()))
        .expect(1)
        .mount(&server)
        .await;

    let options = QueryOptions::default();
    let (a, b) = tokio::join!(
        client.query("/students", &options),
        client.query("/students", &options),
    );

    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();
    assert_eq!(*a, *b);
    // Mock expectation (exactly 1 request) is verified on server drop.
}

#[tokio::test]
async fn test_query_hits_cache_after_first_fetch() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "c-1" }])))
        .expect(1)
        .mount(&server)
        .await;

    let options = QueryOptions::default();
    client.query("/courses", &options).await.unwrap();
    let again = client.query("/courses", &options).await.unwrap().unwrap();
    assert_eq!(again[0]["id"], "c-1");
}

// ── Mutations ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_successful_mutation_invalidates_declared_keys() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/students"))
        .respond_with(ResponseTemplate::new(200).set_body_json(student_body()))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/students"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "s-2" })))
        .expect(1)
        .mount(&server)
        .await;

    let options = QueryOptions::default();
    client.query("/students", &options).await.unwrap();
    assert!(client.cache().cached("/students").is_some());

    let mutation = client.mutation("/students").invalidates(["/students"]);
    let created = mutation.mutate(&json!({ "name": "A" })).await.unwrap();
    assert_eq!(created["id"], "s-2");

    assert!(
        client.cache().cached("/students").is_none(),
        "mutation must invalidate the declared key"
    );

    // Next query is a real fetch (second GET on the mock).
    client.query("/students", &options).await.unwrap();
}

#[tokio::test]
async fn test_failed_mutation_invalidates_nothing_and_reraises() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/students"))
        .respond_with(ResponseTemplate::new(200).set_body_json(student_body()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/students"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": "Roll number already taken",
            "type": "validation_error"
        })))
        .mount(&server)
        .await;

    let options = QueryOptions::default();
    client.query("/students", &options).await.unwrap();

    let error_seen = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&error_seen);
    let mutation = client
        .mutation("/students")
        .invalidates(["/students"])
        .on_error(move |_| {
            flag.store(true, Ordering::SeqCst);
        });

    let result = mutation.mutate(&json!({ "name": "A" })).await;

    assert!(matches!(result, Err(SyncError::RequestFailed { status: 422, .. })));
    assert!(error_seen.load(Ordering::SeqCst), "on_error callback must fire");
    assert!(
        client.cache().cached("/students").is_some(),
        "failed mutation must not invalidate"
    );
}

#[tokio::test]
async fn test_delete_mutation_settles_as_null() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/announcements/a-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mutation = client.mutation("/announcements/a-1").verb(WriteVerb::Delete);
    let result = mutation.mutate(&json!({})).await.unwrap();
    assert!(result.is_null());
    assert!(!mutation.is_loading());
}

// ── Store refresh ───────────────────────────────────────────────────

#[tokio::test]
async fn test_refresh_populates_typed_collection() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/students"))
        .respond_with(ResponseTemplate::new(200).set_body_json(student_body()))
        .mount(&server)
        .await;

    client.refresh(CollectionKind::Students).await.unwrap();

    let students = client.store().students().snapshot();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].roll_number, "R-042");
    assert!(!client.store().is_loading());
    assert!(client.store().last_error().is_none());
    assert!(client.store().last_refresh().is_some());
}

#[tokio::test]
async fn test_refresh_failure_sets_the_shared_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/teachers"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "detail": "Database unavailable",
            "type": "server_error"
        })))
        .mount(&server)
        .await;

    let result = client.refresh(CollectionKind::Teachers).await;

    assert!(matches!(result, Err(SyncError::RequestFailed { status: 500, .. })));
    assert!(client.store().last_error().is_some());
    assert!(!client.store().is_loading());
    assert!(client.store().teachers().is_empty());
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_loads_all_collections_and_shuts_down() {
    let (server, client) = setup().await;
    mock_empty_collections(&server).await;

    client.start().await.unwrap();

    assert!(client.store().last_refresh().is_some());
    // No session: the realtime channel must have stayed idle.
    assert_eq!(
        *client.channel_state().borrow(),
        edusync_core::ChannelState::Idle
    );

    client.shutdown().await;
}
