#![allow(clippy::unwrap_used)]
// Integration tests for `ApiClient` using wiremock.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use edusync_api::{ApiClient, CurrentUser, Error, NoticeLevel, Notifier, SessionStore, UserRole};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ApiClient, Arc<SessionStore>, Notifier) {
    let server = MockServer::start().await;
    let session = Arc::new(SessionStore::new());
    let notifier = Notifier::new();
    let client = ApiClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        Arc::clone(&session),
        notifier.clone(),
    );
    (server, client, session, notifier)
}

fn sign_in(session: &SessionStore) {
    session.sign_in(
        SecretString::from("sekrit-token".to_string()),
        CurrentUser {
            id: "u-1".into(),
            email: "admin@school.test".into(),
            role: UserRole::SchoolAdmin,
        },
    );
}

// ── Auth header ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_bearer_token_attached_when_signed_in() {
    let (server, client, session, _notifier) = setup().await;
    sign_in(&session);

    Mock::given(method("GET"))
        .and(path("/students"))
        .and(header("Authorization", "Bearer sekrit-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let students: Vec<serde_json::Value> = client.get("/students").await.unwrap();
    assert!(students.is_empty());
}

#[tokio::test]
async fn test_unauthenticated_request_still_sent() {
    let (server, client, _session, _notifier) = setup().await;

    Mock::given(method("GET"))
        .and(path("/schools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "sch-1" }])))
        .mount(&server)
        .await;

    let schools: Vec<serde_json::Value> = client.get("/schools").await.unwrap();
    assert_eq!(schools[0]["id"], "sch-1");
}

// ── Error mapping ───────────────────────────────────────────────────

#[tokio::test]
async fn test_structured_error_body_is_parsed() {
    let (server, client, _session, _notifier) = setup().await;

    Mock::given(method("GET"))
        .and(path("/students/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "detail": "Student not found",
            "type": "not_found"
        })))
        .mount(&server)
        .await;

    let result: Result<serde_json::Value, _> = client.get("/students/missing").await;

    match result {
        Err(Error::RequestFailed { status, detail, kind }) => {
            assert_eq!(status, 404);
            assert_eq!(detail, "Student not found");
            assert_eq!(kind.as_deref(), Some("not_found"));
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unstructured_error_body_gets_generic_detail() {
    let (server, client, _session, _notifier) = setup().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result: Result<serde_json::Value, _> = client.get("/broken").await;

    match result {
        Err(Error::RequestFailed { status: 500, detail, .. }) => {
            assert!(detail.contains("500"), "generic detail should name the status: {detail}");
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_failure_maps_to_transport_error() {
    let session = Arc::new(SessionStore::new());
    let client = ApiClient::with_client(
        reqwest::Client::new(),
        // Port 9 (discard) is never listening in the test environment.
        Url::parse("http://127.0.0.1:9").unwrap(),
        session,
        Notifier::new(),
    );

    let result: Result<serde_json::Value, _> = client.get("/anything").await;
    assert!(matches!(result, Err(Error::Transport(_))), "got {result:?}");
}

// ── Failure notice side effect ──────────────────────────────────────

#[tokio::test]
async fn test_failure_emits_error_notice() {
    let (server, client, _session, notifier) = setup().await;
    let mut notices = notifier.subscribe();

    Mock::given(method("GET"))
        .and(path("/fees"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": "Invalid fee structure",
            "type": "validation_error"
        })))
        .mount(&server)
        .await;

    let result: Result<serde_json::Value, _> = client.get("/fees").await;
    assert!(result.is_err());

    let notice = notices.try_recv().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(notice.message, "Invalid fee structure");
}

#[tokio::test]
async fn test_success_emits_no_notice() {
    let (server, client, _session, notifier) = setup().await;
    let mut notices = notifier.subscribe();

    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let _: Vec<serde_json::Value> = client.get("/courses").await.unwrap();
    assert!(notices.try_recv().is_err());
}

// ── 401 handling ────────────────────────────────────────────────────

#[tokio::test]
async fn test_401_clears_the_session() {
    let (server, client, session, _notifier) = setup().await;
    sign_in(&session);

    Mock::given(method("GET"))
        .and(path("/students"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Token expired",
            "type": "auth_error"
        })))
        .mount(&server)
        .await;

    let result: Result<serde_json::Value, _> = client.get("/students").await;
    assert!(matches!(result, Err(Error::RequestFailed { status: 401, .. })));
    assert!(!session.is_authenticated(), "401 should clear the ambient session");
}

// ── Writes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_post_sends_json_body() {
    let (server, client, _session, _notifier) = setup().await;

    Mock::given(method("POST"))
        .and(path("/students"))
        .and(body_json(json!({ "rollNumber": "R-042" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "s-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let created: serde_json::Value = client
        .post("/students", &json!({ "rollNumber": "R-042" }))
        .await
        .unwrap();
    assert_eq!(created["id"], "s-1");
}

#[tokio::test]
async fn test_put_and_delete() {
    let (server, client, _session, _notifier) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/announcements/a-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "a-1" })))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/announcements/a-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let updated: serde_json::Value = client
        .put("/announcements/a-1", &json!({ "title": "Updated" }))
        .await
        .unwrap();
    assert_eq!(updated["id"], "a-1");

    client.delete("/announcements/a-1").await.unwrap();
}

// ── Upload ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_upload_is_multipart() {
    let (server, client, session, _notifier) = setup().await;
    sign_in(&session);

    Mock::given(method("POST"))
        .and(path("/students/import"))
        .and(header("Authorization", "Bearer sekrit-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "imported": 12 })))
        .expect(1)
        .mount(&server)
        .await;

    let result: serde_json::Value = client
        .upload("/students/import", "students.csv", b"id,name\n1,Al".to_vec())
        .await
        .unwrap();
    assert_eq!(result["imported"], 12);
}
