use super::dto::*;
use super::router;
use crate::registry::Registry;
use crate::storage::MemoryBackend;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use serde::de::DeserializeOwned;
use shared_types::{Config, Group, IDEMPOTENCY_HEADER, LabelSet};
use std::sync::Arc;
use tower::util::ServiceExt;

fn create_test_app() -> Router {
    router(Registry::new(Arc::new(MemoryBackend::new())))
}

fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn create_config(app: &Router, version: &str) -> Config {
    let response = send(
        app,
        json_request(
            "POST",
            "/configs",
            &serde_json::json!({"version": version, "entries": {"port": "8080"}}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

async fn create_group(app: &Router, version: &str, configs: &[LabelSet]) -> Group {
    let response = send(
        app,
        json_request(
            "POST",
            "/groups",
            &serde_json::json!({"version": version, "configs": configs}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();

    let response = send(&app, empty_request("GET", "/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = read_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "config-registry");
    assert!(json.get("timestamp").is_some());
}

// ============================================================================
// Configs
// ============================================================================

#[tokio::test]
async fn test_create_and_get_config() {
    let app = create_test_app();

    let created = create_config(&app, "v1").await;
    assert!(!created.id.is_empty());
    assert_eq!(created.version, "v1");

    let response = send(
        &app,
        empty_request("GET", &format!("/configs/{}/v1", created.id)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let fetched: Config = read_json(response).await;
    assert_eq!(fetched, created);
    assert_eq!(fetched.entries.get("port"), Some(&"8080".to_string()));
}

#[tokio::test]
async fn test_get_missing_config_returns_404() {
    let app = create_test_app();

    let response = send(&app, empty_request("GET", "/configs/nope/v1")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.error, "Not Found");
    assert_eq!(error.details, Some("config nope@v1 not found".to_string()));
}

#[tokio::test]
async fn test_list_config_versions() {
    let app = create_test_app();

    let response = send(&app, empty_request("GET", "/configs/unknown")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let created = create_config(&app, "v1").await;
    let response = send(
        &app,
        json_request(
            "POST",
            &format!("/configs/{}", created.id),
            &serde_json::json!({"version": "v2", "entries": {"port": "9090"}}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&app, empty_request("GET", &format!("/configs/{}", created.id))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let listed: ConfigVersionsResponse = read_json(response).await;
    let versions: Vec<&str> = listed.versions.iter().map(|c| c.version.as_str()).collect();
    assert_eq!(versions, vec!["v1", "v2"]);
}

#[tokio::test]
async fn test_put_existing_version_conflicts() {
    let app = create_test_app();
    let created = create_config(&app, "v1").await;

    let response = send(
        &app,
        json_request(
            "POST",
            &format!("/configs/{}", created.id),
            &serde_json::json!({"version": "v1", "entries": {"port": "1"}}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Stored entries are untouched
    let response = send(
        &app,
        empty_request("GET", &format!("/configs/{}/v1", created.id)),
    )
    .await;
    let fetched: Config = read_json(response).await;
    assert_eq!(fetched.entries.get("port"), Some(&"8080".to_string()));
}

#[tokio::test]
async fn test_delete_config_version() {
    let app = create_test_app();
    let created = create_config(&app, "v1").await;
    let uri = format!("/configs/{}/v1", created.id);

    let response = send(&app, empty_request("DELETE", &uri)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let deleted: DeletedResponse = read_json(response).await;
    assert_eq!(deleted.deleted.id, created.id);
    assert_eq!(deleted.deleted.version, "v1");

    let response = send(&app, empty_request("GET", &uri)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, empty_request("DELETE", &uri)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_version_is_bad_request() {
    let app = create_test_app();

    let response = send(
        &app,
        json_request(
            "POST",
            "/configs",
            &serde_json::json!({"version": "  ", "entries": {}}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = create_test_app();

    let response = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/configs")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert!(response.status().is_client_error());

    let response = send(
        &app,
        json_request(
            "POST",
            "/configs",
            &serde_json::json!({"version": "v1", "entries": {}, "id": "chosen"}),
        ),
    )
    .await;
    assert!(response.status().is_client_error());
}

// ============================================================================
// Groups and labels
// ============================================================================

#[tokio::test]
async fn test_find_group_labels() {
    let app = create_test_app();
    let prod = labels(&[("env", "prod"), ("tier", "web")]);
    let dev = labels(&[("env", "dev")]);
    let group = create_group(&app, "v1", &[prod.clone(), dev]).await;

    // Pair order in the query does not matter
    let response = send(
        &app,
        empty_request(
            "GET",
            &format!("/groups/{}/v1/labels/tier=web&env=prod", group.id),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let found: LabelsResponse = read_json(response).await;
    assert_eq!(found.configs, vec![prod]);

    // A subset of the pairs matches nothing
    let response = send(
        &app,
        empty_request("GET", &format!("/groups/{}/v1/labels/env=prod", group.id)),
    )
    .await;
    let found: LabelsResponse = read_json(response).await;
    assert!(found.configs.is_empty());
}

#[tokio::test]
async fn test_invalid_label_query_is_bad_request() {
    let app = create_test_app();
    let group = create_group(&app, "v1", &[labels(&[("env", "prod")])]).await;

    let response = send(
        &app,
        empty_request("GET", &format!("/groups/{}/v1/labels/env", group.id)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_label_key_is_bad_request() {
    let app = create_test_app();

    let response = send(
        &app,
        json_request(
            "POST",
            "/groups",
            &serde_json::json!({"version": "v1", "configs": [{"": "x"}]}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_add_labels_to_group() {
    let app = create_test_app();
    let group = create_group(&app, "v1", &[labels(&[("env", "prod")])]).await;
    let extra = labels(&[("env", "staging")]);

    let response = send(
        &app,
        json_request(
            "POST",
            &format!("/groups/{}/v1/labels", group.id),
            &serde_json::json!({"configs": [extra.clone()]}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated: LabelsResponse = read_json(response).await;
    assert_eq!(updated.configs.len(), 2);

    let response = send(
        &app,
        empty_request("GET", &format!("/groups/{}/v1/labels/env=staging", group.id)),
    )
    .await;
    let found: LabelsResponse = read_json(response).await;
    assert_eq!(found.configs, vec![extra]);

    let response = send(&app, empty_request("GET", &format!("/groups/{}/v1", group.id))).await;
    let stored: Group = read_json(response).await;
    assert_eq!(stored.configs.len(), 2);
}

#[tokio::test]
async fn test_add_labels_to_missing_group_returns_404() {
    let app = create_test_app();

    let response = send(
        &app,
        json_request(
            "POST",
            "/groups/missing/v1/labels",
            &serde_json::json!({"configs": [{"env": "prod"}]}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_group_versions_and_cascade_delete() {
    let app = create_test_app();
    let prod = labels(&[("env", "prod")]);
    let group = create_group(&app, "v1", &[prod.clone()]).await;

    let response = send(
        &app,
        json_request(
            "POST",
            &format!("/groups/{}", group.id),
            &serde_json::json!({"version": "v10", "configs": [prod]}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&app, empty_request("GET", &format!("/groups/{}", group.id))).await;
    let listed: GroupVersionsResponse = read_json(response).await;
    assert_eq!(listed.versions.len(), 2);

    let response = send(
        &app,
        empty_request("DELETE", &format!("/groups/{}/v1", group.id)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, empty_request("GET", &format!("/groups/{}/v1", group.id))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // v10 keeps both its document and its label index
    let response = send(
        &app,
        empty_request("GET", &format!("/groups/{}/v10/labels/env=prod", group.id)),
    )
    .await;
    let found: LabelsResponse = read_json(response).await;
    assert_eq!(found.configs.len(), 1);

    let response = send(
        &app,
        empty_request("GET", &format!("/groups/{}/v1/labels/env=prod", group.id)),
    )
    .await;
    let found: LabelsResponse = read_json(response).await;
    assert!(found.configs.is_empty());
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn test_replayed_idempotency_key_conflicts() {
    let app = create_test_app();
    let body = serde_json::json!({"version": "v1", "entries": {"port": "8080"}});

    let keyed = || {
        Request::builder()
            .method("POST")
            .uri("/configs")
            .header(header::CONTENT_TYPE, "application/json")
            .header(IDEMPOTENCY_HEADER, "req-1")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    };

    let response = send(&app, keyed()).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&app, keyed()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let error: ErrorResponse = read_json(response).await;
    assert!(error.details.unwrap().contains("req-1"));
}

#[tokio::test]
async fn test_failed_write_does_not_consume_key() {
    let app = create_test_app();

    let keyed = |version: &str| {
        Request::builder()
            .method("POST")
            .uri("/configs")
            .header(header::CONTENT_TYPE, "application/json")
            .header(IDEMPOTENCY_HEADER, "req-2")
            .body(Body::from(
                serde_json::to_vec(&serde_json::json!({"version": version, "entries": {"a": "1"}}))
                    .unwrap(),
            ))
            .unwrap()
    };

    let response = send(&app, keyed("")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, keyed("v1")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_requests_without_key_are_not_deduplicated() {
    let app = create_test_app();

    let first = create_config(&app, "v1").await;
    let second = create_config(&app, "v1").await;
    assert_ne!(first.id, second.id);
}
