use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use dockhand_common::{HostDescriptor, Tail};

use crate::{create_app, follow_tail, AppState, HostRegistry, LogsParams};

fn test_app() -> Router {
    let registry = HostRegistry::new();
    registry.register(HostDescriptor::local("laptop"));
    create_app(AppState {
        registry: Arc::new(registry),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_reports_status_and_timestamp() {
    let response = test_app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn hosts_can_be_added_listed_and_removed() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/hosts")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "name": "staging",
                        "kind": "remote",
                        "ip": "10.0.0.5",
                        "ssh_user": "ops",
                        "ssh_password": "hunter2"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/hosts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let hosts = body_json(response).await;
    let names: Vec<_> = hosts
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["laptop", "staging"]);
    // Credentials never leave the server.
    let staging = &hosts.as_array().unwrap()[1];
    assert!(staging.get("ssh_password").is_none());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/hosts/staging")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/hosts/staging")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_host_is_a_404_with_error_body() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/api/hosts/missing/containers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn compose_against_unknown_host_is_a_404() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/compose")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"host": "nowhere", "path": "/srv/stack", "action": "up"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn log_params_map_onto_a_query() {
    let params = LogsParams {
        tail: Some("250".into()),
        since: Some("5m".into()),
        until: None,
        search: Some("error".into()),
    };
    let query = params.into_query();
    assert_eq!(query.tail, Tail::Lines(250));
    assert_eq!(query.since.as_deref(), Some("5m"));
    assert_eq!(query.search.as_deref(), Some("error"));

    let bare = LogsParams::default().into_query();
    assert_eq!(bare.tail, Tail::All);
}

#[test]
fn follow_tail_defaults_to_recent_context() {
    assert_eq!(follow_tail(&LogsParams::default()), Tail::Lines(100));
    let explicit = LogsParams {
        tail: Some("all".into()),
        ..Default::default()
    };
    assert_eq!(follow_tail(&explicit), Tail::All);
}
