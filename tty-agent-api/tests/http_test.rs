//! HTTP-surface integration tests: exercise the router end-to-end through
//! `tower::ServiceExt::oneshot`, without binding a real socket.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use tty_agent_api::{router, AppState};
use tty_agent_core::config::Config;

fn test_state() -> AppState {
    let mut config = Config::default();
    config.ws.ticket_max_kubeconfig_bytes = 256;
    config.metrics.enabled = true;
    let state = AppState::new(config);
    state.mark_ready();
    state
}

/// `POST /ws-ticket` extracts `ConnectInfo<SocketAddr>` (normally supplied by
/// `Router::into_make_service_with_connect_info` in `main.rs`). Tests drive
/// the bare `Router` via `oneshot`, which never populates that extension, so
/// routes needing it are wrapped in `MockConnectInfo`, the pattern
/// `axum`'s own test suite uses for exactly this situation.
fn with_mock_connect_info(app: Router) -> Router {
    app.layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("valid json body")
}

#[tokio::test]
async fn root_health_probe_returns_name_and_ok() {
    let app = with_mock_connect_info(router::build(test_state()));

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({"name": "sealos-tty-agent", "ok": true}));
}

#[tokio::test]
async fn ws_ticket_happy_path_returns_ok_ticket_and_expires_at() {
    let app = with_mock_connect_info(router::build(test_state()));

    let request = Request::post("/ws-ticket")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "kubeconfig": "apiVersion: v1",
                "namespace": "default",
                "pod": "my-pod",
                "container": "shell"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["ok"], json!(true));
    assert!(body["ticket"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["expiresAt"].as_i64().is_some());
}

#[tokio::test]
async fn ws_ticket_rejects_empty_namespace_with_400() {
    let app = with_mock_connect_info(router::build(test_state()));

    let request = Request::post("/ws-ticket")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "kubeconfig": "apiVersion: v1",
                "namespace": "   ",
                "pod": "my-pod"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["ok"], json!(false));
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn ws_ticket_rejects_unknown_fields_with_400() {
    let app = with_mock_connect_info(router::build(test_state()));

    let request = Request::post("/ws-ticket")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "kubeconfig": "apiVersion: v1",
                "namespace": "default",
                "pod": "my-pod",
                "extra": "field"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    // `TicketBody`'s `FromRequest` impl maps the `deny_unknown_fields`
    // mismatch (a `JsonRejection`) into this crate's own `{ok:false,error}`
    // envelope rather than axum's default rejection response.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["ok"], json!(false));
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn ws_ticket_rejects_oversize_total_body_with_413() {
    let app = with_mock_connect_info(router::build(test_state()));

    // Exceeds the `ticket_max_kubeconfig_bytes + 16 KiB` envelope margin
    // enforced by `DefaultBodyLimit`, distinct from the sibling
    // "kubeconfig too large." case above which stays under that margin.
    let oversize_kubeconfig = "x".repeat(32 * 1024);
    let request = Request::post("/ws-ticket")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "kubeconfig": oversize_kubeconfig,
                "namespace": "default",
                "pod": "my-pod"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"], json!("Payload too large."));
}

#[tokio::test]
async fn ws_ticket_rejects_oversize_kubeconfig_with_413() {
    let app = with_mock_connect_info(router::build(test_state()));

    // Within the 16 KiB envelope margin, but the kubeconfig field itself
    // exceeds `ticket_max_kubeconfig_bytes` (256 in `test_state`).
    let oversize_kubeconfig = "x".repeat(300);
    let request = Request::post("/ws-ticket")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "kubeconfig": oversize_kubeconfig,
                "namespace": "default",
                "pod": "my-pod"
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await;
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"], json!("kubeconfig too large."));
}

#[tokio::test]
async fn healthz_and_readyz_report_ok() {
    let app = with_mock_connect_info(router::build(test_state()));

    let response = app
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readyz_reports_503_before_mark_ready() {
    let app = with_mock_connect_info(router::build(AppState::new(Config::default())));

    let response = app
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_endpoint_is_gated_by_config() {
    let mut config = Config::default();
    config.metrics.enabled = false;
    let app = with_mock_connect_info(router::build(AppState::new(config)));

    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_preflight_allows_any_origin_regardless_of_ws_allowlist() {
    let mut config = Config::default();
    config.ws.allowed_origins = std::iter::once("https://only-ws-origin.example".to_string()).collect();
    let app = with_mock_connect_info(router::build(AppState::new(config)));

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/ws-ticket")
        .header("origin", "https://anything.example")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
