use super::*;
use crate::relay::test_helpers::*;
use crate::transform::NoOpTranscoder;
use crate::types::StreamDescriptor;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt; // for oneshot


const BOT_TOKEN: &str = "123456:TEST-TOKEN";

// Signed with BOT_TOKEN for user 42
const VALID_INIT_DATA: &str = "auth_date=1700000000&query_id=AAHdF6IQAAAAAN0XohDhrOrc&user=%7B%22id%22%3A42%2C%22first_name%22%3A%22Alice%22%2C%22username%22%3A%22alice%22%7D&hash=d3d448b06b791af8d5d04a9d993ebd566a49d4780081e718ac6e82991e8b5560";

/// Relay whose only provider never answers, so submitted jobs stay running
async fn create_test_relay() -> (Arc<MediaRelay>, TempDir) {
    let dir = TempDir::new().unwrap();
    let relay = relay_with(
        test_config(&dir),
        vec![Arc::new(HangingProvider)],
        Arc::new(NoOpTranscoder),
        RecordingSink::new(),
    )
    .await;
    (Arc::new(relay), dir)
}

fn router_for(relay: &Arc<MediaRelay>) -> Router {
    create_router(relay.clone(), relay.get_config()).unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn api_server_spawns_on_an_ephemeral_port() {
    let (relay, _dir) = create_test_relay().await;

    let mut config = (*relay.get_config()).clone();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let relay = relay.clone();
        let config = config.clone();
        async move { start_api_server(relay, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server exited early");
    api_handle.abort();
}

#[tokio::test]
async fn cors_headers_are_added_when_enabled() {
    let (relay, _dir) = create_test_relay().await;

    let mut config = (*relay.get_config()).clone();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let app = create_router(relay, Arc::new(config)).unwrap();

    let request = Request::builder()
        .uri("/api/v1/health")
        .header("Origin", "https://t.me")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS header should be present when CORS is enabled"
    );
}

#[tokio::test]
async fn cors_headers_are_absent_when_disabled() {
    let (relay, _dir) = create_test_relay().await;

    let mut config = (*relay.get_config()).clone();
    config.server.api.cors_enabled = false;
    let app = create_router(relay, Arc::new(config)).unwrap();

    let request = Request::builder()
        .uri("/api/v1/health")
        .header("Origin", "https://t.me")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn router_requires_bot_token_for_init_data_auth() {
    let (relay, _dir) = create_test_relay().await;

    let mut config = (*relay.get_config()).clone();
    config.server.api.require_init_data = true;
    config.delivery.bot_token = None;

    let err = create_router(relay, Arc::new(config)).unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[tokio::test]
async fn routes_are_only_served_under_the_prefix() {
    let (relay, _dir) = create_test_relay().await;
    let response = router_for(&relay).oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
