//! In-process API tests driven through the router with `oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use common::{memory_store, start_mock_dependency, test_config};
use product_service::config::AppConfig;
use product_service::observability::metrics;
use product_service::resilience::CircuitState;
use product_service::HttpServer;

fn router(config: AppConfig) -> (Router, HttpServer) {
    let server = HttpServer::new(config, memory_store(), Some(metrics::init_metrics())).unwrap();
    (server.router(), server)
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_product(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/products")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_create_then_get_product() {
    let dependency = start_mock_dependency(200, "ok").await;
    let (router, _server) = router(test_config(&dependency.url()));

    let created = send(&router, post_product(r#"{"name":"Widget"}"#)).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let id = json(created).await["id"].as_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&id).is_ok(), "not a uuid: {}", id);

    let fetched = send(&router, get(&format!("/products/{}", id))).await;
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(
        json(fetched).await,
        serde_json::json!({ "product": { "id": id, "name": "Widget" } })
    );
    assert_eq!(dependency.hits(), 1);
}

#[tokio::test]
async fn test_create_takes_name_from_body_only() {
    let dependency = start_mock_dependency(200, "ok").await;
    let (router, _server) = router(test_config(&dependency.url()));

    let request = Request::builder()
        .method("POST")
        .uri("/products?name=Gizmo")
        .header("content-type", "application/json")
        .header("x-product-name", "Gadget")
        .body(Body::from(r#"{"name":"Widget"}"#))
        .unwrap();
    let created = send(&router, request).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let id = json(created).await["id"].as_str().unwrap().to_string();

    let fetched = send(&router, get(&format!("/products/{}", id))).await;
    assert_eq!(json(fetched).await["product"]["name"], "Widget");
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let dependency = start_mock_dependency(200, "ok").await;
    let (router, _server) = router(test_config(&dependency.url()));

    let response = send(&router, get("/products/does-not-exist")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["error"], "product not found");
}

#[tokio::test]
async fn test_malformed_create_body_is_bad_request() {
    let dependency = start_mock_dependency(200, "ok").await;
    let (router, _server) = router(test_config(&dependency.url()));

    let response = send(&router, post_product(r#"{"name":"#)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&router, post_product(r#"{"name":42}"#)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&router, post_product("")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let dependency = start_mock_dependency(200, "ok").await;
    let mut config = test_config(&dependency.url());
    config.listener.max_body_size = 32;
    let (router, _server) = router(config);

    let body = format!(r#"{{"name":"{}"}}"#, "x".repeat(64));
    let request = Request::builder()
        .method("POST")
        .uri("/products")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_healthcheck_ignores_dependencies() {
    let (router, _server) = router(test_config("http://127.0.0.1:9"));

    let response = send(&router, get("/healthcheck")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn test_breaker_opens_after_failing_dependency() {
    let dependency = start_mock_dependency(500, "boom").await;
    let mut config = test_config(&dependency.url());
    config.retry.max_retries = 0;
    let (router, server) = router(config);

    for _ in 0..3 {
        let response = send(&router, get("/products/any")).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
    assert_eq!(server.breaker().state(), CircuitState::Open);
    assert_eq!(dependency.hits(), 3);

    let response = send(&router, get("/products/any")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("is open"));
    assert_eq!(dependency.hits(), 3);
}

#[tokio::test]
async fn test_metrics_endpoint_renders_request_counters() {
    let dependency = start_mock_dependency(200, "ok").await;
    let (router, _server) = router(test_config(&dependency.url()));

    send(&router, get("/products/missing")).await;
    let response = send(&router, get("/metrics")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
}

#[tokio::test]
async fn test_metrics_can_be_disabled() {
    let mut config = test_config("http://127.0.0.1:9");
    config.observability.metrics_enabled = false;
    let (router, _server) = router(config);

    let response = send(&router, get("/metrics")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
