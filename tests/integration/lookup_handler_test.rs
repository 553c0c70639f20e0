use crate::helpers::{alice_profile, memory_queue, spawn_worker, test_settings, REQUESTS, RESPONSES};
use axum::http::StatusCode;
use axum::Extension;
use axum_test::TestServer;
use scraplink::correlation::correlator::ResponseCorrelator;
use scraplink::presentation::routes;
use scraplink::queue::dispatch_queue::DispatchQueue;
use scraplink::queue::memory_queue::InMemoryDispatchQueue;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn test_server(queue: Arc<InMemoryDispatchQueue>, deadline_secs: u64) -> TestServer {
    let settings = Arc::new(test_settings(deadline_secs));
    let dyn_queue: Arc<dyn DispatchQueue> = queue;
    let correlator = Arc::new(ResponseCorrelator::new(
        dyn_queue.clone(),
        RESPONSES.to_string(),
        100,
        Duration::from_millis(100),
    ));

    let app = routes::routes()
        .layer(Extension(dyn_queue))
        .layer(Extension(correlator))
        .layer(Extension(settings));
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_malformed_link_is_rejected_synchronously() {
    let queue = memory_queue();
    let server = test_server(queue.clone(), 1);

    let response = server
        .post("/v1/lookup")
        .json(&json!({ "link": "not-a-url" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(false));
    // 校验失败时没有任何消息入队
    assert_eq!(queue.pending_count(REQUESTS), 0);
}

#[tokio::test]
async fn test_empty_link_is_rejected_synchronously() {
    let queue = memory_queue();
    let server = test_server(queue.clone(), 1);

    let response = server.post("/v1/lookup").json(&json!({ "link": "" })).await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(queue.pending_count(REQUESTS), 0);
}

#[tokio::test]
async fn test_lookup_round_trip_returns_profile() {
    let queue = memory_queue();
    let worker = spawn_worker(queue.clone(), alice_profile());
    let server = test_server(queue, 10);

    let response = server
        .post("/v1/lookup")
        .json(&json!({ "link": "https://example.com/in/alice" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["fullName"], json!("Alice Example"));
    assert_eq!(body["data"]["headline"], json!(null));
    assert_eq!(body["data"]["profilePicUrl"], json!(null));
    assert_eq!(body["data"]["backgroundCoverImageUrl"], json!(null));

    worker.abort();
}

#[tokio::test]
async fn test_timeout_reports_no_matching_response() {
    // 没有工作器在消费，等待以超时结束
    let queue = memory_queue();
    let server = test_server(queue, 1);

    let response = server
        .post("/v1/lookup")
        .json(&json!({ "link": "https://example.com/in/alice" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = response.json();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("No matching response available"));
}

#[tokio::test]
async fn test_health_and_version_endpoints() {
    let server = test_server(memory_queue(), 1);

    let health = server.get("/health").await;
    assert_eq!(health.status_code(), StatusCode::OK);
    assert_eq!(health.text(), "OK");

    let version = server.get("/v1/version").await;
    assert_eq!(version.status_code(), StatusCode::OK);
}
