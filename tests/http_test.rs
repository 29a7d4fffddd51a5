// tests/http_test.rs
// HTTP surface smoke tests via tower::oneshot

mod common;

use common::*;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

use nlweb::api::build_router;
use nlweb::testing::mock_llm::MockLlmProvider;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[tokio::test]
async fn health_and_ready() {
    let app = test_app(Arc::new(MockLlmProvider::new())).await;
    let router = build_router(app);

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ask_without_query_is_bad_request() {
    let app = test_app(Arc::new(MockLlmProvider::new())).await;
    let router = build_router(app);

    let response = router
        .oneshot(Request::builder().uri("/ask").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ask_non_streaming_returns_aggregated_json() {
    let mock = MockLlmProvider::new()
        .when(
            "ranked list of items matching the query",
            json!({"score": 95, "justification": "search"}),
        )
        .when("Classic Lasagna", json!({"score": 85, "description": "Baked pasta."}))
        .with_default(json!({"score": 10, "description": ""}));
    let app = test_app(Arc::new(mock)).await;
    seed_default_corpus(&app).await;
    let router = build_router(app);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/ask?query=lasagna&site=all&streaming=false")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.get("query_id").is_some());
    assert!(!body["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ask_streaming_returns_event_stream() {
    let mock = MockLlmProvider::new().with_default(json!({"score": 10, "description": ""}));
    let app = test_app(Arc::new(mock)).await;
    seed_default_corpus(&app).await;
    let router = build_router(app);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/ask?query=lasagna&site=all")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn sites_lists_seeded_corpus() {
    let app = test_app(Arc::new(MockLlmProvider::new())).await;
    seed_default_corpus(&app).await;
    let router = build_router(app);

    let response = router
        .oneshot(Request::builder().uri("/sites").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    let sites: Vec<&str> = body["sites"].as_array().unwrap().iter().map(|s| s.as_str().unwrap()).collect();
    assert!(sites.contains(&"seriouseats"));
    assert!(sites.windows(2).all(|w| w[0] <= w[1]), "sites are sorted");
}

#[tokio::test]
async fn who_ranks_sites_for_a_query() {
    let app = test_app(Arc::new(MockLlmProvider::new())).await;
    seed_default_corpus(&app).await;
    let router = build_router(app);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/who?query=chicken%20dinner")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let sites = body["sites"].as_array().unwrap();
    assert!(!sites.is_empty() && sites.len() <= 5);
}

#[tokio::test]
async fn mcp_initialize_and_tools() {
    let app = test_app(Arc::new(MockLlmProvider::new())).await;
    seed_default_corpus(&app).await;
    let router = build_router(app);

    let request = |payload: Value| {
        Request::builder()
            .method("POST")
            .uri("/mcp")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    };

    let response = router
        .clone()
        .oneshot(request(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["id"], 1);
    assert!(body["result"]["protocolVersion"].is_string());

    let response = router
        .clone()
        .oneshot(request(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})))
        .await
        .unwrap();
    let body = body_json(response).await;
    let tools = body["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "ask"));

    let response = router
        .oneshot(request(json!({"jsonrpc": "2.0", "id": 3, "method": "no/such"})))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn conversation_crud_roundtrip() {
    let app = test_app(Arc::new(MockLlmProvider::new())).await;
    let router = build_router(app);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/conversations")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "user_id": "u1",
                        "site": "seriouseats",
                        "user_prompt": "pasta?",
                        "response": "lasagna",
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let conversation_id = created["conversation_id"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/conversations?user_id=u1&site=all")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed["threads"].as_array().unwrap().len(), 1);

    let response = router
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/conversations/{conversation_id}?user_id=u1"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let deleted = body_json(response).await;
    assert_eq!(deleted["deleted"], true);
}
