//! Integration test for SSE endpoint

mod common;

use axum::http::StatusCode;
use tempfile::TempDir;
use tower::ServiceExt;

#[tokio::test]
async fn test_sse_endpoint_exists() {
    let dir = TempDir::new().unwrap();
    let (router, _store) = common::app(dir.path()).await;

    // no user header needed for the event stream
    let response = router.oneshot(common::get("/api/events", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok());
    assert!(content_type.is_some_and(|v| v.contains("text/event-stream")));
}

#[tokio::test]
async fn test_health_reports_summary() {
    let dir = TempDir::new().unwrap();
    let (router, _store) = common::app(dir.path()).await;

    let response = router.oneshot(common::get("/api/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::body_json(response).await;
    assert_eq!(body["read_only"], false);
    assert_eq!(body["summary"]["consultants"], 2);
    assert_eq!(body["summary"]["missions"], 1);
}
