use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    routing::get,
};
use tower::ServiceExt;

use matting_backend::features::health::handler::health_check;
use matting_backend::request_id::{REQUEST_ID_HEADER, request_id_middleware};

fn make_app() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .layer(axum::middleware::from_fn(request_id_middleware))
}

#[tokio::test]
async fn responses_always_carry_a_request_id() {
    let resp = make_app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("response");

    assert_eq!(resp.status(), StatusCode::OK);
    let id = resp
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(id.starts_with("req_"), "generated id, got: {id}");
}

#[tokio::test]
async fn valid_client_request_id_is_echoed_back() {
    let resp = make_app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(REQUEST_ID_HEADER, "client-id-123")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("response");

    let id = resp
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert_eq!(id, "client-id-123");
}

#[tokio::test]
async fn invalid_client_request_id_is_replaced() {
    let resp = make_app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(REQUEST_ID_HEADER, "bad id with spaces")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("response");

    let id = resp
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(id.starts_with("req_"), "replaced id, got: {id}");
}
