use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use image::{RgbImage, RgbaImage};
use tower::ServiceExt;

use matting_backend::config::AppConfig;
use matting_backend::error::MattingError;
use matting_backend::features::matting::{BackgroundRemover, create_matting_router};
use matting_backend::state::AppState;

const BOUNDARY: &str = "test-boundary-7f9a";

/// 记录调用次数的桩实现，用于断言"认证失败时模型不会被触发"
struct CountingRemover {
    calls: AtomicUsize,
}

impl CountingRemover {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BackgroundRemover for CountingRemover {
    fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage, MattingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = image.dimensions();
        Ok(RgbaImage::from_fn(w, h, |x, y| {
            let p = image.get_pixel(x, y);
            image::Rgba([p[0], p[1], p[2], 255])
        }))
    }
}

fn make_app(api_key: Option<&str>, remover: Arc<CountingRemover>) -> Router {
    let mut config = AppConfig::default();
    config.auth.api_key = api_key.map(str::to_string);
    let state = AppState::new(config, remover);
    Router::new()
        .merge(create_matting_router(&state))
        .with_state(state)
}

fn sample_png() -> Vec<u8> {
    let img = RgbImage::from_pixel(4, 4, image::Rgb([120, 80, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode sample png");
    out.into_inner()
}

fn multipart_body(content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"input.png\"\r\n",
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn remove_bg_request(api_key: Option<&str>, forwarded_for: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/remove-bg")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    if let Some(ip) = forwarded_for {
        builder = builder.header("x-forwarded-for", ip);
    }
    builder
        .body(Body::from(multipart_body("image/png", &sample_png())))
        .expect("build request")
}

async fn problem_code(resp: axum::response::Response) -> String {
    let ct = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_eq!(ct, "application/problem+json");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body: serde_json::Value = serde_json::from_slice(&bytes).expect("problem json");
    body["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn no_configured_key_lets_requests_through() {
    let remover = CountingRemover::new();
    let app = make_app(None, remover.clone());

    let resp = app
        .oneshot(remove_bg_request(None, None))
        .await
        .expect("response");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(remover.calls(), 1);
}

#[tokio::test]
async fn missing_key_is_rejected_before_processing() {
    let remover = CountingRemover::new();
    let app = make_app(Some("secret"), remover.clone());

    let resp = app
        .oneshot(remove_bg_request(None, None))
        .await
        .expect("response");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(problem_code(resp).await, "UNAUTHORIZED");
    assert_eq!(remover.calls(), 0);
}

#[tokio::test]
async fn wrong_key_is_rejected_before_processing() {
    let remover = CountingRemover::new();
    let app = make_app(Some("secret"), remover.clone());

    let resp = app
        .oneshot(remove_bg_request(Some("not-the-secret"), None))
        .await
        .expect("response");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(remover.calls(), 0);
}

#[tokio::test]
async fn matching_key_is_accepted() {
    let remover = CountingRemover::new();
    let app = make_app(Some("secret"), remover.clone());

    let resp = app
        .oneshot(remove_bg_request(Some("secret"), None))
        .await
        .expect("response");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(remover.calls(), 1);
}

#[tokio::test]
async fn repeated_failures_block_the_source_ip() {
    let remover = CountingRemover::new();
    let mut config = AppConfig::default();
    config.auth.api_key = Some("secret".to_string());
    config.auth.max_failed_attempts = 2;
    let state = AppState::new(config, remover.clone());
    let app = Router::new()
        .merge(create_matting_router(&state))
        .with_state(state);

    let ip = Some("203.0.113.9");
    for _ in 0..2 {
        let resp = app
            .clone()
            .oneshot(remove_bg_request(Some("bad"), ip))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    // 封禁后连正确的 key 也进不来
    let resp = app
        .clone()
        .oneshot(remove_bg_request(Some("secret"), ip))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(problem_code(resp).await, "RATE_LIMITED");
    assert_eq!(remover.calls(), 0);

    // 其他来源 IP 不受影响
    let resp = app
        .oneshot(remove_bg_request(Some("secret"), Some("198.51.100.4")))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(remover.calls(), 1);
}
