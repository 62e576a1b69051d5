use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

/// request_id 使用的请求/响应头。
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 请求上下文中的 request_id。
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

tokio::task_local! {
    /// 当前异步任务绑定的 request_id，用于错误响应透传。
    static TASK_REQUEST_ID: String;
}

/// 获取当前请求上下文中的 request_id。
pub fn current_request_id() -> Option<String> {
    TASK_REQUEST_ID.try_with(|v| v.clone()).ok()
}

/// 客户端传入的 id 只接受短小且 header 安全的字符集，其余一律重新生成。
fn accepts_client_id(v: &str) -> bool {
    (1..=64).contains(&v.len())
        && v.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// 全局 request_id 中间件：
/// - 优先透传客户端传入的 `X-Request-Id`
/// - 缺失或非法时服务端自动生成
/// - 回写到响应头，并注入请求上下文供错误响应使用
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = match req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some(raw) if accepts_client_id(raw) => raw.to_string(),
        _ => format!("req_{}", Uuid::new_v4().simple()),
    };

    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut res = TASK_REQUEST_ID
        .scope(request_id.clone(), async move { next.run(req).await })
        .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    res
}

#[cfg(test)]
mod tests {
    use super::accepts_client_id;

    #[test]
    fn client_id_accepts_header_safe_chars() {
        assert!(accepts_client_id("req-123_abc"));
    }

    #[test]
    fn client_id_rejects_empty_long_and_unsafe() {
        assert!(!accepts_client_id(""));
        assert!(!accepts_client_id(&"a".repeat(65)));
        assert!(!accepts_client_id("bad id"));
        assert!(!accepts_client_id("bad/xx"));
    }
}
