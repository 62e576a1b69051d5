use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::state::AppState;

use super::throttle::FailureThrottle;

/// 认证使用的请求头。
pub const API_KEY_HEADER: &str = "x-api-key";

/// API Key 校验器。
///
/// 未配置 key 时所有请求直接放行；配置后缺失/不匹配返回 401，
/// 同一来源 IP 连续失败超限返回 429。
pub struct ApiKeyGuard {
    expected: Option<String>,
    throttle: FailureThrottle,
}

impl ApiKeyGuard {
    pub fn new(cfg: &AuthConfig) -> Self {
        Self {
            expected: cfg.api_key.clone().filter(|k| !k.is_empty()),
            throttle: FailureThrottle::new(cfg),
        }
    }

    /// 认证是否启用
    pub fn enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// 校验一次请求。封禁检查先于 key 比对，被封禁的来源拿不到
    /// key 对错的反馈。
    pub async fn check(&self, headers: &HeaderMap, client_ip: &str) -> Result<(), AppError> {
        let Some(expected) = self.expected.as_deref() else {
            return Ok(());
        };

        if self.throttle.is_blocked(client_ip).await {
            return Err(AppError::RateLimited(
                "认证失败次数过多，请稍后再试".to_string(),
            ));
        }

        let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            if self.throttle.record_failure(client_ip).await {
                tracing::warn!(
                    target: "matting_backend::auth",
                    "来源 {} 认证失败次数超限，已临时封禁",
                    client_ip
                );
            }
            return Err(AppError::Auth("X-API-Key 缺失或不匹配".to_string()));
        }

        Ok(())
    }
}

/// 提取来源 IP：优先 `X-Forwarded-For` 的第一项，其次 socket 对端地址。
pub fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// 处理路由的认证中间件：拒绝发生在读取请求体之前。
pub async fn api_key_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    if let Err(e) = state.auth.check(req.headers(), &ip).await {
        return e.into_response();
    }
    next.run(req).await
}
