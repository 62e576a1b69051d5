use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;

/// 浏览器直传场景默认只需要这两个方法。
const DEFAULT_METHODS: [Method; 2] = [Method::POST, Method::GET];

/// 根据配置构建 CORS 中间件
///
/// 未配置 method/header 列表时使用上传接口所需的缺省集合
/// （POST/GET + X-API-Key/Content-Type）。
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    if !cors.enabled {
        return None;
    }

    let (any_origin, origins) = parse_allowed_origins(&cors.allowed_origins);
    if !any_origin && origins.is_empty() {
        tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
        return None;
    }

    let mut layer = CorsLayer::new();

    if any_origin {
        layer = layer.allow_origin(Any);
    } else {
        layer = layer.allow_origin(origins);
    }

    let methods = parse_allowed_methods(&cors.allowed_methods);
    layer = if methods.is_empty() {
        layer.allow_methods(DEFAULT_METHODS.to_vec())
    } else {
        layer.allow_methods(methods)
    };

    let headers = parse_header_names(&cors.allowed_headers);
    layer = if headers.is_empty() {
        layer.allow_headers(vec![
            header::HeaderName::from_static("x-api-key"),
            header::CONTENT_TYPE,
        ])
    } else {
        layer.allow_headers(headers)
    };

    Some(layer)
}

fn parse_allowed_origins(values: &[String]) -> (bool, Vec<HeaderValue>) {
    let mut any = false;
    let mut origins = Vec::new();
    for raw in values {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if value == "*" {
            any = true;
            continue;
        }
        match HeaderValue::from_str(value) {
            Ok(v) => origins.push(v),
            Err(_) => tracing::warn!("CORS allowed_origins 含无效值: {}", value),
        }
    }
    (any, origins)
}

fn parse_allowed_methods(values: &[String]) -> Vec<Method> {
    let mut methods = Vec::new();
    for raw in values {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        let normalized = value.to_ascii_uppercase();
        match Method::from_bytes(normalized.as_bytes()) {
            Ok(m) => methods.push(m),
            Err(_) => tracing::warn!("CORS allowed_methods 含无效值: {}", value),
        }
    }
    methods
}

fn parse_header_names(values: &[String]) -> Vec<header::HeaderName> {
    let mut headers = Vec::new();
    for raw in values {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        let normalized = value.to_ascii_lowercase();
        match header::HeaderName::from_bytes(normalized.as_bytes()) {
            Ok(h) => headers.push(h),
            Err(_) => tracing::warn!("CORS allowed_headers 含无效值: {}", value),
        }
    }
    headers
}
