use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 认证失败（X-API-Key 缺失或不匹配）
    #[error("认证失败: {0}")]
    Auth(String),
    /// 认证失败次数过多，来源 IP 暂时封禁
    #[error("请求过于频繁: {0}")]
    RateLimited(String),

    /// 不支持的图片类型
    #[error("不支持的图片类型: {0}")]
    UnsupportedMediaType(String),
    /// 上传体积超限
    #[error("上传文件过大: {0}")]
    PayloadTooLarge(String),
    /// 参数校验错误（multipart 缺失 file 字段等）
    #[error("参数校验错误: {0}")]
    Validation(String),

    /// 推理超时
    #[error("处理超时: {0}")]
    Timeout(String),

    /// 抠图处理错误（解码 / 推理 / 编码）
    #[error("抠图处理错误: {0}")]
    Matting(#[from] MattingError),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 抠图管线错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum MattingError {
    /// 输入图片解码失败
    #[error("图片解码失败: {0}")]
    Decode(String),

    /// SVG 栅格化失败
    #[error("SVG 栅格化失败: {0}")]
    Rasterize(String),

    /// 模型加载失败
    #[error("模型加载失败: {0}")]
    ModelLoad(String),

    /// 模型推理失败
    #[error("模型推理失败: {0}")]
    Inference(String),

    /// 模型输出与预期形状不符
    #[error("模型输出无效: {0}")]
    InvalidOutput(String),

    /// PNG 编码失败
    #[error("PNG 编码失败: {0}")]
    Encode(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(String),
}

/// RFC7807 风格的错误响应（Problem Details）。
///
/// 设计目标：
/// - 让所有 API 错误返回结构化 JSON，便于调用方稳定处理
/// - 与 OpenAPI 一致（content-type = application/problem+json）
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）。若无更细分的类型，可使用 about:blank。
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题，用于概括错误。
    #[schema(example = "Unauthorized")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）。
    #[schema(example = 401)]
    pub status: u16,

    /// 人类可读的详细信息（尽量稳定，不建议依赖解析）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// 稳定的错误码，用于程序化处理。
    #[schema(example = "UNAUTHORIZED")]
    pub code: String,

    /// 可选：请求追踪 ID（由 request-id middleware 回填）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Matting(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn stable_code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "UNAUTHORIZED",
            AppError::RateLimited(_) => "RATE_LIMITED",
            AppError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::Timeout(_) => "PROCESSING_TIMEOUT",
            AppError::Matting(_) => "PROCESSING_FAILED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn title(&self) -> &'static str {
        match self.status_code() {
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::TOO_MANY_REQUESTS => "Too Many Requests",
            StatusCode::UNSUPPORTED_MEDIA_TYPE => "Unsupported Media Type",
            StatusCode::PAYLOAD_TOO_LARGE => "Payload Too Large",
            StatusCode::UNPROCESSABLE_ENTITY => "Validation Failed",
            StatusCode::GATEWAY_TIMEOUT => "Gateway Timeout",
            StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
            _ => "Error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 处理类错误保留细节便于排查；对外 500 只给笼统描述，避免泄露模型内部信息。
        let detail = match &self {
            AppError::Matting(e) => {
                tracing::error!(target: "matting_backend::error", "抠图处理失败: {e}");
                Some("背景移除失败".to_string())
            }
            other => Some(other.to_string()),
        };

        let problem = ProblemDetails {
            type_url: "about:blank".to_string(),
            title: self.title().to_string(),
            status: status.as_u16(),
            detail,
            code: self.stable_code().to_string(),
            request_id: crate::request_id::current_request_id(),
        };

        let mut res = Json(problem).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        res
    }
}

// =============== Error conversions for common external errors ===============

impl From<std::io::Error> for MattingError {
    fn from(err: std::io::Error) -> Self {
        MattingError::Io(err.to_string())
    }
}

impl From<image::ImageError> for MattingError {
    fn from(err: image::ImageError) -> Self {
        MattingError::Decode(err.to_string())
    }
}
