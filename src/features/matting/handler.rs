use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use std::time::Instant;

use crate::error::{AppError, ProblemDetails};
use crate::state::AppState;

use super::media::MediaType;
use super::service;

/// 上传表单（multipart/form-data）
#[derive(utoipa::ToSchema)]
pub struct RemoveBgForm {
    /// 待处理的图片文件
    #[schema(value_type = String, format = Binary)]
    pub file: String,
}

#[utoipa::path(
    post,
    path = "/remove-bg",
    summary = "移除图片背景",
    description = "上传一张图片（multipart 字段名 file），返回前景保留、背景透明的 PNG。支持 JPEG/PNG/WebP/GIF/AVIF/SVG 输入。",
    request_body(content = RemoveBgForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "PNG bytes of the cutout image"),
        (status = 401, description = "API Key 缺失或不匹配", body = ProblemDetails),
        (status = 413, description = "上传超过体积上限", body = ProblemDetails),
        (status = 415, description = "图片类型不在白名单内", body = ProblemDetails),
        (status = 422, description = "multipart 请求无效", body = ProblemDetails),
        (status = 429, description = "认证失败次数过多", body = ProblemDetails),
        (status = 500, description = "背景移除失败", body = ProblemDetails),
        (status = 504, description = "处理超时", body = ProblemDetails)
    ),
    security(("ApiKey" = [])),
    tag = "Matting"
)]
pub async fn remove_bg(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let t_total = Instant::now();

    // 定位 file 字段
    let mut file_field = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("multipart 解析失败: {e}")))?
    {
        if field.name() == Some("file") {
            file_field = Some(field);
            break;
        }
    }
    let mut field = file_field.ok_or_else(|| AppError::Validation("缺少 file 字段".to_string()))?;

    // 声明类型先行校验，白名单外的类型在读取内容前就拒绝
    let declared = field.content_type().map(str::to_string);
    let declared_media = match declared.as_deref() {
        Some(ct) => Some(MediaType::from_content_type(ct).ok_or_else(|| {
            AppError::UnsupportedMediaType(format!("{ct}（支持: {}）", MediaType::allowed_list()))
        })?),
        None => None,
    };

    // 流式读取并限制体积
    let max_bytes = state.config.upload.max_bytes;
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Validation(format!("读取上传内容失败: {e}")))?
    {
        if buf.len() + chunk.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "上传超过 {max_bytes} 字节上限"
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    if buf.is_empty() {
        return Err(AppError::Validation("上传内容为空".to_string()));
    }

    // 无声明类型时从内容嗅探兜底
    let media = match declared_media {
        Some(m) => m,
        None => MediaType::sniff(&buf).ok_or_else(|| {
            AppError::UnsupportedMediaType(format!(
                "无法识别上传内容类型（支持: {}）",
                MediaType::allowed_list()
            ))
        })?,
    };

    tracing::debug!(
        target: "matting_backend::remove_bg",
        bytes_in = buf.len(),
        media = media.as_content_type(),
        "收到待处理图片"
    );

    // 获取推理许可；许可随阻塞任务存续，约束 CPU 占用
    let permit = state
        .inference_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| AppError::Internal(format!("获取推理信号量失败: {e}")))?;

    let remover = state.remover.clone();
    let timeout_secs = state.config.inference.timeout_secs;
    let t_infer = Instant::now();
    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        service::process_upload(remover.as_ref(), media, &buf)
    });

    let png = match tokio::time::timeout(state.config.inference.timeout_duration(), task).await {
        Err(_) => {
            tracing::error!("推理超时（>{}s），请求放弃", timeout_secs);
            return Err(AppError::Timeout(format!(
                "处理未在 {timeout_secs} 秒内完成"
            )));
        }
        Ok(Err(e)) => {
            return Err(AppError::Internal(format!("阻塞推理任务执行失败: {e}")));
        }
        Ok(Ok(result)) => result?,
    };

    let total_ms = t_total.elapsed().as_millis() as i64;
    let infer_ms = t_infer.elapsed().as_millis() as i64;
    tracing::info!(
        target: "matting_backend::remove_bg",
        total_ms,
        infer_ms,
        bytes_out = png.len(),
        "背景移除完成"
    );

    let mut headers = axum::http::HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"no-bg.png\""),
    );
    Ok((StatusCode::OK, headers, Bytes::from(png)))
}

/// 组装抠图路由。
///
/// 认证中间件挂在 route_layer 上，拒绝发生在请求体读取之前；
/// 整体 body 上限比业务上限略高，给 multipart 边界留余量。
pub fn create_matting_router(state: &AppState) -> Router<AppState> {
    let body_limit = state.config.upload.max_bytes + 1024 * 1024;
    Router::new()
        .route("/remove-bg", post(remove_bg))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::features::auth::api_key_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
}
