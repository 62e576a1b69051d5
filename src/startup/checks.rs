use crate::config::AppConfig;
use crate::error::AppError;
use futures_util::StreamExt;
use std::fs;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// 执行启动检查
///
/// 1. 检查并创建模型目录
/// 2. 模型权重缺失时按配置下载（下载后落盘缓存，重启直接复用）
pub async fn run_startup_checks(config: &AppConfig) -> Result<(), AppError> {
    tracing::info!("🔍 开始执行启动检查...");

    // 检查并创建模型目录
    ensure_model_dir(config)?;

    // 检查并下载模型权重
    ensure_model_weights(config).await?;

    tracing::info!("✅ 启动检查完成");
    Ok(())
}

/// 确保模型目录存在
fn ensure_model_dir(config: &AppConfig) -> Result<(), AppError> {
    let model_path = config.inference.model_path();
    let Some(dir) = model_path.parent() else {
        return Ok(());
    };

    if !dir.exists() {
        tracing::warn!("📁 未找到模型目录，正在创建: {:?}", dir);
        fs::create_dir_all(dir)
            .map_err(|e| AppError::Internal(format!("创建模型目录失败: {e}")))?;
        tracing::info!("✅ 模型目录创建成功");
    }

    Ok(())
}

/// 确保模型权重文件存在
async fn ensure_model_weights(config: &AppConfig) -> Result<(), AppError> {
    let model_path = config.inference.model_path();

    if model_path.exists() {
        tracing::info!("✅ 模型权重已就位: {:?}", model_path);
        return Ok(());
    }

    let Some(url) = config.inference.model_url.as_deref() else {
        return Err(AppError::Internal(format!(
            "模型文件缺失且未配置 inference.model_url: {:?}",
            model_path
        )));
    };

    tracing::info!("📦 正在下载模型权重...");
    tracing::info!("📍 下载地址: {}", url);
    tracing::info!("📂 目标路径: {:?}", model_path);

    download_weights(url, &model_path).await?;

    tracing::info!("✅ 模型权重下载完成");
    Ok(())
}

/// 流式下载权重文件。
///
/// 先写 `.part` 再原子改名，半成品不会被下次启动当成有效模型。
async fn download_weights(url: &str, path: &Path) -> Result<(), AppError> {
    let resp = reqwest::get(url)
        .await
        .map_err(|e| AppError::Internal(format!("请求模型权重失败: {e}")))?;
    if !resp.status().is_success() {
        return Err(AppError::Internal(format!(
            "下载模型权重失败: HTTP {}",
            resp.status()
        )));
    }

    let total = resp.content_length().unwrap_or(0);
    let tmp_path = path.with_extension("part");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| AppError::Internal(format!("创建临时文件失败: {e}")))?;

    let mut stream = resp.bytes_stream();
    let mut received: u64 = 0;
    let mut last_progress: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AppError::Internal(format!("读取权重数据失败: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(format!("写入权重数据失败: {e}")))?;
        received += chunk.len() as u64;

        // 每 10% 打印一次进度（响应未携带长度时不打进度）
        if total > 0 {
            let percentage = received * 100 / total;
            if percentage >= last_progress + 10 {
                tracing::info!("⏬ 下载进度: {}% ({}/{})", percentage, received, total);
                last_progress = percentage;
            }
        }
    }

    file.flush()
        .await
        .map_err(|e| AppError::Internal(format!("落盘权重数据失败: {e}")))?;
    drop(file);

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| AppError::Internal(format!("权重文件改名失败: {e}")))?;

    Ok(())
}
