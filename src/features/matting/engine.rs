use std::sync::Mutex;

use image::{RgbImage, RgbaImage};
use ort::{GraphOptimizationLevel, Session};

use crate::config::InferenceConfig;
use crate::error::MattingError;

use super::preprocess::Preprocessor;
use super::types::BackgroundRemover;

/// ONNX 人像抠图会话。
///
/// 封装一个 ort Session：预处理 → 推理 → 蒙版还原 → alpha 合成。
/// 模型取单输入（归一化 RGB 张量）单输出（[1, 1, H, W] 蒙版），
/// 与常见的 U²-Net / MODNet 系导出格式一致。
///
/// Session 的 run 需要独占访问，这里用 Mutex 串行化；请求级并发
/// 由网关层的信号量控制，不在此处展开。
pub struct MattingSession {
    session: Mutex<Session>,
    preprocessor: Preprocessor,
}

impl MattingSession {
    /// 从配置加载 ONNX 模型文件。
    pub fn load(cfg: &InferenceConfig) -> Result<Self, MattingError> {
        let path = cfg.model_path();
        tracing::info!("正在加载抠图模型: {}", path.display());

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(cfg.intra_threads))
            .and_then(|b| b.commit_from_file(&path))
            .map_err(|e| MattingError::ModelLoad(format!("{}: {e}", path.display())))?;

        tracing::info!("抠图模型加载完成");

        Ok(Self {
            session: Mutex::new(session),
            preprocessor: Preprocessor::new(cfg.input_size, cfg.input_size),
        })
    }
}

/// 校验模型输出形状并取出蒙版尺寸（期望 [1, 1, H, W]）。
fn matte_dims(shape: &[usize]) -> Result<(usize, usize), MattingError> {
    match shape {
        [1, 1, h, w] if *h > 0 && *w > 0 => Ok((*h, *w)),
        other => Err(MattingError::InvalidOutput(format!(
            "期望蒙版形状 [1, 1, H, W]，实际 {other:?}"
        ))),
    }
}

impl BackgroundRemover for MattingSession {
    fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage, MattingError> {
        let input = self.preprocessor.preprocess(image);

        let matte = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| MattingError::Inference("推理会话锁被污染".to_string()))?;

            let inputs = ort::inputs![input.view()]
                .map_err(|e| MattingError::Inference(e.to_string()))?;
            let outputs = session
                .run(inputs)
                .map_err(|e| MattingError::Inference(e.to_string()))?;

            outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| MattingError::InvalidOutput(e.to_string()))?
                .view()
                .to_owned()
        };

        let (matte_height, matte_width) = matte_dims(matte.shape())?;
        let flat: Vec<f32> = matte.iter().copied().collect();

        let (width, height) = image.dimensions();
        let resized = Preprocessor::postprocess_matte(
            &flat,
            matte_width as u32,
            matte_height as u32,
            width,
            height,
        );

        Ok(Preprocessor::composite_alpha(image, &resized))
    }
}

#[cfg(test)]
mod tests {
    use super::matte_dims;

    #[test]
    fn matte_dims_accepts_single_channel_batch() {
        assert_eq!(matte_dims(&[1, 1, 512, 512]).expect("valid"), (512, 512));
    }

    #[test]
    fn matte_dims_rejects_unexpected_shapes() {
        assert!(matte_dims(&[1, 3, 512, 512]).is_err());
        assert!(matte_dims(&[512, 512]).is_err());
        assert!(matte_dims(&[1, 1, 0, 512]).is_err());
    }
}
