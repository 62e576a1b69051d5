use image::{RgbImage, RgbaImage};

use crate::error::MattingError;

/// 透明度蒙版：0.0 = 背景，1.0 = 前景，按行主序展平，
/// 尺寸与对应图片一致。
pub type Matte = Vec<f32>;

/// 背景移除实现的统一接口。
///
/// 生产实现封装 ONNX 推理会话；测试可注入桩实现，
/// 以便只验证网关层的行为。
pub trait BackgroundRemover: Send + Sync {
    /// 对一张 RGB 图片做前景分割，返回背景透明的 RGBA 结果。
    ///
    /// 同步阻塞调用，调用方负责放到阻塞线程上执行。
    fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage, MattingError>;
}
