use image::{RgbImage, RgbaImage, imageops};
use ndarray::Array4;

use super::types::Matte;

/// 模型输入预处理器：把 RGB 图片转换为归一化的 NCHW 张量，
/// 并把模型输出的蒙版还原回原图尺寸。
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// 预处理：缩放到模型输入尺寸，像素归一化到 [0, 1]，
    /// HWC 转 NCHW。返回形状 [1, 3, H, W]。
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }

        tensor
    }

    /// 把模型分辨率下的蒙版缩放回目标尺寸。
    pub fn postprocess_matte(
        matte: &[f32],
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Matte {
        if matte_width == target_width && matte_height == target_height {
            return matte.to_vec();
        }

        // 经灰度图中转缩放，复用 image 的重采样实现
        let gray = image::GrayImage::from_fn(matte_width, matte_height, |x, y| {
            let idx = (y * matte_width + x) as usize;
            let value = (matte.get(idx).copied().unwrap_or(0.0) * 255.0).clamp(0.0, 255.0) as u8;
            image::Luma([value])
        });

        let resized = imageops::resize(
            &gray,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        );

        resized.pixels().map(|p| p[0] as f32 / 255.0).collect()
    }

    /// 把蒙版写入原图的 alpha 通道，得到背景透明的 RGBA 结果。
    pub fn composite_alpha(image: &RgbImage, matte: &[f32]) -> RgbaImage {
        let (width, height) = image.dimensions();
        RgbaImage::from_fn(width, height, |x, y| {
            let idx = (y * width + x) as usize;
            let alpha = (matte.get(idx).copied().unwrap_or(0.0) * 255.0).clamp(0.0, 255.0) as u8;
            let pixel = image.get_pixel(x, y);
            image::Rgba([pixel[0], pixel[1], pixel[2], alpha])
        })
    }
}
