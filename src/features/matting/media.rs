use image::{ImageFormat, RgbImage, RgbaImage};
use resvg::usvg;
use tiny_skia::Pixmap;

use crate::error::MattingError;

/// 支持的上传图片类型（白名单）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
    Webp,
    Gif,
    Avif,
    Svg,
}

impl MediaType {
    /// 从声明的 content-type 识别类型（大小写不敏感，忽略参数部分）。
    pub fn from_content_type(value: &str) -> Option<Self> {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" => Some(MediaType::Jpeg),
            "image/png" => Some(MediaType::Png),
            "image/webp" => Some(MediaType::Webp),
            "image/gif" => Some(MediaType::Gif),
            "image/avif" => Some(MediaType::Avif),
            "image/svg+xml" => Some(MediaType::Svg),
            _ => None,
        }
    }

    /// 声明缺失时的兜底：从字节内容嗅探类型。
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if let Ok(format) = image::guess_format(bytes) {
            return match format {
                ImageFormat::Jpeg => Some(MediaType::Jpeg),
                ImageFormat::Png => Some(MediaType::Png),
                ImageFormat::WebP => Some(MediaType::Webp),
                ImageFormat::Gif => Some(MediaType::Gif),
                ImageFormat::Avif => Some(MediaType::Avif),
                _ => None,
            };
        }

        // SVG 没有 magic bytes，看文本前缀
        let head = bytes.get(..bytes.len().min(1024))?;
        let text = std::str::from_utf8(head).ok()?;
        let trimmed = text.trim_start();
        if trimmed.starts_with("<svg") || trimmed.starts_with("<?xml") {
            return Some(MediaType::Svg);
        }
        None
    }

    pub fn as_content_type(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Webp => "image/webp",
            MediaType::Gif => "image/gif",
            MediaType::Avif => "image/avif",
            MediaType::Svg => "image/svg+xml",
        }
    }

    /// 白名单的展示串，用于 415 错误信息。
    pub fn allowed_list() -> &'static str {
        "image/jpeg, image/png, image/webp, image/gif, image/avif, image/svg+xml"
    }
}

/// 解码上传字节为 RGB 像素（SVG 先栅格化，位图走 image 解码）。
pub fn decode_image(media: MediaType, bytes: &[u8]) -> Result<RgbImage, MattingError> {
    match media {
        MediaType::Svg => rasterize_svg(bytes),
        _ => {
            let img = image::load_from_memory(bytes)?;
            Ok(img.to_rgb8())
        }
    }
}

/// SVG 栅格化为 RGB。铺白底，成像语义与位图输入一致。
fn rasterize_svg(bytes: &[u8]) -> Result<RgbImage, MattingError> {
    let opts = usvg::Options::default();
    let tree = usvg::Tree::from_data(bytes, &opts)
        .map_err(|e| MattingError::Rasterize(format!("SVG 解析失败: {e}")))?;

    let size = tree.size().to_int_size();
    let mut pixmap = Pixmap::new(size.width(), size.height())
        .ok_or_else(|| MattingError::Rasterize("SVG 画布尺寸无效".to_string()))?;
    pixmap.fill(tiny_skia::Color::WHITE);

    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let (width, height) = (pixmap.width(), pixmap.height());
    let pixels = pixmap.pixels();
    let rgb = RgbImage::from_fn(width, height, |x, y| {
        let px = pixels[(y * width + x) as usize].demultiply();
        image::Rgb([px.red(), px.green(), px.blue()])
    });
    Ok(rgb)
}

/// RGBA 结果编码为 PNG 字节。
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, MattingError> {
    let (width, height) = image.dimensions();
    let mut out = Vec::with_capacity((width * height * 4) as usize);
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Default);
        encoder.set_filter(png::FilterType::Paeth);
        let mut writer = encoder
            .write_header()
            .map_err(|e| MattingError::Encode(format!("PNG write_header error: {e}")))?;
        writer
            .write_image_data(image.as_raw())
            .map_err(|e| MattingError::Encode(format!("PNG write_image_data error: {e}")))?;
        writer
            .finish()
            .map_err(|e| MattingError::Encode(format!("PNG finish error: {e}")))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::MediaType;

    #[test]
    fn allow_list_covers_all_six_types() {
        for (declared, expected) in [
            ("image/jpeg", MediaType::Jpeg),
            ("image/png", MediaType::Png),
            ("image/webp", MediaType::Webp),
            ("image/gif", MediaType::Gif),
            ("image/avif", MediaType::Avif),
            ("image/svg+xml", MediaType::Svg),
        ] {
            assert_eq!(MediaType::from_content_type(declared), Some(expected));
        }
    }

    #[test]
    fn content_type_matching_is_lenient_about_params_and_case() {
        assert_eq!(
            MediaType::from_content_type("IMAGE/PNG"),
            Some(MediaType::Png)
        );
        assert_eq!(
            MediaType::from_content_type("image/svg+xml; charset=utf-8"),
            Some(MediaType::Svg)
        );
    }

    #[test]
    fn unsupported_types_are_rejected() {
        assert_eq!(MediaType::from_content_type("image/bmp"), None);
        assert_eq!(MediaType::from_content_type("image/tiff"), None);
        assert_eq!(MediaType::from_content_type("application/pdf"), None);
        assert_eq!(MediaType::from_content_type(""), None);
    }

    #[test]
    fn sniff_recognizes_png_magic() {
        let magic = [0x89u8, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(MediaType::sniff(&magic), Some(MediaType::Png));
    }

    #[test]
    fn sniff_recognizes_svg_text() {
        assert_eq!(
            MediaType::sniff(b"  <svg xmlns=\"http://www.w3.org/2000/svg\"/>"),
            Some(MediaType::Svg)
        );
        assert_eq!(
            MediaType::sniff(b"<?xml version=\"1.0\"?><svg/>"),
            Some(MediaType::Svg)
        );
    }

    #[test]
    fn sniff_rejects_garbage() {
        assert_eq!(MediaType::sniff(b"hello world"), None);
        assert_eq!(MediaType::sniff(&[]), None);
    }

    #[test]
    fn rasterize_svg_matches_declared_canvas() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="6">
            <rect width="8" height="6" fill="#336699"/>
        </svg>"##;
        let rgb = super::rasterize_svg(svg.as_bytes()).expect("rasterize");
        assert_eq!(rgb.dimensions(), (8, 6));
        assert_eq!(rgb.get_pixel(4, 3).0, [0x33, 0x66, 0x99]);
    }

    #[test]
    fn encode_png_roundtrips_through_decoder() {
        let rgba = image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 128]));
        let bytes = super::encode_png(&rgba).expect("encode");
        let decoded = image::load_from_memory(&bytes).expect("decode").to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(0, 0).0, [1, 2, 3, 128]);
    }
}
