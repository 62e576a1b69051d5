//! 上传字节到 PNG 结果之间的同步处理管线。

use super::media::{self, MediaType};
use super::types::BackgroundRemover;
use crate::error::MattingError;

/// 解码 → 背景移除 → PNG 编码。
///
/// 整段是 CPU 密集的同步代码，调用方必须放到 spawn_blocking 里执行。
pub fn process_upload(
    remover: &dyn BackgroundRemover,
    media: MediaType,
    bytes: &[u8],
) -> Result<Vec<u8>, MattingError> {
    let rgb = media::decode_image(media, bytes)?;
    let cutout = remover.remove_background(&rgb)?;
    media::encode_png(&cutout)
}
