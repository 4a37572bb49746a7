//! Thumbnail generation.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{ImageFormat, ImageOutputFormat};

use crate::error::{AppError, AppResult};

/// Longest edge of a thumbnail, in pixels.
pub const MAX_THUMBNAIL_EDGE: u32 = 300;

const JPEG_QUALITY: u8 = 85;

/// Encoded thumbnail.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub data: Vec<u8>,
    pub content_type: &'static str,
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Decode `data` and shrink it to fit within 300x300, keeping aspect ratio.
///
/// Images already within bounds are re-encoded at their own size. JPEG
/// input stays JPEG; every other format becomes PNG.
pub fn generate(data: &[u8]) -> AppResult<Thumbnail> {
    let format = image::guess_format(data)?;
    let source = image::load_from_memory_with_format(data, format)?;

    let resized = if source.width() > MAX_THUMBNAIL_EDGE || source.height() > MAX_THUMBNAIL_EDGE {
        source.resize(MAX_THUMBNAIL_EDGE, MAX_THUMBNAIL_EDGE, FilterType::Lanczos3)
    } else {
        source
    };

    let mut out = Cursor::new(Vec::new());
    let (content_type, extension) = if format == ImageFormat::Jpeg {
        image::DynamicImage::ImageRgb8(resized.to_rgb8())
            .write_to(&mut out, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
        ("image/jpeg", "jpg")
    } else {
        resized.write_to(&mut out, ImageOutputFormat::Png)?;
        ("image/png", "png")
    };

    Ok(Thumbnail {
        data: out.into_inner(),
        content_type,
        extension,
        width: resized.width(),
        height: resized.height(),
    })
}

/// Run [`generate`] on the blocking pool.
pub async fn generate_blocking(data: Vec<u8>) -> AppResult<Thumbnail> {
    tokio::task::spawn_blocking(move || generate(&data))
        .await
        .map_err(|e| AppError::InvalidInput(format!("Thumbnail task failed: {}", e)))?
}
