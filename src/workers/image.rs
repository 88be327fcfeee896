//! Decode, resize and encode steps of the image pipeline.
//!
//! Everything here is CPU bound and synchronous; callers run it on the
//! blocking pool.

use crate::common::error::Stage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat};
use thiserror::Error;

/// Quality used for lossy encoders.
pub const ENCODE_QUALITY: u8 = 80;

/// Largest source side accepted for decoding.
pub const MAX_SOURCE_DIMENSION: u32 = 10_000;
pub const MAX_SOURCE_PIXELS: u64 = 100_000_000;
/// Output pixel budget; a 4096 wide square is the largest regular output.
pub const MAX_OUTPUT_PIXELS: u64 = 4096 * 4096;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("invalid image bounds {width}x{height}")]
    InvalidBounds { width: u32, height: u32 },

    #[error("file type not handled: '{0}'")]
    FileNotHandled(String),

    #[error("could not encode image: {0}")]
    Encode(#[source] image::ImageError),
}

impl TransformError {
    pub fn stage(&self) -> Stage {
        match self {
            TransformError::Decode(_) => Stage::Decode,
            TransformError::InvalidBounds { .. } => Stage::Resize,
            TransformError::FileNotHandled(_) | TransformError::Encode(_) => Stage::Encode,
        }
    }
}

/// Output of a full transform.
#[derive(Debug)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Image format named by a file extension such as `.jpg`.
pub fn format_from_extension(ext: &str) -> Option<ImageFormat> {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" | "jfif" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "webp" => Some(ImageFormat::WebP),
        "gif" => Some(ImageFormat::Gif),
        _ => None,
    }
}

/// Decodes with the format named by `hint`, falling back to sniffing the
/// bytes when the hint is unknown or wrong.
pub fn decode(data: &[u8], hint: &str) -> Result<(DynamicImage, Option<ImageFormat>), TransformError> {
    let sniffed = image::guess_format(data).ok();
    if let Some(format) = format_from_extension(hint) {
        if let Ok(img) = image::load_from_memory_with_format(data, format) {
            return Ok((img, Some(format)));
        }
    }
    let img = image::load_from_memory(data).map_err(TransformError::Decode)?;
    Ok((img, sniffed))
}

/// Height that keeps the aspect ratio of `original` at `target_width`.
pub fn target_height(target_width: u32, original_width: u32, original_height: u32) -> Result<u32, TransformError> {
    if original_width == 0 {
        return Err(TransformError::InvalidBounds {
            width: original_width,
            height: original_height,
        });
    }
    let height = (target_width as f64 * original_height as f64 / original_width as f64).round();
    Ok((height as u32).max(1))
}

/// Rejects sources and outputs whose pixel buffers would not fit the
/// resize budget. Runs before any resampling buffer is allocated.
pub fn check_dimensions(source: (u32, u32), output: (u32, u32)) -> Result<(), TransformError> {
    let (width, height) = source;
    if width > MAX_SOURCE_DIMENSION
        || height > MAX_SOURCE_DIMENSION
        || width as u64 * height as u64 > MAX_SOURCE_PIXELS
    {
        return Err(TransformError::InvalidBounds { width, height });
    }

    let (width, height) = output;
    if width as u64 * height as u64 > MAX_OUTPUT_PIXELS {
        return Err(TransformError::InvalidBounds { width, height });
    }
    Ok(())
}

pub fn resize(img: &DynamicImage, target_width: u32) -> Result<DynamicImage, TransformError> {
    let height = target_height(target_width, img.width(), img.height())?;
    check_dimensions((img.width(), img.height()), (target_width, height))?;
    Ok(img.resize_exact(target_width, height, FilterType::Lanczos3))
}

pub fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();
    let (width, height) = (img.width(), img.height());

    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(TransformError::Encode)?;
        }
        ImageFormat::Png => {
            let rgba = img.to_rgba8();
            PngEncoder::new(&mut buf)
                .write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(TransformError::Encode)?;
        }
        ImageFormat::WebP => {
            let rgba = img.to_rgba8();
            WebPEncoder::new_lossless(&mut buf)
                .write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(TransformError::Encode)?;
        }
        other => {
            return Err(TransformError::FileNotHandled(
                other.extensions_str().first().copied().unwrap_or("unknown").to_string(),
            ));
        }
    }

    Ok(buf)
}

/// Full decode → resize → encode run.
///
/// `extension` picks the output format; when empty the source's own format
/// is kept.
pub fn transform(data: &[u8], source_hint: &str, target_width: u32, extension: &str) -> Result<EncodedImage, TransformError> {
    let (img, source_format) = decode(data, source_hint)?;

    let format = if extension.is_empty() {
        source_format.ok_or_else(|| TransformError::FileNotHandled(String::new()))?
    } else {
        format_from_extension(extension).ok_or_else(|| TransformError::FileNotHandled(extension.to_string()))?
    };

    let resized = resize(&img, target_width)?;
    let data = encode(&resized, format, ENCODE_QUALITY)?;

    Ok(EncodedImage {
        data,
        format,
        width: resized.width(),
        height: resized.height(),
    })
}
