//! Image decoding, downsampling and JPEG re-encoding.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader, Limits};
use tracing::{debug, trace};

use crate::embedded::EmbeddedImage;
use crate::error::{Error, Result};

/// Bytes per decoded pixel.
const BYTES_PER_PIXEL: u64 = 4;

/// How far past its budget an image may decode before it is refused.
const DECODE_HEADROOM: u64 = 16;

/// MIME type of every compressed image.
pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

/// Decoded size of a `width` x `height` image.
#[must_use]
pub fn decoded_size(width: u32, height: u32) -> u64 {
    u64::from(width) * u64::from(height) * BYTES_PER_PIXEL
}

/// Largest decoded size accepted for an image with `budget`.
///
/// Larger images are refused before any pixel buffer is allocated.
#[must_use]
pub fn decode_ceiling(budget: usize) -> u64 {
    u64::try_from(budget.max(1))
        .unwrap_or(u64::MAX)
        .saturating_mul(DECODE_HEADROOM)
}

/// Largest power-of-two reduction that keeps the decoded size at or above
/// `budget`.
///
/// The remaining excess is removed by [`target_dimensions`].
#[must_use]
pub fn sample_size(width: u32, height: u32, budget: usize) -> u32 {
    let budget = u64::try_from(budget.max(1)).unwrap_or(u64::MAX);
    let mut sample = 1u32;
    while sample < (1 << 16) && decoded_size(width / (sample * 2), height / (sample * 2)) >= budget
    {
        sample *= 2;
    }
    sample
}

/// Dimensions that fit `budget` while keeping the aspect ratio.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn target_dimensions(width: u32, height: u32, budget: usize) -> (u32, u32) {
    let size = decoded_size(width, height);
    let budget = budget as u64;
    if size <= budget {
        return (width, height);
    }
    let scale = (budget as f64 / size as f64).sqrt();
    let scaled = |side: u32| ((f64::from(side) * scale).floor() as u32).max(1);
    (scaled(width), scaled(height))
}

/// Reads, decodes, downsamples and re-encodes one image as JPEG.
///
/// # Errors
///
/// Returns [`Error::ImageRead`] if the file cannot be read and
/// [`Error::ImageDecodeFailed`] if it is empty, not a decodable image, or
/// larger than [`decode_ceiling`] once decoded.
pub fn compress(embedded: &EmbeddedImage, budget: usize, quality: u8) -> Result<Vec<u8>> {
    let raw = std::fs::read(&embedded.path).map_err(|source| Error::ImageRead {
        path: embedded.path.clone(),
        source,
    })?;
    if raw.is_empty() {
        return Err(Error::decode(&embedded.content_id, "empty file"));
    }

    let bytes = if embedded.is_base64() {
        decode_base64_text(&raw).unwrap_or(raw)
    } else {
        raw
    };

    let decoded = decode_bounded(&bytes, &embedded.content_id, budget)?;
    let resized = downsample(decoded, budget);
    trace!(
        content_id = %embedded.content_id,
        width = resized.width(),
        height = resized.height(),
        "Encoding image"
    );

    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| Error::decode(&embedded.content_id, e))?;
    Ok(out)
}

fn decode_bounded(bytes: &[u8], content_id: &str, budget: usize) -> Result<DynamicImage> {
    let ceiling = decode_ceiling(budget);
    let (width, height) = reader(bytes, content_id)?
        .into_dimensions()
        .map_err(|e| Error::decode(content_id, e))?;

    let size = decoded_size(width, height);
    if size > ceiling {
        debug!(content_id, width, height, size, ceiling, "Refusing oversized image");
        return Err(Error::decode(
            content_id,
            format!("{width}x{height} needs {size} bytes decoded, limit is {ceiling}"),
        ));
    }

    let mut limits = Limits::default();
    limits.max_alloc = Some(ceiling.saturating_mul(2));
    let mut reader = reader(bytes, content_id)?;
    reader.limits(limits);
    reader.decode().map_err(|e| Error::decode(content_id, e))
}

fn reader<'a>(bytes: &'a [u8], content_id: &str) -> Result<ImageReader<Cursor<&'a [u8]>>> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::decode(content_id, e))
}

fn downsample(image: DynamicImage, budget: usize) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (target_width, target_height) = target_dimensions(width, height, budget);
    if (target_width, target_height) == (width, height) {
        return image;
    }

    let sample = sample_size(width, height, budget);
    let subsampled = if sample > 1 {
        image.resize_exact(
            (width / sample).max(1),
            (height / sample).max(1),
            FilterType::Nearest,
        )
    } else {
        image
    };
    subsampled.resize_exact(target_width, target_height, FilterType::Triangle)
}

fn decode_base64_text(raw: &[u8]) -> Option<Vec<u8>> {
    let cleaned: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).ok()
}
