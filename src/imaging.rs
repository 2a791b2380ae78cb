//! Image inspection and rendering
//!
//! Pure, synchronous image work for the derived-image pipeline: sniffing the
//! format and size of raw cape bytes, cropping named transforms, and
//! splitting vertically stacked animation strips into frames.

use crate::error::ResolveError;
use crate::provider::{CropRect, ProviderCapabilities};
use crate::types::Dimensions;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{DynamicImage, Frame, GenericImageView, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;

/// Format and size of a raw image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub dimensions: Dimensions,
    /// Canonical file extension of the sniffed format, e.g. `png`.
    pub extension: String,
}

/// Sniff extension and dimensions without decoding pixel data.
pub fn sniff(bytes: &[u8]) -> Result<ImageInfo, ResolveError> {
    let format = image::guess_format(bytes)
        .map_err(|e| ResolveError::ImageProcessing(format!("unrecognised image format: {}", e)))?;
    let extension = format
        .extensions_str()
        .first()
        .copied()
        .unwrap_or_default()
        .to_string();

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| ResolveError::ImageProcessing(format!("failed to read dimensions: {}", e)))?;

    Ok(ImageInfo {
        dimensions: Dimensions::new(width, height),
        extension,
    })
}

/// Map a declared crop region onto an image of `actual` size.
///
/// With dynamic coordinates the region is expressed against `base` and
/// scaled per axis. The result is clamped to the image bounds; `None` when
/// nothing of the region remains.
pub fn scale_rect(
    rect: CropRect,
    dynamic: bool,
    base: Dimensions,
    actual: Dimensions,
) -> Option<CropRect> {
    let (x, y, width, height) = if dynamic && !base.is_empty() {
        let sx = actual.width as f64 / base.width as f64;
        let sy = actual.height as f64 / base.height as f64;
        (
            (rect.x as f64 * sx).round() as u32,
            (rect.y as f64 * sy).round() as u32,
            (rect.width as f64 * sx).round() as u32,
            (rect.height as f64 * sy).round() as u32,
        )
    } else {
        (rect.x, rect.y, rect.width, rect.height)
    };

    if x >= actual.width || y >= actual.height {
        return None;
    }
    let width = width.min(actual.width - x);
    let height = height.min(actual.height - y);
    if width == 0 || height == 0 {
        return None;
    }
    Some(CropRect::new(x, y, width, height))
}

/// Number of frames in a vertically stacked strip; 0 when not animated.
pub fn frame_count(dimensions: Dimensions, aspect_ratio: f32) -> u32 {
    let Some(frame_height) = frame_height(dimensions, aspect_ratio) else {
        return 0;
    };
    let frames = dimensions.height / frame_height;
    if frames > 1 {
        frames
    } else {
        0
    }
}

fn frame_height(dimensions: Dimensions, aspect_ratio: f32) -> Option<u32> {
    if dimensions.is_empty() || !(aspect_ratio.is_finite() && aspect_ratio > 0.0) {
        return None;
    }
    let height = (dimensions.width as f64 / aspect_ratio as f64).round() as u32;
    (height > 0).then_some(height)
}

/// Animation artifacts extracted from a strip.
#[derive(Debug, Clone)]
pub struct Animation {
    pub frames: u32,
    /// First frame as PNG.
    pub still: Vec<u8>,
    /// All frames as a looping GIF.
    pub animated: Vec<u8>,
}

/// Everything the pipeline uploads besides the canonical bytes.
#[derive(Debug, Clone, Default)]
pub struct RenderedImages {
    /// `(transform name, PNG bytes)`, in transform-name order.
    pub transforms: Vec<(String, Vec<u8>)>,
    pub animation: Option<Animation>,
}

/// Decode `bytes` and render all transforms and, when supported, animation.
pub fn render(
    bytes: &[u8],
    capabilities: &ProviderCapabilities,
) -> Result<RenderedImages, ResolveError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| ResolveError::ImageProcessing(format!("failed to decode image: {}", e)))?;
    let (width, height) = image.dimensions();
    let actual = Dimensions::new(width, height);

    let mut transforms = Vec::with_capacity(capabilities.transforms.len());
    for (name, rect) in &capabilities.transforms {
        let region = scale_rect(
            *rect,
            capabilities.dynamic_coordinates,
            capabilities.coordinate_base,
            actual,
        )
        .ok_or_else(|| {
            ResolveError::ImageProcessing(format!(
                "transform '{}' lies outside a {}x{} image",
                name, width, height
            ))
        })?;
        let cropped = image.crop_imm(region.x, region.y, region.width, region.height);
        transforms.push((name.clone(), encode_png(&cropped)?));
    }

    let animation = if capabilities.supports_animation {
        extract_animation(&image, capabilities)?
    } else {
        None
    };

    Ok(RenderedImages {
        transforms,
        animation,
    })
}

fn extract_animation(
    image: &DynamicImage,
    capabilities: &ProviderCapabilities,
) -> Result<Option<Animation>, ResolveError> {
    let (width, height) = image.dimensions();
    let dimensions = Dimensions::new(width, height);
    let frames = frame_count(dimensions, capabilities.aspect_ratio);
    let Some(frame_height) = frame_height(dimensions, capabilities.aspect_ratio) else {
        return Ok(None);
    };
    if frames == 0 {
        return Ok(None);
    }

    let strip: Vec<RgbaImage> = (0..frames)
        .map(|i| image.crop_imm(0, i * frame_height, width, frame_height).to_rgba8())
        .collect();

    let still = encode_png(&DynamicImage::ImageRgba8(strip[0].clone()))?;
    let animated = encode_gif(&strip, capabilities.frame_delay_ms)?;

    Ok(Some(Animation {
        frames,
        still,
        animated,
    }))
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ResolveError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| ResolveError::ImageProcessing(format!("failed to encode PNG: {}", e)))?;
    Ok(out.into_inner())
}

fn encode_gif(frames: &[RgbaImage], delay_ms: u32) -> Result<Vec<u8>, ResolveError> {
    let gif_error = |e: image::ImageError| {
        ResolveError::ImageProcessing(format!("failed to encode GIF: {}", e))
    };

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder.set_repeat(Repeat::Infinite).map_err(gif_error)?;

        // GIF delays have centisecond resolution
        let delay_cs = (delay_ms / 10).max(1);
        for frame in frames {
            let delay = image::Delay::from_numer_denom_ms(delay_cs * 10, 1);
            encoder
                .encode_frame(Frame::from_parts(frame.clone(), 0, 0, delay))
                .map_err(gif_error)?;
        }
    }
    Ok(out)
}
