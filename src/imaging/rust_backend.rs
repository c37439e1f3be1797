//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG, WebP) | `image::load_from_memory` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Crop window | `DynamicImage::crop_imm` then `resize_exact` onto the output canvas |
//! | Circular mask | per-pixel fill outside the inscribed circle |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//!
//! JPEG has no alpha channel, so transparent pixels are flattened onto the
//! background colour before encoding.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::SourceRect;
use super::params::{CropMask, CropParams, Quality, ResizeParams};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

/// Extensions whose decoders are compiled in.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("webp", ImageFormat::WebP),
];

/// Returns the image file extensions the backend can decode.
pub fn supported_input_extensions() -> Vec<&'static str> {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
}

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    image::load_from_memory(bytes)
        .map_err(|e| BackendError::Decode(format!("Failed to decode image: {}", e)))
}

/// Composite onto an opaque background, dropping alpha.
fn flatten(img: &DynamicImage, background: [u8; 3]) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let mix =
            |fg: u8, bg: u8| ((fg as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([
            mix(r, background[0]),
            mix(g, background[1]),
            mix(b, background[2]),
        ])
    })
}

/// Paint everything outside the inscribed circle with `background`.
fn apply_circle_mask(img: &mut RgbImage, background: [u8; 3]) {
    let (w, h) = (img.width() as f64, img.height() as f64);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let radius = w.min(h) / 2.0;
    let r2 = radius * radius;

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - cx;
        let dy = y as f64 + 0.5 - cy;
        if dx * dx + dy * dy > r2 {
            *pixel = image::Rgb(background);
        }
    }
}

/// Snap a float rectangle to whole pixels inside the image.
fn pixel_window(rect: &SourceRect, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let x = (rect.x.round().max(0.0) as u32).min(width.saturating_sub(1));
    let y = (rect.y.round().max(0.0) as u32).min(height.saturating_sub(1));
    let w = (rect.width.round() as u32).clamp(1, width - x);
    let h = (rect.height.round() as u32).clamp(1, height - y);
    (x, y, w, h)
}

fn encode_jpeg(img: &RgbImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.as_u8());
    encoder
        .encode(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| BackendError::Decode(format!("Failed to read dimensions: {}", e)))?;
        Ok(Dimensions { width, height })
    }

    fn resize_jpeg(&self, bytes: &[u8], params: &ResizeParams) -> Result<Vec<u8>, BackendError> {
        let img = decode(bytes)?;
        let resized = img.resize_exact(params.width, params.height, FilterType::Lanczos3);
        encode_jpeg(&flatten(&resized, [255, 255, 255]), params.quality)
    }

    fn crop_jpeg(&self, bytes: &[u8], params: &CropParams) -> Result<Vec<u8>, BackendError> {
        if params.output_width == 0 || params.output_height == 0 {
            return Err(BackendError::ProcessingFailed(
                "Output canvas must not be empty".into(),
            ));
        }
        let img = decode(bytes)?;
        if img.width() == 0 || img.height() == 0 {
            return Err(BackendError::Decode("Image has no pixels".into()));
        }

        let (x, y, w, h) = pixel_window(&params.rect, img.width(), img.height());
        let canvas = img.crop_imm(x, y, w, h).resize_exact(
            params.output_width,
            params.output_height,
            FilterType::Lanczos3,
        );

        let mut rgb = flatten(&canvas, params.background);
        if params.mask == CropMask::Circle {
            apply_circle_mask(&mut rgb, params.background);
        }

        encode_jpeg(&rgb, params.quality)
    }
}
