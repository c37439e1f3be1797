//! High-level image operations.
//!
//! These functions combine calculations with backend execution. They take a
//! profile or preset, compute parameters, and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{SourceRect, fit_within};
use super::params::{CompressionProfile, CropMask, CropOptions, CropParams, ResizeParams};
use crate::types::AspectRatioSpec;
use std::sync::Arc;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// What the compressor did with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressStatus {
    /// Already within the byte budget; passed through.
    UnderThreshold,
    /// Re-encoded to a smaller file.
    Compressed { original_len: usize },
    /// Re-encoding did not shrink the file; original kept.
    NotSmaller { attempted_len: usize },
    /// Resize or encode failed; original kept.
    FellBack,
}

/// Compressor output. `bytes` is always usable.
#[derive(Debug, Clone)]
pub struct CompressOutcome {
    pub bytes: Arc<Vec<u8>>,
    pub status: CompressStatus,
}

/// Plan the resize for an oversized file, without executing it.
pub fn plan_compression(natural: (u32, u32), profile: &CompressionProfile) -> ResizeParams {
    let (width, height) = fit_within(natural, profile.max_dimension);
    ResizeParams {
        width,
        height,
        quality: profile.quality,
    }
}

/// Shrink `original` to the profile's budget if it is over the threshold.
///
/// Never fails: any backend error is logged and the original bytes are
/// returned with [`CompressStatus::FellBack`].
pub fn compress_if_needed(
    backend: &impl ImageBackend,
    name: &str,
    original: Arc<Vec<u8>>,
    profile: &CompressionProfile,
) -> CompressOutcome {
    let original_len = original.len();
    if original_len as u64 <= profile.threshold_bytes {
        return CompressOutcome {
            bytes: original,
            status: CompressStatus::UnderThreshold,
        };
    }

    let attempt = backend.identify(&original).and_then(|dims| {
        let params = plan_compression(dims.as_tuple(), profile);
        backend.resize_jpeg(&original, &params)
    });

    match attempt {
        Ok(compressed) if compressed.len() < original_len => {
            log::info!(
                "compressed {}: {} -> {} bytes",
                name,
                original_len,
                compressed.len()
            );
            CompressOutcome {
                bytes: Arc::new(compressed),
                status: CompressStatus::Compressed { original_len },
            }
        }
        Ok(compressed) => {
            log::debug!(
                "re-encoding {} gave {} bytes (original {}), keeping original",
                name,
                compressed.len(),
                original_len
            );
            CompressOutcome {
                bytes: original,
                status: CompressStatus::NotSmaller {
                    attempted_len: compressed.len(),
                },
            }
        }
        Err(e) => {
            log::warn!("compression of {} failed, using original: {}", name, e);
            CompressOutcome {
                bytes: original,
                status: CompressStatus::FellBack,
            }
        }
    }
}

/// Build the backend parameters for one crop render.
pub fn plan_crop(rect: SourceRect, spec: &AspectRatioSpec, options: &CropOptions) -> CropParams {
    CropParams {
        rect,
        output_width: spec.output_width,
        output_height: spec.output_height,
        quality: options.quality,
        mask: if spec.circular {
            CropMask::Circle
        } else {
            CropMask::None
        },
        background: options.background,
    }
}

/// Render a crop to JPEG bytes.
pub fn render_crop(
    backend: &impl ImageBackend,
    source: &[u8],
    params: &CropParams,
) -> Result<Vec<u8>> {
    backend.crop_jpeg(source, params)
}
