//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides what to compress and what to crop) and the
//! [`backend`](super::backend) (which does the pixel work). Swapping the
//! backend for a mock in tests leaves the operation logic untouched.
//!
//! ## Types
//!
//! - [`Quality`] — JPEG quality (1–100, default 90). Clamped on construction.
//! - [`CompressionProfile`] — byte threshold, bounding dimension and quality for the compressor.
//! - [`ResizeParams`] — exact output size for a compress pass.
//! - [`CropOptions`] — encoder settings shared by every crop in a session.
//! - [`CropParams`] — everything one crop render needs.

use super::calculations::SourceRect;

/// Quality setting for JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Quality as the encoder takes it.
    pub fn as_u8(self) -> u8 {
        self.0.clamp(1, 100) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// When and how hard to compress an incoming file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionProfile {
    /// Files at or under this size pass through untouched.
    pub threshold_bytes: u64,
    /// Longest edge after compression.
    pub max_dimension: u32,
    pub quality: Quality,
}

impl CompressionProfile {
    /// Feed posts: 1.5 MB budget, 1920 px bound.
    pub fn post() -> Self {
        Self {
            threshold_bytes: 1_572_864,
            max_dimension: 1920,
            quality: Quality::new(90),
        }
    }

    /// Profile pictures: 1 MB budget, 800 px bound.
    pub fn avatar() -> Self {
        Self {
            threshold_bytes: 1_048_576,
            max_dimension: 800,
            quality: Quality::new(85),
        }
    }
}

/// Parameters for a compress pass (resize to an exact size, re-encode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
}

/// Shape applied to the output canvas before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropMask {
    #[default]
    None,
    /// Inscribed circle; everything outside is painted with the background.
    Circle,
}

/// Encoder settings shared by every crop render in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropOptions {
    pub quality: Quality,
    /// RGB fill for transparent pixels and for the area outside a circular mask.
    pub background: [u8; 3],
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            quality: Quality::new(92),
            background: [255, 255, 255],
        }
    }
}

/// Parameters for one crop render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropParams {
    /// Sampling rectangle on the source, in source pixels.
    pub rect: SourceRect,
    pub output_width: u32,
    pub output_height: u32,
    pub quality: Quality,
    pub mask: CropMask,
    pub background: [u8; 3],
}
