//! Image processing, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Compress** | fit-within resize (Lanczos3) + JPEG re-encode |
//! | **Crop** | sampling window → output canvas, optional circular mask, JPEG |
//!
//! The module is split into:
//! - **Calculations**: Pure geometry for zoom, pan and sampling windows (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
pub mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{SourceRect, fit_within, min_zoom};
pub use operations::{
    CompressOutcome, CompressStatus, compress_if_needed, plan_compression, plan_crop, render_crop,
};
pub use params::{CompressionProfile, CropMask, CropOptions, CropParams, Quality, ResizeParams};
pub use rust_backend::{RustBackend, supported_input_extensions};
