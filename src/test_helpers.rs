//! Shared test utilities for the memory-vault test suite.
//!
//! Provides synthetic image fixtures and a few lookups over the local data
//! service's on-disk layout.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let jpeg = test_jpeg(1200, 900);
//! let tmp = temp_store();
//! let service = LocalDataService::new(tmp.path());
//! // ... upload ...
//! assert_eq!(stored_files(tmp.path()).len(), 1);
//! ```

use image::{ImageEncoder, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =========================================================================
// Image fixtures
// =========================================================================

/// A gradient JPEG of the given size. Gradients keep the encoder honest:
/// flat colours compress to almost nothing.
pub fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

// =========================================================================
// Storage fixtures
// =========================================================================

/// Empty directory for a `LocalDataService` root.
pub fn temp_store() -> TempDir {
    TempDir::new().unwrap()
}

/// Every file under `<root>/storage`, relative to that directory, sorted.
pub fn stored_files(root: &Path) -> Vec<PathBuf> {
    let storage = root.join("storage");
    let mut found = Vec::new();
    collect_files(&storage, &storage, &mut found);
    found.sort();
    found
}

fn collect_files(base: &Path, dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(base, &path, found);
        } else if let Ok(rel) = path.strip_prefix(base) {
            found.push(rel.to_path_buf());
        }
    }
}

/// Parsed `<root>/records.json`, or an empty list when nothing was written.
pub fn stored_records(root: &Path) -> Vec<serde_json::Value> {
    match std::fs::read_to_string(root.join("records.json")) {
        Ok(text) => serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("records.json is not valid JSON: {e}\n{text}")),
        Err(_) => Vec::new(),
    }
}
