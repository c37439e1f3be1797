//! In-memory image values owned by an upload session.
//!
//! - [`SourceImage`]: the selected (possibly compressed) file plus its pixel size.
//! - [`CroppedArtifact`]: one encoded crop. Replaced, never mutated.
//! - [`PreviewUrl`]: a temporary URL handed to the display layer for a blob.
//!
//! Every preview URL is registered in a [`PreviewRegistry`] on allocation and
//! removed when the guard is dropped. Dropping the owning value (artifact
//! superseded, session closed, upload finished) is therefore the release, on
//! every exit path. [`PreviewRegistry::live`] makes leaks observable.

use crate::imaging::Dimensions;
use crate::types::AspectPreset;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Tracks which preview URLs are currently allocated.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<Mutex<HashSet<String>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh URL. Released when the returned guard drops.
    pub fn allocate(&self) -> PreviewUrl {
        let url = format!("blob:memory-vault/{}", uuid::Uuid::new_v4());
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone());
        PreviewUrl {
            url,
            registry: Arc::clone(&self.live),
        }
    }

    /// Number of URLs allocated and not yet released.
    pub fn live(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }
}

/// A temporary URL for a blob; revoked on drop.
#[derive(Debug)]
pub struct PreviewUrl {
    url: String,
    registry: Arc<Mutex<HashSet<String>>>,
}

impl PreviewUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl Drop for PreviewUrl {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.url);
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// The file being uploaded, after compression.
#[derive(Debug)]
pub struct SourceImage {
    /// Original file name as chosen by the user.
    pub name: String,
    pub bytes: Arc<Vec<u8>>,
    pub dimensions: Dimensions,
    pub preview: Option<PreviewUrl>,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, bytes: Arc<Vec<u8>>, dimensions: Dimensions) -> Self {
        Self {
            name: name.into(),
            bytes,
            dimensions,
            preview: None,
        }
    }

    pub fn with_preview(mut self, registry: &PreviewRegistry) -> Self {
        self.preview = Some(registry.allocate());
        self
    }

    pub fn natural(&self) -> (u32, u32) {
        self.dimensions.as_tuple()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One encoded crop of the source, tagged with the request generation that produced it.
#[derive(Debug)]
pub struct CroppedArtifact {
    pub generation: u64,
    pub preset: AspectPreset,
    pub bytes: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub digest: String,
    preview: PreviewUrl,
}

impl CroppedArtifact {
    pub fn new(
        generation: u64,
        preset: AspectPreset,
        bytes: Vec<u8>,
        registry: &PreviewRegistry,
    ) -> Self {
        let spec = preset.spec();
        Self {
            generation,
            preset,
            digest: digest_hex(&bytes),
            bytes: Arc::new(bytes),
            width: spec.output_width,
            height: spec.output_height,
            preview: registry.allocate(),
        }
    }

    pub fn preview_url(&self) -> &str {
        self.preview.as_str()
    }

    /// Detached copy of the data without the preview guard.
    pub fn view(&self) -> ArtifactView {
        ArtifactView {
            generation: self.generation,
            preset: self.preset,
            bytes: Arc::clone(&self.bytes),
            width: self.width,
            height: self.height,
            digest: self.digest.clone(),
            preview_url: self.preview.as_str().to_string(),
        }
    }
}

/// Cheap, cloneable snapshot of a [`CroppedArtifact`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactView {
    pub generation: u64,
    pub preset: AspectPreset,
    pub bytes: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub digest: String,
    pub preview_url: String,
}
