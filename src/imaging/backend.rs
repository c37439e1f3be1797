//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the pipeline needs:
//! identify, resize (compress pass) and crop. All of them work on in-memory
//! encoded bytes, since the upload flow never touches the filesystem between
//! file selection and upload.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording `MockBackend` below.

use super::params::{CropParams, ResizeParams};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported or unreadable image: {0}")]
    Decode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Trait for image processing backends.
///
/// Backends are shared with blocking worker tasks, hence `Send + Sync`.
pub trait ImageBackend: Send + Sync {
    /// Read pixel dimensions from the encoded header.
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError>;

    /// Resize to the exact size in `params` and re-encode as JPEG.
    fn resize_jpeg(&self, bytes: &[u8], params: &ResizeParams) -> Result<Vec<u8>, BackendError>;

    /// Sample `params.rect`, scale it onto the output canvas, mask, encode as JPEG.
    fn crop_jpeg(&self, bytes: &[u8], params: &CropParams) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::calculations::SourceRect;
    use crate::imaging::params::{CropMask, Quality};
    use std::sync::Mutex;

    /// Mock backend that records operations and returns synthetic bytes.
    /// Uses Mutex (not RefCell) so it is Sync and can cross into blocking tasks.
    #[derive(Default)]
    pub struct MockBackend {
        pub dimensions: Mutex<Option<Dimensions>>,
        /// Size of the buffer returned by `resize_jpeg`.
        pub resize_output_len: Mutex<usize>,
        pub fail_resize: Mutex<bool>,
        /// Panic inside `resize_jpeg`, as a buggy decoder would.
        pub panic_resize: Mutex<bool>,
        pub fail_crop: Mutex<bool>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(usize),
        Resize {
            input_len: usize,
            width: u32,
            height: u32,
            quality: u32,
        },
        Crop {
            rect: (i64, i64, i64, i64),
            output_width: u32,
            output_height: u32,
            quality: u32,
            circle: bool,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_dimensions(width: u32, height: u32) -> Self {
            let backend = Self::default();
            *backend.dimensions.lock().unwrap() = Some(Dimensions { width, height });
            backend
        }

        pub fn resize_to(self, len: usize) -> Self {
            *self.resize_output_len.lock().unwrap() = len;
            self
        }

        pub fn failing_resize(self) -> Self {
            *self.fail_resize.lock().unwrap() = true;
            self
        }

        pub fn panicking_resize(self) -> Self {
            *self.panic_resize.lock().unwrap() = true;
            self
        }

        pub fn failing_crop(self) -> Self {
            *self.fail_crop.lock().unwrap() = true;
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn crop_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Crop { .. }))
                .count()
        }
    }

    fn rounded(rect: &SourceRect) -> (i64, i64, i64, i64) {
        (
            rect.x.round() as i64,
            rect.y.round() as i64,
            rect.width.round() as i64,
            rect.height.round() as i64,
        )
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(bytes.len()));

            self.dimensions
                .lock()
                .unwrap()
                .ok_or_else(|| BackendError::Decode("No mock dimensions".to_string()))
        }

        fn resize_jpeg(
            &self,
            bytes: &[u8],
            params: &ResizeParams,
        ) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Resize {
                input_len: bytes.len(),
                width: params.width,
                height: params.height,
                quality: params.quality.value(),
            });
            if *self.fail_resize.lock().unwrap() {
                return Err(BackendError::ProcessingFailed("mock resize failure".into()));
            }
            let panic = *self.panic_resize.lock().unwrap();
            if panic {
                panic!("mock decoder bug");
            }
            Ok(vec![0xAB; *self.resize_output_len.lock().unwrap()])
        }

        fn crop_jpeg(&self, _bytes: &[u8], params: &CropParams) -> Result<Vec<u8>, BackendError> {
            let op = RecordedOp::Crop {
                rect: rounded(&params.rect),
                output_width: params.output_width,
                output_height: params.output_height,
                quality: params.quality.value(),
                circle: params.mask == CropMask::Circle,
            };
            self.operations.lock().unwrap().push(op.clone());
            if *self.fail_crop.lock().unwrap() {
                return Err(BackendError::ProcessingFailed("mock crop failure".into()));
            }
            // Deterministic stand-in for encoded pixels
            Ok(format!("{op:?}").into_bytes())
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(800, 600);

        let dims = backend.identify(&[1, 2, 3]).unwrap();
        assert_eq!(dims.as_tuple(), (800, 600));

        let ops = backend.get_operations();
        assert_eq!(ops, vec![RecordedOp::Identify(3)]);
    }

    #[test]
    fn mock_identify_without_dimensions_errors() {
        let backend = MockBackend::new();
        assert!(matches!(
            backend.identify(&[0]),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn mock_records_resize() {
        let backend = MockBackend::new().resize_to(10);

        let out = backend
            .resize_jpeg(
                &[0; 100],
                &ResizeParams {
                    width: 1920,
                    height: 1080,
                    quality: Quality::new(90),
                },
            )
            .unwrap();

        assert_eq!(out.len(), 10);
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Resize {
                input_len: 100,
                width: 1920,
                height: 1080,
                quality: 90
            }
        ));
    }

    #[test]
    fn mock_crop_output_is_deterministic() {
        let backend = MockBackend::new();
        let params = CropParams {
            rect: SourceRect {
                x: 10.0,
                y: 0.0,
                width: 100.0,
                height: 100.0,
            },
            output_width: 400,
            output_height: 400,
            quality: Quality::new(85),
            mask: CropMask::Circle,
            background: [255, 255, 255],
        };

        let a = backend.crop_jpeg(&[], &params).unwrap();
        let b = backend.crop_jpeg(&[], &params).unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.crop_count(), 2);
    }
}
