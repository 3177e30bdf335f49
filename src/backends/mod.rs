//! Segmentation backend implementations
//!
//! - ONNX Runtime backend (CPU, CUDA and `CoreML` execution providers)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxSegmenter, OnnxSegmenterFactory};
