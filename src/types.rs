//! Core data types flowing through a batch run

use crate::error::RemovalError;
use crate::processor::{COMPARISON_SUFFIX, OUTPUT_SUFFIX};
use image::{imageops, RgbaImage};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// One user-supplied image: a filename plus its encoded bytes
///
/// Cloning is cheap, the byte buffer is shared. Two uploads are equal when
/// they carry the same name and the same content.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub name: String,
    pub data: Arc<[u8]>,
}

impl UploadedImage {
    pub fn new<S: Into<String>, B: Into<Arc<[u8]>>>(name: S, data: B) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Size of the encoded content in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl PartialEq for UploadedImage {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && (Arc::ptr_eq(&self.data, &other.data) || self.data[..] == other.data[..])
    }
}

impl Eq for UploadedImage {}

/// Successful result of the per-item task
#[derive(Debug, Clone)]
pub struct ProcessedItem {
    /// Output filename, always `<stem>_no_bg.png`
    pub name: String,

    /// Decoded input image
    pub original: RgbaImage,

    /// Image with the background made transparent
    pub processed: RgbaImage,

    /// PNG encoding of `processed`
    pub data: Vec<u8>,
}

impl ProcessedItem {
    /// Before/after view: the original on the left, the result on the right
    #[must_use]
    pub fn comparison(&self) -> RgbaImage {
        let left = self.original.width();
        let width = left + self.processed.width();
        let height = self.original.height().max(self.processed.height());

        let mut canvas = RgbaImage::new(width, height);
        imageops::replace(&mut canvas, &self.original, 0, 0);
        imageops::replace(&mut canvas, &self.processed, i64::from(left), 0);
        canvas
    }

    /// Filename of the comparison image, `<stem>_compare.png`
    #[must_use]
    pub fn comparison_name(&self) -> String {
        let stem = self.name.strip_suffix(OUTPUT_SUFFIX).unwrap_or(&self.name);
        format!("{}{}", stem, COMPARISON_SUFFIX)
    }
}

/// An input that could not be processed
#[derive(Debug)]
pub struct FailedItem {
    /// Filename of the failed upload
    pub name: String,
    pub error: RemovalError,
}

/// Everything a dispatch produced, both lists in completion order
#[derive(Debug)]
pub struct BatchOutcome {
    pub processed: Vec<ProcessedItem>,
    pub failed: Vec<FailedItem>,
    pub total: usize,
    pub elapsed: Duration,
}

impl BatchOutcome {
    /// Serializable summary without image payloads
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            total: self.total,
            processed: self.processed.len(),
            failed: self.failed.len(),
            elapsed_ms: self.elapsed.as_millis() as u64,
            failed_items: self
                .failed
                .iter()
                .map(|f| (f.name.clone(), f.error.to_string()))
                .collect(),
        }
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Lightweight view of a finished batch, used for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    /// (filename, error message) pairs
    pub failed_items: Vec<(String, String)>,
}

impl BatchSummary {
    /// Fraction of items that succeeded (0.0 - 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}
