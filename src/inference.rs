//! Segmentation service abstraction
//!
//! The neural network that separates foreground from background is an opaque
//! collaborator. A [`SegmenterFactory`] is shared by every worker of a batch and
//! builds one [`Segmenter`] per task, so sessions are never shared between threads.

use crate::{config::BatchConfig, error::Result, models::ModelKind};
use image::RgbaImage;

/// One initialized model session
pub trait Segmenter: Send {
    /// Return `image` with its background made transparent
    ///
    /// # Errors
    /// - Model inference failures
    /// - Tensor conversion or shape errors
    fn remove(&mut self, image: &RgbaImage) -> Result<RgbaImage>;
}

/// Creates segmenter sessions for a catalog model
pub trait SegmenterFactory: Send + Sync {
    /// Build a fresh session for `model`
    ///
    /// # Errors
    /// - Model file missing or unreadable
    /// - Model unsupported by this backend
    /// - Runtime initialization failures
    fn create_session(&self, model: ModelKind, config: &BatchConfig) -> Result<Box<dyn Segmenter>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Segmenter that returns its input unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentitySegmenter;

impl Segmenter for IdentitySegmenter {
    fn remove(&mut self, image: &RgbaImage) -> Result<RgbaImage> {
        Ok(image.clone())
    }
}

/// Factory for [`IdentitySegmenter`], accepts every model
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentitySegmenterFactory;

impl SegmenterFactory for IdentitySegmenterFactory {
    fn create_session(
        &self,
        _model: ModelKind,
        _config: &BatchConfig,
    ) -> Result<Box<dyn Segmenter>> {
        Ok(Box::new(IdentitySegmenter))
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_identity_segmenter_returns_input() {
        let factory = IdentitySegmenterFactory;
        let mut session = factory
            .create_session(ModelKind::Sam, &BatchConfig::default())
            .unwrap();

        let image = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 200]));
        let output = session.remove(&image).unwrap();
        assert_eq!(output, image);
        assert_eq!(factory.name(), "identity");
    }
}
