//! Tensor preparation and mask postprocessing for the segmentation models
//!
//! Inputs are resized to the model's square input size, scaled by the image
//! maximum and normalized per channel into an NCHW tensor. Model outputs are
//! mapped to an 8-bit mask per family, resized back to the original size and
//! multiplied into the alpha channel.

use crate::{
    error::{RemovalError, Result},
    models::{ModelFamily, PreprocessingConfig},
};
use image::{imageops::FilterType, GrayImage, RgbaImage};
use ndarray::{Array2, Array4, ArrayViewD, Axis, Ix4, Zip};

/// Lower bound for the pixel maximum used as divisor
const MIN_PIXEL_MAX: f32 = 1e-6;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Convert an RGBA image into a normalized `[1, 3, size, size]` tensor
    ///
    /// The image is stretched to the target size without padding and every
    /// channel value is divided by the largest value found in the image.
    #[must_use]
    pub fn preprocess(image: &RgbaImage, config: &PreprocessingConfig) -> Array4<f32> {
        let size = config.target_size;
        let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
        let resized = image::imageops::resize(&rgb, size, size, FilterType::Lanczos3);

        let max_value = resized
            .as_raw()
            .iter()
            .copied()
            .max()
            .map_or(MIN_PIXEL_MAX, |m| f32::from(m).max(MIN_PIXEL_MAX));

        let side = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match the resized image
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                let scaled = f32::from(pixel[channel]) / max_value;
                tensor[[0, channel, y as usize, x as usize]] = (scaled
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
            }
        }

        tensor
    }
}

/// How a model's raw output becomes a foreground probability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMapping {
    /// Channel 0 rescaled to [0, 1] by its own min and max
    MinMax,
    /// Foreground wherever the most likely class is not background (class 0)
    ArgmaxForeground,
    /// Logistic function applied to channel 0, then rescaled like `MinMax`
    Sigmoid,
}

impl MaskMapping {
    /// Mapping used by a model family, `None` for families without a mask output
    #[must_use]
    pub fn for_family(family: ModelFamily) -> Option<Self> {
        match family {
            ModelFamily::U2Net | ModelFamily::IsNet => Some(Self::MinMax),
            ModelFamily::ClothSeg => Some(Self::ArgmaxForeground),
            ModelFamily::BiRefNet => Some(Self::Sigmoid),
            ModelFamily::Sam => None,
        }
    }
}

/// Rescale to [0, 1] by the plane's own min and max; flat planes are only clamped
fn min_max_normalize(mut plane: Array2<f32>) -> Array2<f32> {
    let (min, max) = plane
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if range > f32::EPSILON {
        plane.mapv_inplace(|v| (v - min) / range);
    } else {
        plane.mapv_inplace(|v| v.clamp(0.0, 1.0));
    }
    plane
}

/// Mask postprocessing utilities
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Turn a `[1, C, H, W]` model output into an `H x W` grayscale mask
    ///
    /// # Errors
    /// - Output is not four-dimensional or has no channels
    pub fn to_mask(output: &ArrayViewD<'_, f32>, mapping: MaskMapping) -> Result<GrayImage> {
        let output = output.view().into_dimensionality::<Ix4>().map_err(|e| {
            RemovalError::segmentation(format!(
                "Unexpected model output shape {:?}: {}",
                output.shape(),
                e
            ))
        })?;

        let (batch, channels, height, width) = output.dim();
        if batch == 0 || channels == 0 {
            return Err(RemovalError::segmentation(format!(
                "Model output has an empty dimension: {:?}",
                output.shape()
            )));
        }

        let sample = output.index_axis(Axis(0), 0);
        let plane = sample.index_axis(Axis(0), 0);

        let probabilities: Array2<f32> = match mapping {
            MaskMapping::MinMax => min_max_normalize(plane.to_owned()),
            MaskMapping::Sigmoid => min_max_normalize(plane.mapv(|v| 1.0 / (1.0 + (-v).exp()))),
            MaskMapping::ArgmaxForeground => {
                let mut best = plane.to_owned();
                let mut foreground = Array2::<f32>::zeros((height, width));
                for class in 1..channels {
                    Zip::from(&mut best)
                        .and(&mut foreground)
                        .and(&sample.index_axis(Axis(0), class))
                        .for_each(|best, fg, &score| {
                            if score > *best {
                                *best = score;
                                *fg = 1.0;
                            }
                        });
                }
                foreground
            },
        };

        let pixels: Vec<u8> = probabilities
            .iter()
            .map(|&p| (p.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();

        GrayImage::from_raw(width as u32, height as u32, pixels)
            .ok_or_else(|| RemovalError::segmentation("Mask buffer does not match output shape"))
    }

    /// Resize `mask` to the image size and multiply it into the alpha channel
    #[must_use]
    pub fn apply_mask(image: &RgbaImage, mask: &GrayImage) -> RgbaImage {
        let (width, height) = image.dimensions();
        let mask = if mask.dimensions() == (width, height) {
            mask.clone()
        } else {
            image::imageops::resize(mask, width, height, FilterType::Triangle)
        };

        let mut output = image.clone();
        for (pixel, mask_pixel) in output.pixels_mut().zip(mask.pixels()) {
            let alpha = u16::from(pixel[3]) * u16::from(mask_pixel[0]) / 255;
            pixel[3] = alpha as u8;
        }
        output
    }
}
