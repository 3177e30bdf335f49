//! ONNX Runtime segmentation backend
//!
//! Each session loads `<model_dir>/<file_name>` from disk, resizes and
//! normalizes the input per model family, runs the network and turns the first
//! output into an alpha mask.

use crate::cache::ModelCache;
use crate::config::{BatchConfig, ExecutionProvider};
use crate::error::{RemovalError, Result};
use crate::inference::{Segmenter, SegmenterFactory};
use crate::models::{ModelKind, PreprocessingConfig};
use crate::utils::{ImagePreprocessor, MaskMapping, MaskPostprocessor};
use image::RgbaImage;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::time::Instant;

/// Factory building one ONNX Runtime session per task
#[derive(Debug, Clone, Default)]
pub struct OnnxSegmenterFactory;

impl OnnxSegmenterFactory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// List ONNX Runtime execution providers with availability status and descriptions
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!(
            "Platform: {os} / {arch}",
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH
        );

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Register the execution providers requested by `provider`
    fn configure_providers(
        builder: SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<SessionBuilder> {
        let cuda_available =
            || OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available = || {
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false)
        };

        let mut providers = Vec::new();
        match provider {
            ExecutionProvider::Cpu => {},
            ExecutionProvider::Auto => {
                if cuda_available() {
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available() {
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cuda => {
                if cuda_available() {
                    providers.push(CUDAExecutionProvider::default().build());
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available() {
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                }
            },
        }

        if providers.is_empty() {
            return Ok(builder);
        }

        builder.with_execution_providers(providers).map_err(|e| {
            RemovalError::model(format!("Failed to set {} execution provider: {e}", provider))
        })
    }
}

impl SegmenterFactory for OnnxSegmenterFactory {
    fn create_session(&self, model: ModelKind, config: &BatchConfig) -> Result<Box<dyn Segmenter>> {
        let load_start = Instant::now();

        let preprocessing = model.preprocessing().ok_or_else(|| {
            RemovalError::model(format!(
                "Model '{}' requires point prompts and is not supported by the ONNX backend",
                model
            ))
        })?;
        let mapping = MaskMapping::for_family(model.family()).ok_or_else(|| {
            RemovalError::model(format!("Model '{}' has no mask output", model))
        })?;

        let cache = ModelCache::from_config(config)?;
        let model_path = cache.model_path(model);
        if !cache.is_model_cached(model) {
            return Err(RemovalError::model(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        let builder = Session::builder()
            .map_err(|e| RemovalError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RemovalError::model(format!("Failed to set optimization level: {e}")))?;

        let builder = Self::configure_providers(builder, config.execution_provider)?;

        let builder = if config.intra_threads > 0 {
            builder
                .with_intra_threads(config.intra_threads)
                .map_err(|e| RemovalError::model(format!("Failed to set intra threads: {e}")))?
        } else {
            builder
        };

        let session = builder.commit_from_file(&model_path).map_err(|e| {
            RemovalError::model(format!(
                "Failed to load model {}: {e}",
                model_path.display()
            ))
        })?;

        log::debug!(
            "Loaded {} ({}) in {:.0}ms with provider {}",
            model,
            model_path.display(),
            load_start.elapsed().as_secs_f64() * 1000.0,
            config.execution_provider
        );

        Ok(Box::new(OnnxSegmenter {
            session,
            preprocessing,
            mapping,
        }))
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

/// One loaded ONNX Runtime session
#[derive(Debug)]
pub struct OnnxSegmenter {
    session: Session,
    preprocessing: PreprocessingConfig,
    mapping: MaskMapping,
}

impl Segmenter for OnnxSegmenter {
    fn remove(&mut self, image: &RgbaImage) -> Result<RgbaImage> {
        let inference_start = Instant::now();

        let tensor = ImagePreprocessor::preprocess(image, &self.preprocessing);
        let input_value = Value::from_array(tensor).map_err(|e| {
            RemovalError::segmentation(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| RemovalError::segmentation(format!("ONNX inference failed: {e}")))?;

        // Positional access to the first output
        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| RemovalError::segmentation("No output tensors found"))?;
        let output = outputs
            .get(first_key)
            .ok_or_else(|| RemovalError::segmentation("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                RemovalError::segmentation(format!("Failed to extract output tensor: {e}"))
            })?;

        let mask = MaskPostprocessor::to_mask(&output.view(), self.mapping)?;
        let result = MaskPostprocessor::apply_mask(image, &mask);

        log::debug!(
            "Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(result)
    }
}
