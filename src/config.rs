//! Configuration types for batch background removal

use crate::error::{RemovalError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound accepted for `max_concurrency`
pub const MAX_CONCURRENCY_LIMIT: usize = 1024;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl Default for ExecutionProvider {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = RemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(RemovalError::invalid_config(format!(
                "Unknown execution provider '{}'. Expected one of: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// Configuration shared by the dispatcher and the segmentation backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of images segmented at the same time (0 = one per CPU core)
    pub max_concurrency: usize,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads per model session (0 = auto)
    pub intra_threads: usize,

    /// Directory holding the ONNX model files (None = resolved from env/home)
    pub model_dir: Option<PathBuf>,

    /// Download missing model files before a run
    pub auto_download: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            model_dir: None,
            auto_download: true,
        }
    }
}

impl BatchConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use bgremove_batch::{BatchConfig, ExecutionProvider};
    ///
    /// let config = BatchConfig::builder()
    ///     .max_concurrency(4)
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.effective_concurrency(), 4);
    /// ```
    #[must_use]
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - `max_concurrency` above [`MAX_CONCURRENCY_LIMIT`]
    /// - `intra_threads` above [`MAX_CONCURRENCY_LIMIT`]
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(RemovalError::config_value_error(
                "max concurrency",
                self.max_concurrency,
                "0-1024",
                Some(0),
            ));
        }

        if self.intra_threads > MAX_CONCURRENCY_LIMIT {
            return Err(RemovalError::config_value_error(
                "intra threads",
                self.intra_threads,
                "0-1024",
                Some(0),
            ));
        }

        Ok(())
    }

    /// Number of worker slots the dispatcher will use
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrency > 0 {
            self.max_concurrency
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        }
    }
}

/// Builder for `BatchConfig`
#[derive(Debug, Default)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    #[must_use]
    pub fn max_concurrency(mut self, workers: usize) -> Self {
        self.config.max_concurrency = workers;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: Option<P>) -> Self {
        self.config.model_dir = dir.map(Into::into);
        self
    }

    #[must_use]
    pub fn auto_download(mut self, enabled: bool) -> Self {
        self.config.auto_download = enabled;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any validation failure from [`BatchConfig::validate`]
    pub fn build(self) -> Result<BatchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
