#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Batch Background Removal Library
//!
//! Removes the background from many images at once with a model picked from
//! the rembg catalog (`u2net`, `isnet-*`, `birefnet-*`, ...), runs the work
//! with bounded concurrency and keeps the results in a session-scoped store
//! that can be written to disk or bundled into a zip archive.
//!
//! ## Features
//!
//! - **Model Catalog**: 14 named models with their preprocessing parameters
//! - **Concurrent Dispatch**: one segmentation session per image, capped by a worker limit
//! - **Failure Isolation**: a failing or panicking image never aborts the batch
//! - **Session Store**: results are discarded when the inputs or the model change
//! - **Zip Export**: every result in one uncompressed archive
//! - **Model Management**: automatic download into `~/.u2net` (or `U2NET_HOME`)
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_batch::{remove_backgrounds, BatchConfig, ModelKind, UploadedImage};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let images = vec![
//!     UploadedImage::new("a.png", std::fs::read("a.png")?),
//!     UploadedImage::new("b.jpg", std::fs::read("b.jpg")?),
//! ];
//!
//! let config = BatchConfig::builder().max_concurrency(4).build()?;
//! let outcome = remove_backgrounds(images, ModelKind::U2Net, &config).await?;
//!
//! for item in &outcome.processed {
//!     std::fs::write(&item.name, &item.data)?; // a_no_bg.png, b_no_bg.png
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Segmenters
//!
//! The neural network sits behind [`SegmenterFactory`]; any implementation can
//! drive the [`Dispatcher`] and [`Session`]:
//!
//! ```rust
//! use bgremove_batch::{
//!     BatchConfig, Dispatcher, IdentitySegmenterFactory, ModelKind, NoOpProgressReporter,
//!     Session, UploadedImage,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(images: Vec<UploadedImage>) -> bgremove_batch::Result<()> {
//! let dispatcher = Dispatcher::new(Arc::new(IdentitySegmenterFactory), BatchConfig::default());
//! let mut session = Session::new();
//! session
//!     .process(&dispatcher, &images, ModelKind::U2Net, &NoOpProgressReporter)
//!     .await?;
//! let zip = bgremove_batch::build_zip(session.results())?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `cli` (default): Command-line interface and progress reporting
//! - `tracing-json`: JSON log output for the CLI
//! - `tracing-files`: file log output for the CLI

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{BatchConfig, BatchConfigBuilder, ExecutionProvider};
pub use dispatcher::Dispatcher;
pub use download::ModelDownloader;
pub use error::{RemovalError, Result};
pub use inference::{IdentitySegmenter, IdentitySegmenterFactory, Segmenter, SegmenterFactory};
pub use models::{ModelFamily, ModelKind, PreprocessingConfig};
pub use processor::{output_name, process_image, COMPARISON_SUFFIX, OUTPUT_SUFFIX};
pub use services::{
    build_zip, BatchProgress, ConsoleProgressReporter, ImageIOService, NoOpProgressReporter,
    ProgressReporter, ProgressTracker, ARCHIVE_FILE_NAME,
};
pub use session::{RunState, Session};
pub use types::{BatchOutcome, BatchSummary, FailedItem, ProcessedItem, UploadedImage};
pub use utils::{ImagePreprocessor, MaskMapping, MaskPostprocessor};

#[cfg(feature = "cli")]
pub use tracing_config::{
    events, init_cli_tracing, spans, TracingConfig, TracingFormat, TracingOutput,
};

/// Remove the background from every image with the ONNX backend
///
/// Downloads the model file first when it is missing and
/// [`BatchConfig::auto_download`] is set. Per-image failures are collected in
/// [`BatchOutcome::failed`].
///
/// # Errors
/// - `EmptyBatch` when `images` is empty
/// - Model directory resolution or download failures
/// - Systemic dispatcher failures
#[cfg(feature = "onnx")]
pub async fn remove_backgrounds(
    images: Vec<UploadedImage>,
    model: ModelKind,
    config: &BatchConfig,
) -> Result<BatchOutcome> {
    if images.is_empty() {
        return Err(RemovalError::EmptyBatch);
    }

    if config.auto_download && model.preprocessing().is_some() {
        let downloader = ModelDownloader::new(ModelCache::from_config(config)?)?;
        downloader.ensure_model(model, false).await?;
    }

    let dispatcher = Dispatcher::new(
        std::sync::Arc::new(OnnxSegmenterFactory::new()),
        config.clone(),
    );
    dispatcher
        .dispatch(images, model, &NoOpProgressReporter)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "onnx")]
    #[tokio::test]
    async fn test_empty_batch_needs_no_model() {
        let config = BatchConfig::builder()
            .model_dir(Some("/nonexistent/models"))
            .build()
            .unwrap();
        let result = remove_backgrounds(Vec::new(), ModelKind::U2Net, &config).await;
        assert!(matches!(result, Err(RemovalError::EmptyBatch)));
    }

    #[cfg(feature = "onnx")]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_model_fails_per_item() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = BatchConfig::builder()
            .model_dir(Some(dir.path()))
            .auto_download(false)
            .build()
            .unwrap();
        let images = vec![UploadedImage::new("a.png", b"not an image".to_vec())];

        let outcome = remove_backgrounds(images, ModelKind::U2Net, &config)
            .await
            .unwrap();
        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.failed.len(), 1);
    }
}
