//! Model downloading from the rembg release page
//!
//! Files are streamed into a temporary file inside the model directory and
//! persisted under their final name only once the transfer completed, so an
//! interrupted download never leaves a truncated model behind.

use crate::cache::ModelCache;
use crate::error::{RemovalError, Result};
use crate::models::ModelKind;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {},
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {},
        }
    }
}

impl ModelDownloader {
    /// Create a downloader that stores files in `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| RemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Make sure the model file is present, downloading it when missing
    ///
    /// Returns the path of the ONNX file.
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors while writing the model
    pub async fn ensure_model(&self, model: ModelKind, show_progress: bool) -> Result<PathBuf> {
        let final_path = self.cache.model_path(model);
        if self.cache.is_model_cached(model) {
            log::debug!("Model already cached: {}", final_path.display());
            return Ok(final_path);
        }

        self.download_model(model, show_progress).await?;
        Ok(final_path)
    }

    /// Download a model file, replacing any existing copy
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors while writing the model
    pub async fn download_model(&self, model: ModelKind, show_progress: bool) -> Result<()> {
        let url = model.download_url();
        let final_path = self.cache.model_path(model);
        log::info!("Downloading model {} from {}", model, url);

        self.cache.ensure_dir()?;

        let progress = if show_progress {
            Self::create_progress_indicator()
        } else {
            ProgressIndicator::NoOp
        };
        progress.set_message(format!("Downloading {}", model.file_name()));

        match self.download_file(&url, &final_path, &progress).await {
            Ok(bytes) => {
                progress.finish_with_message(format!("✅ Downloaded {}", model));
                log::info!("Successfully downloaded model {} ({} bytes)", model, bytes);
                Ok(())
            },
            Err(e) => {
                progress.finish_with_message("❌ Download failed".to_string());
                Err(e)
            },
        }
    }

    /// Create a progress indicator for download reporting
    fn create_progress_indicator() -> ProgressIndicator {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            ProgressIndicator::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            ProgressIndicator::NoOp
        }
    }

    /// Stream `url` into `local_path` through a temporary sibling file
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<u64> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        let parent = local_path
            .parent()
            .ok_or_else(|| RemovalError::internal("Model path has no parent directory"))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RemovalError::network_error(format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(RemovalError::network_error(
                format!("HTTP error {} for {}", response.status(), url),
                std::io::Error::new(std::io::ErrorKind::Other, "HTTP error"),
            ));
        }

        let total_size = response.content_length();
        if let Some(total) = total_size {
            progress.set_length(total);
        }

        let temp_file = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| RemovalError::file_io_error("create temporary file in", parent, &e))?;
        let std_file = temp_file
            .reopen()
            .map_err(|e| RemovalError::file_io_error("open", temp_file.path(), &e))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| RemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            file.write_all(buffer.get(..bytes_read).unwrap_or(&[]))
                .await
                .map_err(|e| RemovalError::file_io_error("write to", temp_file.path(), &e))?;

            downloaded += bytes_read as u64;
            if total_size.is_some() {
                progress.set_position(downloaded);
            } else {
                progress.set_message(format!(
                    "Downloaded {:.1} MB",
                    downloaded as f64 / 1_048_576.0
                ));
            }
        }

        file.flush()
            .await
            .map_err(|e| RemovalError::file_io_error("flush", temp_file.path(), &e))?;
        file.sync_all()
            .await
            .map_err(|e| RemovalError::file_io_error("sync", temp_file.path(), &e))?;
        drop(file);

        if let Some(expected) = total_size {
            if expected != downloaded {
                return Err(RemovalError::network_error(
                    format!("Incomplete download of {}", url),
                    format!("expected {} bytes, received {}", expected, downloaded),
                ));
            }
        }

        temp_file
            .persist(local_path)
            .map_err(|e| RemovalError::file_io_error("move downloaded model to", local_path, &e.error))?;

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_model_skips_cached_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_dir(temp_dir.path());
        std::fs::write(cache.model_path(ModelKind::U2NetP), b"cached").unwrap();

        let downloader = ModelDownloader::new(cache).unwrap();
        let path = downloader
            .ensure_model(ModelKind::U2NetP, false)
            .await
            .unwrap();

        assert_eq!(path, temp_dir.path().join("u2netp.onnx"));
        assert_eq!(std::fs::read(path).unwrap(), b"cached");
    }

    #[test]
    fn test_no_op_progress_indicator() {
        let progress = ProgressIndicator::NoOp;
        progress.set_length(10);
        progress.set_position(5);
        progress.set_message("halfway".to_string());
        progress.finish_with_message("done".to_string());
    }
}
