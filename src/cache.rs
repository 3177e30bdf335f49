//! Model file cache management
//!
//! Model files live flat in one directory as `<model_dir>/<file_name>.onnx`, the
//! same layout rembg uses, so an existing `~/.u2net` directory is reused as-is.
//! The directory is resolved from, in order: an explicit path, the
//! `BGREMOVE_MODEL_DIR` environment variable, `U2NET_HOME`, then `~/.u2net`.

use crate::{
    config::BatchConfig,
    error::{RemovalError, Result},
    models::ModelKind,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the model directory
pub const MODEL_DIR_ENV: &str = "BGREMOVE_MODEL_DIR";

/// rembg-compatible environment variable for the model directory
pub const U2NET_HOME_ENV: &str = "U2NET_HOME";

/// Directory name under the home directory used when nothing else is set
pub const DEFAULT_MODEL_DIR_NAME: &str = ".u2net";

/// Information about a cached model file
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    pub model: ModelKind,
    /// Path to the ONNX file
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache rooted at the directory resolved from `config`
    ///
    /// The directory is not created until a model is downloaded into it.
    ///
    /// # Errors
    /// - No explicit directory, no environment override and no home directory
    pub fn from_config(config: &BatchConfig) -> Result<Self> {
        let cache_dir = resolve_model_dir(
            config.model_dir.as_deref(),
            |key| std::env::var(key).ok(),
            dirs::home_dir(),
        )?;
        log::debug!("Model directory: {}", cache_dir.display());
        Ok(Self { cache_dir })
    }

    /// Create a cache rooted at an explicit directory
    #[must_use]
    pub fn with_dir<P: Into<PathBuf>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Get the current cache directory path
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Create the cache directory if it does not exist yet
    ///
    /// # Errors
    /// - Failed to create the directory
    pub fn ensure_dir(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir).map_err(|e| {
                RemovalError::file_io_error("create model directory", &self.cache_dir, &e)
            })?;
        }
        Ok(())
    }

    /// Path of a model's ONNX file (may not exist)
    #[must_use]
    pub fn model_path(&self, model: ModelKind) -> PathBuf {
        self.cache_dir.join(model.file_name())
    }

    /// Check if a model file is present and non-empty
    #[must_use]
    pub fn is_model_cached(&self, model: ModelKind) -> bool {
        fs::metadata(self.model_path(model)).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }

    /// List every catalog model whose file is present, in catalog order
    ///
    /// # Errors
    /// - Failed to read file metadata
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        for model in ModelKind::ALL {
            if !self.is_model_cached(model) {
                continue;
            }
            let path = self.model_path(model);
            let size_bytes = fs::metadata(&path)
                .map_err(|e| RemovalError::file_io_error("read model metadata", &path, &e))?
                .len();
            models.push(CachedModelInfo {
                model,
                path,
                size_bytes,
            });
        }

        Ok(models)
    }

    /// Remove one cached model file
    ///
    /// Returns `true` if the file existed and was removed.
    ///
    /// # Errors
    /// - Failed to remove the file
    pub fn clear_specific_model(&self, model: ModelKind) -> Result<bool> {
        let path = self.model_path(model);
        if !path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {}", model);
        fs::remove_file(&path)
            .map_err(|e| RemovalError::file_io_error("remove cached model", &path, &e))?;
        Ok(true)
    }

    /// Remove every cached catalog model file
    ///
    /// Files in the directory that do not belong to the catalog are left alone.
    ///
    /// # Errors
    /// - Failed to remove a model file
    pub fn clear_all_models(&self) -> Result<Vec<ModelKind>> {
        let mut removed = Vec::new();
        for model in ModelKind::ALL {
            if self.clear_specific_model(model)? {
                removed.push(model);
            }
        }
        Ok(removed)
    }
}

/// Resolve the model directory from an explicit path, environment and home
///
/// # Errors
/// - Nothing configured and no home directory available
pub fn resolve_model_dir<F>(
    explicit: Option<&Path>,
    env_lookup: F,
    home_dir: Option<PathBuf>,
) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }

    for key in [MODEL_DIR_ENV, U2NET_HOME_ENV] {
        if let Some(value) = env_lookup(key).filter(|v| !v.trim().is_empty()) {
            return Ok(PathBuf::from(value));
        }
    }

    home_dir
        .map(|home| home.join(DEFAULT_MODEL_DIR_NAME))
        .ok_or_else(|| {
            RemovalError::invalid_config(format!(
                "Failed to determine model directory. Set {} or pass --model-dir.",
                MODEL_DIR_ENV
            ))
        })
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
