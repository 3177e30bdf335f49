//! Image I/O operations service
//!
//! This module separates file I/O from the batch pipeline: reading input files
//! into [`UploadedImage`]s and writing processed results or archives to disk.

use crate::{
    error::{RemovalError, Result},
    processor::encode_png,
    services::archive::{build_zip, unique_names},
    types::{ProcessedItem, UploadedImage},
};
use std::path::{Path, PathBuf};

/// File extensions accepted as input, compared case-insensitively
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Check if a path has an accepted image extension
#[must_use]
pub fn is_accepted_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ACCEPTED_EXTENSIONS
                .iter()
                .any(|accepted| ext.eq_ignore_ascii_case(accepted))
        })
}

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Read an input file into an upload named after the file
    ///
    /// # Errors
    /// - `UnsupportedFormat` when the extension is not jpg, jpeg or png
    /// - Failed to read the file
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bgremove_batch::services::ImageIOService;
    ///
    /// let upload = ImageIOService::load_upload("input.jpg")?;
    /// assert_eq!(upload.name, "input.jpg");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_upload<P: AsRef<Path>>(path: P) -> Result<UploadedImage> {
        let path_ref = path.as_ref();

        if !is_accepted_image(path_ref) {
            return Err(RemovalError::unsupported_format(format!(
                "{} (accepted: {})",
                path_ref.display(),
                ACCEPTED_EXTENSIONS.join(", ")
            )));
        }

        let name = path_ref
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                RemovalError::invalid_config(format!(
                    "Input path has no file name: {}",
                    path_ref.display()
                ))
            })?;

        let data = std::fs::read(path_ref)
            .map_err(|e| RemovalError::file_io_error("read image file", path_ref, &e))?;

        log::debug!("Loaded {} ({} bytes)", name, data.len());
        Ok(UploadedImage::new(name, data))
    }

    /// Write every processed item as `<output_dir>/<name>`
    ///
    /// Repeated names get the same `_2`, `_3` suffixes the archive uses.
    /// Returns the written paths in item order.
    ///
    /// # Errors
    /// - Failed to create the output directory or write a file
    pub fn save_results<P: AsRef<Path>>(
        items: &[ProcessedItem],
        output_dir: P,
    ) -> Result<Vec<PathBuf>> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir).map_err(|e| {
            RemovalError::file_io_error("create output directory", output_dir, &e)
        })?;

        let names = unique_names(items.iter().map(|item| item.name.as_str()));
        let mut written = Vec::with_capacity(items.len());

        for (name, item) in names.into_iter().zip(items) {
            let path = output_dir.join(name);
            std::fs::write(&path, &item.data)
                .map_err(|e| RemovalError::file_io_error("write output image", &path, &e))?;
            log::debug!("Saved {}", path.display());
            written.push(path);
        }

        Ok(written)
    }

    /// Write the before/after view of every item as `<output_dir>/<stem>_compare.png`
    ///
    /// # Errors
    /// - Failed to create the output directory, encode or write a file
    pub fn save_comparisons<P: AsRef<Path>>(
        items: &[ProcessedItem],
        output_dir: P,
    ) -> Result<Vec<PathBuf>> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir).map_err(|e| {
            RemovalError::file_io_error("create output directory", output_dir, &e)
        })?;

        let names: Vec<String> = items.iter().map(ProcessedItem::comparison_name).collect();
        let names = unique_names(names.iter().map(String::as_str));
        let mut written = Vec::with_capacity(items.len());

        for (name, item) in names.into_iter().zip(items) {
            let path = output_dir.join(name);
            let data = encode_png(&item.comparison())?;
            std::fs::write(&path, data)
                .map_err(|e| RemovalError::file_io_error("write comparison image", &path, &e))?;
            log::debug!("Saved {}", path.display());
            written.push(path);
        }

        Ok(written)
    }

    /// Build the zip archive of `items` and write it to `path`
    ///
    /// # Errors
    /// - Archive construction failures
    /// - Failed to write the archive file
    pub fn write_archive<P: AsRef<Path>>(items: &[ProcessedItem], path: P) -> Result<u64> {
        let path_ref = path.as_ref();
        let bytes = build_zip(items)?;

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RemovalError::file_io_error("create archive directory", parent, &e)
            })?;
        }

        std::fs::write(path_ref, &bytes)
            .map_err(|e| RemovalError::file_io_error("write archive", path_ref, &e))?;
        Ok(bytes.len() as u64)
    }
}
