//! Zip archive export of processed images

use crate::{
    error::{RemovalError, Result},
    types::ProcessedItem,
};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Suggested filename for the downloadable archive
pub const ARCHIVE_FILE_NAME: &str = "processed_images.zip";

/// MIME type of the archive
pub const ARCHIVE_MIME_TYPE: &str = "application/zip";

/// MIME type of a single processed image
pub const PNG_MIME_TYPE: &str = "image/png";

/// Bundle every processed item into an uncompressed zip archive
///
/// Entries are written in iteration order under each item's name. When a name
/// repeats, later occurrences become `<stem>_2.png`, `<stem>_3.png`, and so on.
///
/// # Errors
/// - Zip writer failures
pub fn build_zip(items: &[ProcessedItem]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (name, item) in unique_names(items.iter().map(|item| item.name.as_str()))
        .into_iter()
        .zip(items)
    {
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| RemovalError::archive(format!("Failed to add {}: {}", name, e)))?;
        writer
            .write_all(&item.data)
            .map_err(|e| RemovalError::archive(format!("Failed to write {}: {}", name, e)))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| RemovalError::archive(format!("Failed to finalize archive: {}", e)))?;

    log::debug!("Built archive with {} entries", items.len());
    Ok(cursor.into_inner())
}

/// Assign a distinct name to every entry, keeping first occurrences intact
pub fn unique_names<'a, I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut result = Vec::with_capacity(names.len());

    for name in names {
        if taken.insert(name.to_string()) {
            result.push(name.to_string());
            continue;
        }

        let path = Path::new(name);
        let stem = path
            .file_stem()
            .map_or_else(|| name.to_string(), |s| s.to_string_lossy().into_owned());
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut counter = 2;
        let renamed = loop {
            let candidate = format!("{}_{}{}", stem, counter, extension);
            if !taken.contains(&candidate) {
                break candidate;
            }
            counter += 1;
        };

        log::warn!("Duplicate output name {}, stored as {}", name, renamed);
        taken.insert(renamed.clone());
        result.push(renamed);
    }

    result
}
