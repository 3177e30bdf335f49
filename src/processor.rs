//! Per-item background removal task
//!
//! [`process_image`] turns one upload into one [`ProcessedItem`]: decode,
//! segment with a fresh session, encode as PNG and name the output. Every
//! failure, including a panic inside the segmenter, comes back as an `Err`.

use crate::{
    config::BatchConfig,
    error::{RemovalError, Result},
    inference::SegmenterFactory,
    models::ModelKind,
    types::{ProcessedItem, UploadedImage},
};
use image::{ImageFormat, RgbaImage};
use instant::Instant;
use std::io::Cursor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug as trace_debug, info as trace_info, instrument, span, Level};

/// Suffix appended to the stem of every output file
pub const OUTPUT_SUFFIX: &str = "_no_bg.png";

/// Suffix of the side-by-side before/after image
pub const COMPARISON_SUFFIX: &str = "_compare.png";

/// Output filename for an input filename
///
/// Only the final extension is replaced, following [`Path::file_stem`]:
///
/// ```rust
/// use bgremove_batch::processor::output_name;
///
/// assert_eq!(output_name("sample.jpg"), "sample_no_bg.png");
/// assert_eq!(output_name("archive.tar.gz"), "archive.tar_no_bg.png");
/// assert_eq!(output_name(".hidden"), ".hidden_no_bg.png");
/// ```
#[must_use]
pub fn output_name(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .map_or_else(|| name.to_string(), |s| s.to_string_lossy().into_owned());
    format!("{}{}", stem, OUTPUT_SUFFIX)
}

/// Remove the background of one uploaded image
///
/// # Errors
/// - `Decode` when the bytes are not a readable image
/// - `Segmentation` when session creation fails, the segmenter errors or panics
/// - `Encode` when the result cannot be written as PNG
#[instrument(
    skip_all,
    fields(file = %item.name, model = %model, backend = factory.name())
)]
pub fn process_image(
    item: &UploadedImage,
    model: ModelKind,
    factory: &dyn SegmenterFactory,
    config: &BatchConfig,
) -> Result<ProcessedItem> {
    let total_start = Instant::now();

    let original = {
        let _span = span!(Level::DEBUG, "decode", bytes = item.len()).entered();
        decode_upload(item)?
    };
    trace_debug!(
        width = original.width(),
        height = original.height(),
        "Decoded input"
    );

    let processed = {
        let _span = span!(Level::DEBUG, "segmentation").entered();
        run_segmenter(&original, model, factory, config)?
    };

    let data = {
        let _span = span!(Level::DEBUG, "encode").entered();
        encode_png(&processed)?
    };

    let name = output_name(&item.name);
    trace_info!(
        output = %name,
        duration_ms = total_start.elapsed().as_millis() as u64,
        "Background removed"
    );

    Ok(ProcessedItem {
        name,
        original,
        processed,
        data,
    })
}

fn decode_upload(item: &UploadedImage) -> Result<RgbaImage> {
    // Fresh cursor over the shared buffer on every call
    let reader = image::ImageReader::new(Cursor::new(&item.data[..]))
        .with_guessed_format()
        .map_err(|e| RemovalError::decode(&item.name, image::ImageError::IoError(e)))?;
    let decoded = reader
        .decode()
        .map_err(|e| RemovalError::decode(&item.name, e))?;
    Ok(decoded.to_rgba8())
}

fn run_segmenter(
    image: &RgbaImage,
    model: ModelKind,
    factory: &dyn SegmenterFactory,
    config: &BatchConfig,
) -> Result<RgbaImage> {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut session = factory.create_session(model, config).map_err(|e| {
            RemovalError::segmentation(format!("Failed to create {} session: {}", model, e))
        })?;
        session.remove(image).map_err(|e| match e {
            RemovalError::Segmentation(_) => e,
            other => RemovalError::segmentation(other.to_string()),
        })
    }));

    match outcome {
        Ok(result) => result,
        Err(payload) => Err(RemovalError::segmentation(format!(
            "Segmenter panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

pub(crate) fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
