//! Service layer
//!
//! Infrastructure concerns kept apart from the batch pipeline: progress
//! reporting, archive export and file I/O.

pub mod archive;
pub mod io;
pub mod progress;

pub use archive::{build_zip, ARCHIVE_FILE_NAME, ARCHIVE_MIME_TYPE, PNG_MIME_TYPE};
pub use io::{is_accepted_image, ImageIOService, ACCEPTED_EXTENSIONS};
pub use progress::{
    BatchProgress, ConsoleProgressReporter, NoOpProgressReporter, ProgressReporter,
    ProgressTracker,
};
