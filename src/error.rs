//! Error types for batch background removal

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, RemovalError>;

/// Errors produced while loading, segmenting, encoding or packaging images
#[derive(Error, Debug)]
pub enum RemovalError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Uploaded content could not be decoded as an image
    #[error("Failed to decode '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    /// The processed image could not be encoded as PNG
    #[error("Failed to encode result: {0}")]
    Encode(#[from] image::ImageError),

    /// The segmentation backend failed or panicked
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Model loading, lookup or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Model download errors
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input file type is not accepted
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Zip archive construction errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// A dispatch was requested with no input images
    #[error("No images to process")]
    EmptyBatch,

    /// Systemic failure of the worker pool or other unexpected condition
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RemovalError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(msg: S) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error with the operation that failed
    pub fn network_error<S: AsRef<str>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.as_ref(), error))
    }

    /// Create a decode error for the named upload
    pub fn decode<S: Into<String>>(name: S, source: image::ImageError) -> Self {
        Self::Decode {
            name: name.into(),
            source,
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether this error belongs to a single item rather than the whole batch
    #[must_use]
    pub fn is_item_error(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::Encode(_) | Self::Segmentation(_) | Self::Model(_)
        )
    }
}
