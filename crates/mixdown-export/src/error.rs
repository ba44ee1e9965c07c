//! Error types for mixdown-export

use std::io;
use thiserror::Error;

/// Export error type
#[derive(Error, Debug)]
pub enum ExportError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error from the value model (ranges, formats, configuration)
    #[error(transparent)]
    Core(#[from] mixdown_core::Error),

    /// Unsupported format or feature not enabled
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Configuration rejected before the export started
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Encoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Rendering error
    #[error("Render error: {0}")]
    Render(String),

    /// Resampling error
    #[error("Resampling error: {0}")]
    Resample(String),

    /// Post-export command failed to start or exited unsuccessfully
    #[error("Command failed: {0}")]
    Command(String),

    /// Metadata tagging error
    #[error("Tagging error: {0}")]
    Tag(String),

    /// Upload error
    #[error("Upload error: {0}")]
    Upload(String),

    /// An export is already running
    #[error("Export already in progress")]
    Busy,
}

/// Result type for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

// From trait implementations for external library errors at API boundary

#[cfg(feature = "wav")]
impl From<hound::Error> for ExportError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => ExportError::Io(io),
            other => ExportError::Encoding(other.to_string()),
        }
    }
}

impl From<rubato::ResamplerConstructionError> for ExportError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        ExportError::Resample(e.to_string())
    }
}

impl From<rubato::ResampleError> for ExportError {
    fn from(e: rubato::ResampleError) -> Self {
        ExportError::Resample(e.to_string())
    }
}

#[cfg(feature = "tag")]
impl From<id3::Error> for ExportError {
    fn from(e: id3::Error) -> Self {
        ExportError::Tag(e.to_string())
    }
}
