//! Error types for mixdown-core.

use thiserror::Error;

/// Error type for mixdown-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid range: start={start}, end={end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Format '{0}' is incomplete")]
    IncompleteFormat(String),

    #[error("Format '{format}' is not supported by encoder '{encoder}'")]
    IncompatibleFormat { format: String, encoder: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Engine did not leave freewheel mode within {0:?}")]
    FreewheelTimeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
