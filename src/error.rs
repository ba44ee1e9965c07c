//! Centralized error type for the mixdown umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] mixdown_core::Error),

    #[error("Export: {0}")]
    Export(#[from] mixdown_export::ExportError),

    #[error("Session: {0}")]
    Session(String),

    #[error("Session file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Track audio: {0}")]
    Audio(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
