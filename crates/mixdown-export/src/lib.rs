//! # Mixdown Export
//!
//! Renders timespans of a session into audio files.
//!
//! This crate provides:
//! - **Export handler**: the timespan state machine driven from the engine's
//!   process callback, with setup handed to a single worker thread
//! - **Render graph**: the [`RenderGraph`] seam plus [`FileWriterGraph`],
//!   which writes WAV and FLAC with resampling, normalization and dithering
//! - **Side effects**: CUE/TOC/chapter marker files, ID3 tagging, a
//!   post-export command and upload hooks
//! - **Pre-flight checks**: [`check_config`] reports errors, warnings and
//!   files that would be overwritten
//!
//! ## Example
//!
//! ```ignore
//! use mixdown_export::*;
//!
//! let engine = Arc::new(OfflineEngine::new(session.sample_rate));
//! let graph = FileWriterGraph::new(reader, session.sample_rate, 30.0);
//! let handler = ExportHandler::new(session, engine.clone(), Box::new(graph), status, config)?;
//!
//! handler.add_channel_config(&[timespan], &channel_config, None)?;
//! handler.start_export()?;
//! engine.run(&handler, |p| println!("{:.0}%", p.fraction() * 100.0))?;
//! ```
//!
//! ## Feature Flags
//!
//! - `wav` (default): WAV output via hound (pure Rust)
//! - `flac` (default): FLAC output via flacenc (pure Rust)
//! - `tag` (default): ID3 tagging via id3

// Core modules
pub mod error;
pub mod graph;
pub mod handler;
pub mod engine;
mod worker;

// Rendering
mod dsp;
pub mod render;

// Side effects
pub mod cd_marker;
pub mod command;
pub mod tagging;
pub mod upload;

pub mod check;

// Re-exports
pub use cd_marker::{render_cd_markers, write_cd_marker_file, CdMarkerFormat};
pub use check::{check_config, Warnings};
pub use command::{run_command, Substitutions};
pub use engine::{AudioEngine, OfflineEngine};
pub use error::{ExportError, Result};
pub use graph::{PortReader, RenderGraph};
pub use handler::{handle_duplicate_format_extensions, Cycle, ExportHandler};
pub use render::FileWriterGraph;
pub use tagging::Tagger;
pub use upload::Uploader;

#[cfg(feature = "tag")]
pub use tagging::Id3Tagger;
