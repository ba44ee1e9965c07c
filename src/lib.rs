//! # Mixdown - Session Export
//!
//! Renders ranges of a session into audio files.
//!
//! ## Architecture
//!
//! Mixdown is an umbrella crate that coordinates:
//! - **mixdown-core** - Value model (Timespan, ChannelConfig, FormatSpecification,
//!   FilenamePolicy, FileSpec, ExportStatus)
//! - **mixdown-export** - Export handler state machine, file writer graph,
//!   CD markers, tagging, post-export commands
//!
//! On top of those it provides the `.mixdown` session file loader, a stereo
//! master bus mixing WAV tracks, and the `mixdown-export` command line tool.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mixdown::prelude::*;
//!
//! let loaded = open_session(Path::new("/sessions/song"), "song")?;
//! let session = loaded.session;
//! let timespan = session.timespan_for(session.session_range().unwrap())?;
//!
//! let engine = Arc::new(OfflineEngine::new(session.sample_rate));
//! let graph = FileWriterGraph::new(loaded.mixbus, session.sample_rate, 30.0);
//! let handler = ExportHandler::new(
//!     session.clone(), engine.clone(), Box::new(graph),
//!     ExportStatus::shared(), HandlerConfig::default(),
//! )?;
//!
//! let mut config = ChannelConfig::stereo("master", MixBus::MASTER_LEFT, MixBus::MASTER_RIGHT);
//! config.add_output(
//!     Arc::new(FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav())),
//!     FilenamePolicy::new("song", "/sessions/song/export"),
//! );
//! handler.add_channel_config(&[timespan], &Arc::new(config), None)?;
//! handler.start_export()?;
//! engine.run(&handler, |p| println!("{:.0}%", p.fraction() * 100.0))?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Everything enabled (`full`)
//! - `wav` - WAV output, required by the command line tool
//! - `flac` - FLAC output
//! - `tag` - ID3 tagging of exported files

/// Re-export of mixdown-core for direct access
pub use mixdown_core as core;

/// Re-export of mixdown-export for direct access
pub use mixdown_export as export;

pub use mixdown_core::{
    BroadcastInfo, Channel, ChannelConfig, EncoderCapabilities, ExportProgress, ExportStatus,
    FileSpec, FilenamePolicy, FormatSpecification, HandlerConfig, Location, SampleFormat,
    SampleRate, Session, SessionMetadata, Timespan,
};
pub use mixdown_export::{
    check_config, AudioEngine, Cycle, ExportError, ExportHandler, FileWriterGraph,
    OfflineEngine, PortReader, RenderGraph, Warnings,
};

pub mod cli;
pub mod error;
pub mod mixbus;
pub mod session_file;

pub use error::{Error, Result};
pub use mixbus::MixBus;
pub use session_file::{open_session, LoadedSession, SessionFile, TrackSpec};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{open_session, Error, MixBus, Result, SessionFile, TrackSpec};

    pub use mixdown_core::{
        BroadcastInfo, ChannelConfig, EncoderCapabilities, ExportProgress, ExportStatus,
        FilenamePolicy, FormatSpecification, HandlerConfig, SampleFormat, SampleRate, Session,
        Timespan,
    };
    pub use mixdown_export::{
        check_config, AudioEngine, ExportHandler, FileWriterGraph, OfflineEngine, PortReader,
    };

    pub use std::path::Path;
    pub use std::sync::Arc;
}
