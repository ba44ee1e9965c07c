//! Value model for multi-file session export.
//!
//! # Primary API
//!
//! - [`Timespan`]: a `[start, end)` sample range to render
//! - [`ChannelConfig`] / [`Channel`]: which ports feed which output channel
//! - [`FormatSpecification`]: encoding and post-processing parameters
//! - [`FilenamePolicy`]: deterministic output path synthesis
//! - [`FileSpec`]: one (channel config, format, filename) combination
//! - [`ExportStatus`]: progress and result state shared across threads
//!
//! # Example
//!
//! ```ignore
//! use mixdown_core::*;
//! use std::sync::Arc;
//!
//! let session = Session::new("song", "/sessions/song", 48000);
//! let timespan = session.new_timespan("full", 0, 48000 * 60)?;
//!
//! let mut config = ChannelConfig::stereo("master", "master/out 1", "master/out 2");
//! let format = FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav());
//! config.add_output(Arc::new(format), FilenamePolicy::new("song", "/sessions/song/export"));
//!
//! let specs = Arc::new(config).file_specs(None);
//! ```

pub mod error;
pub use error::{Error, Result};

mod config;
pub use config::HandlerConfig;

pub mod lockfree;
pub use lockfree::{AtomicCounter, AtomicFlag};

pub mod timespan;
pub use timespan::{SamplePos, Timespan, TimespanFactory, TimespanId};

pub mod channel;
pub use channel::{Channel, ChannelConfig};

pub mod format;
pub use format::{
    DitherType, EncoderCapabilities, EncoderType, Endianness, FormatId, FormatSpecification,
    FormatState, Quality, SampleFormat, SampleRate, SilenceDuration, SrcQuality,
};

pub mod filename;
pub use filename::{legalize, DateFormat, FilenamePolicy, FilenameState, TimeFormat};

mod file_spec;
pub use file_spec::{BroadcastInfo, FileSpec};

pub mod session;
pub use session::{Location, LocationFlags, Session, SessionMetadata};

pub mod status;
pub use status::{ActiveJob, AnalysisResult, AnalysisResults, ExportProgress, ExportStatus};
