//! `.mixdown` session description files.
//!
//! A session file is JSON living at `<dir>/<name>.mixdown`:
//!
//! ```json
//! {
//!   "sample_rate": 48000,
//!   "range": { "start": 0, "end": 480000 },
//!   "metadata": { "title": "Song", "artist": "Band" },
//!   "locations": [{ "name": "verse", "start": 0, "end": 96000, "flags": { "cd_marker": true } }],
//!   "tracks": [{ "name": "drums", "file": "audio/drums.wav", "gain_db": -3.0 }]
//! }
//! ```
//!
//! Track files resolve relative to the session directory.

use crate::error::{Error, Result};
use crate::mixbus::MixBus;
use mixdown_core::{Location, SamplePos, Session, SessionMetadata};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const EXTENSION: &str = "mixdown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: SamplePos,
    pub end: SamplePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSpec {
    pub name: String,
    pub file: PathBuf,
    #[serde(default)]
    pub position: SamplePos,
    #[serde(default)]
    pub gain_db: f32,
    /// -1.0 (left) to 1.0 (right).
    #[serde(default)]
    pub pan: f32,
    #[serde(default)]
    pub mute: bool,
}

impl TrackSpec {
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            position: 0,
            gain_db: 0.0,
            pan: 0.0,
            mute: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    pub sample_rate: u32,
    /// Export range. Falls back to a session-range location, then to the
    /// extent of the tracks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    /// Last export revision.
    #[serde(default)]
    pub revision: u32,
    #[serde(default)]
    pub tracks: Vec<TrackSpec>,
}

impl SessionFile {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            range: None,
            locations: Vec::new(),
            metadata: SessionMetadata::default(),
            revision: 0,
            tracks: Vec::new(),
        }
    }

    pub fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.{EXTENSION}"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Session(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: Self = serde_json::from_str(&text)?;
        file.validate()?;
        Ok(file)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Session("sample_rate must be > 0".into()));
        }
        if let Some(range) = self.range {
            if range.end < range.start {
                return Err(Error::Session(format!(
                    "range end {} is before start {}",
                    range.end, range.start
                )));
            }
        }
        if let Some(l) = self.locations.iter().find(|l| l.end < l.start) {
            return Err(Error::Session(format!(
                "location '{}' ends before it starts",
                l.name
            )));
        }
        Ok(())
    }
}

/// A session ready to export: its model and the master bus to render from.
pub struct LoadedSession {
    pub session: Arc<Session>,
    pub mixbus: Arc<MixBus>,
}

/// Load `<dir>/<name>.mixdown` and decode its tracks.
pub fn open_session(dir: &Path, name: &str) -> Result<LoadedSession> {
    let path = SessionFile::path(dir, name);
    let file = SessionFile::load(&path)?;

    let mut mixbus = MixBus::new();
    for track in file.tracks.iter().filter(|t| !t.mute) {
        let audio = dir.join(&track.file);
        mixbus.load_track(
            &track.name,
            &audio,
            track.position,
            track.gain_db,
            track.pan,
            file.sample_rate,
        )?;
    }

    let mut session = Session::new(name, dir, file.sample_rate);
    session.metadata = file.metadata;
    session.set_revision(file.revision);
    session.locations = file.locations;

    match file.range {
        Some(range) => {
            session.locations.retain(|l| !l.is_session_range());
            session
                .locations
                .push(Location::session_range(range.start, range.end));
        }
        None if session.session_range().is_none() => {
            session
                .locations
                .push(Location::session_range(0, mixbus.length()));
        }
        None => {}
    }

    if let Some(range) = session.session_range() {
        debug!(start = range.start, end = range.end, "session range");
    }
    info!(
        session = name,
        tracks = mixbus.track_count(),
        sample_rate = file.sample_rate,
        "opened session"
    );

    Ok(LoadedSession {
        session: Arc::new(session),
        mixbus: Arc::new(mixbus),
    })
}
