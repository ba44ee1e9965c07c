//! Minimal session model consumed by the export handler.
//!
//! Storage and editing live elsewhere; the exporter only needs the
//! session's identity, its markers and its metadata.

use crate::timespan::{SamplePos, Timespan, TimespanFactory};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFlags {
    #[serde(default)]
    pub mark: bool,
    #[serde(default)]
    pub cd_marker: bool,
    #[serde(default)]
    pub session_range: bool,
    #[serde(default)]
    pub hidden: bool,
}

/// A marker (point) or range on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub start: SamplePos,
    pub end: SamplePos,
    #[serde(default)]
    pub flags: LocationFlags,
    /// CD-TEXT style fields keyed by lower-case name
    /// (`isrc`, `performer`, `composer`, `songwriter`, `message`, `scms`, `preemph`).
    #[serde(default)]
    pub cd_info: BTreeMap<String, String>,
}

impl Location {
    pub fn marker(name: impl Into<String>, position: SamplePos) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            start: position,
            end: position,
            flags: LocationFlags {
                mark: true,
                ..Default::default()
            },
            cd_info: BTreeMap::new(),
        }
    }

    pub fn range(name: impl Into<String>, start: SamplePos, end: SamplePos) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            start,
            end,
            flags: LocationFlags::default(),
            cd_info: BTreeMap::new(),
        }
    }

    /// The session's own start/end range.
    pub fn session_range(start: SamplePos, end: SamplePos) -> Self {
        let mut location = Self::range("session", start, end);
        location.flags.session_range = true;
        location
    }

    pub fn with_cd(mut self) -> Self {
        self.flags.cd_marker = true;
        self
    }

    pub fn with_cd_info(mut self, key: &str, value: impl Into<String>) -> Self {
        self.cd_info.insert(key.to_string(), value.into());
        self
    }

    pub fn is_mark(&self) -> bool {
        self.flags.mark || self.start == self.end
    }

    pub fn is_cd_marker(&self) -> bool {
        self.flags.cd_marker
    }

    pub fn is_session_range(&self) -> bool {
        self.flags.session_range
    }

    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn cd_info(&self, key: &str) -> Option<&str> {
        self.cd_info.get(key).map(String::as_str)
    }
}

/// Descriptive metadata used for tagging, CD text and command substitution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub comment: String,
    pub composer: String,
    pub conductor: String,
    pub copyright: String,
    pub country: String,
    pub disc_subtitle: String,
    pub engineer: String,
    pub genre: String,
    pub lyricist: String,
    pub mixer: String,
    pub organization: String,
    pub producer: String,
    pub total_tracks: u32,
    pub track_number: u32,
    pub year: u32,
}

/// Session identity, markers and metadata.
#[derive(Debug)]
pub struct Session {
    pub name: String,
    pub path: PathBuf,
    pub sample_rate: u32,
    pub locations: Vec<Location>,
    pub metadata: SessionMetadata,
    revision: AtomicU32,
    timespans: TimespanFactory,
}

impl Session {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            sample_rate,
            locations: Vec::new(),
            metadata: SessionMetadata::default(),
            revision: AtomicU32::new(0),
            timespans: TimespanFactory::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn revision(&self) -> u32 {
        self.revision.load(Ordering::Relaxed)
    }

    pub fn set_revision(&self, revision: u32) {
        self.revision.store(revision, Ordering::Relaxed);
    }

    /// Bump the export revision and return the new value.
    pub fn next_revision(&self) -> u32 {
        self.revision.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn new_timespan(
        &self,
        name: impl Into<String>,
        start: SamplePos,
        end: SamplePos,
    ) -> Result<Arc<Timespan>> {
        self.timespans.create_shared(name, start, end)
    }

    /// Timespan covering a range location, carrying its name and id.
    pub fn timespan_for(&self, location: &Location) -> Result<Arc<Timespan>> {
        let mut timespan = self
            .timespans
            .create(location.name.clone(), location.start, location.end)?;
        timespan.set_range_id(location.id.clone());
        Ok(Arc::new(timespan))
    }

    pub fn session_range(&self) -> Option<&Location> {
        self.locations.iter().find(|l| l.is_session_range())
    }
}
