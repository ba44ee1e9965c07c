//! Output path synthesis.
//!
//! Enabled fields are always concatenated in the same order:
//! session, label, revision, timespan, channel configuration, channel,
//! date, time, format name. The extension comes from the paired
//! [`FormatSpecification`].

use crate::channel::ChannelConfig;
use crate::format::FormatSpecification;
use crate::timespan::Timespan;
use crate::{Error, Result};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateFormat {
    #[default]
    None,
    /// 2026-10-16
    Iso,
    /// 26-10-16
    IsoShortYear,
    /// 16-10-2026
    BritishLong,
    /// 16-10-26
    BritishShortYear,
    /// 10-16-2026
    AmericanLong,
}

impl DateFormat {
    fn pattern(&self) -> Option<&'static str> {
        match self {
            DateFormat::None => None,
            DateFormat::Iso => Some("%Y-%m-%d"),
            DateFormat::IsoShortYear => Some("%y-%m-%d"),
            DateFormat::BritishLong => Some("%d-%m-%Y"),
            DateFormat::BritishShortYear => Some("%d-%m-%y"),
            DateFormat::AmericanLong => Some("%m-%d-%Y"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DateFormat::None => "none",
            DateFormat::Iso => "iso",
            DateFormat::IsoShortYear => "iso-short-year",
            DateFormat::BritishLong => "british-long",
            DateFormat::BritishShortYear => "british-short-year",
            DateFormat::AmericanLong => "american-long",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            DateFormat::None,
            DateFormat::Iso,
            DateFormat::IsoShortYear,
            DateFormat::BritishLong,
            DateFormat::BritishShortYear,
            DateFormat::AmericanLong,
        ]
        .into_iter()
        .find(|f| f.as_str() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFormat {
    #[default]
    None,
    /// 1342
    HoursMinutes,
    /// 134207
    HoursMinutesSeconds,
}

impl TimeFormat {
    fn pattern(&self) -> Option<&'static str> {
        match self {
            TimeFormat::None => None,
            TimeFormat::HoursMinutes => Some("%H%M"),
            TimeFormat::HoursMinutesSeconds => Some("%H%M%S"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFormat::None => "none",
            TimeFormat::HoursMinutes => "hours-minutes",
            TimeFormat::HoursMinutesSeconds => "hours-minutes-seconds",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            TimeFormat::None,
            TimeFormat::HoursMinutes,
            TimeFormat::HoursMinutesSeconds,
        ]
        .into_iter()
        .find(|f| f.as_str() == name)
    }
}

/// Rules for turning session/timespan/format metadata into an output path.
#[derive(Debug, Clone, PartialEq)]
pub struct FilenamePolicy {
    pub include_session: bool,
    pub include_label: bool,
    pub include_revision: bool,
    pub include_timespan: bool,
    pub include_channel_config: bool,
    pub include_channel: bool,
    pub include_date: bool,
    pub include_time: bool,
    pub include_format_name: bool,

    label: String,
    revision: u32,
    folder: PathBuf,
    date_format: DateFormat,
    time_format: TimeFormat,
    timestamp: NaiveDateTime,

    session_name: String,
    timespan_name: String,
    channel_config_name: String,
    channel: u32,
}

impl FilenamePolicy {
    pub fn new(session_name: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        Self {
            include_session: true,
            include_label: false,
            include_revision: false,
            include_timespan: false,
            include_channel_config: false,
            include_channel: false,
            include_date: false,
            include_time: false,
            include_format_name: false,
            label: String::new(),
            revision: 0,
            folder: folder.into(),
            date_format: DateFormat::Iso,
            time_format: TimeFormat::HoursMinutes,
            timestamp: Local::now().naive_local(),
            session_name: session_name.into(),
            timespan_name: String::new(),
            channel_config_name: String::new(),
            channel: 0,
        }
    }

    /// Build the full output path for `format`.
    pub fn path(&self, format: &FormatSpecification) -> PathBuf {
        let mut fields: Vec<String> = Vec::new();

        if self.include_session && !self.session_name.is_empty() {
            fields.push(self.session_name.clone());
        }
        if self.include_label && !self.label.is_empty() {
            fields.push(self.label.clone());
        }
        if self.include_revision {
            fields.push(format!("r{}", self.revision));
        }
        if self.include_timespan && !self.timespan_name.is_empty() {
            fields.push(self.timespan_name.clone());
        }
        if self.include_channel_config && !self.channel_config_name.is_empty() {
            fields.push(self.channel_config_name.clone());
        }
        if self.include_channel {
            fields.push(format!("channel{}", self.channel));
        }
        if self.include_date {
            if let Some(date) = self.date_string() {
                fields.push(date);
            }
        }
        if self.include_time {
            if let Some(time) = self.time_string() {
                fields.push(time);
            }
        }
        if self.include_format_name && !format.name().is_empty() {
            fields.push(format.name().to_string());
        }

        let mut name = fields.join("_");
        if name.is_empty() {
            name.push_str("export");
        }
        if !format.extension().is_empty() {
            name.push('.');
            name.push_str(format.extension());
        }

        self.folder.join(legalize(&name))
    }

    pub fn date_string(&self) -> Option<String> {
        self.date_format
            .pattern()
            .map(|p| self.timestamp.format(p).to_string())
    }

    pub fn time_string(&self) -> Option<String> {
        self.time_format
            .pattern()
            .map(|p| self.timestamp.format(p).to_string())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn set_revision(&mut self, revision: u32) {
        self.revision = revision;
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn set_folder(&mut self, folder: impl Into<PathBuf>) {
        self.folder = folder.into();
    }

    pub fn date_format(&self) -> DateFormat {
        self.date_format
    }

    pub fn set_date_format(&mut self, format: DateFormat) {
        self.date_format = format;
    }

    pub fn time_format(&self) -> TimeFormat {
        self.time_format
    }

    pub fn set_time_format(&mut self, format: TimeFormat) {
        self.time_format = format;
    }

    pub fn set_timestamp(&mut self, timestamp: NaiveDateTime) {
        self.timestamp = timestamp;
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn set_session_name(&mut self, name: impl Into<String>) {
        self.session_name = name.into();
    }

    pub fn timespan_name(&self) -> &str {
        &self.timespan_name
    }

    pub fn set_timespan(&mut self, timespan: &Timespan) {
        self.timespan_name = timespan.name().to_string();
    }

    pub fn channel_config_name(&self) -> &str {
        &self.channel_config_name
    }

    pub fn set_channel_config(&mut self, config: &ChannelConfig) {
        self.channel_config_name = config.name().to_string();
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// 1-based channel index used when splitting to mono files.
    pub fn set_channel(&mut self, channel: u32) {
        self.channel = channel;
    }

    // --- persistence ---

    /// Persisted form. The folder is stored relative to `session_dir`
    /// when it lies inside it. The revision is stored by the session.
    pub fn state(&self, session_dir: &Path) -> FilenameState {
        let folder = match self.folder.strip_prefix(session_dir) {
            Ok(rel) => FolderState {
                relative: true,
                path: rel.to_string_lossy().into_owned(),
            },
            Err(_) => FolderState {
                relative: false,
                path: self.folder.to_string_lossy().into_owned(),
            },
        };

        let field = |name: &str, enabled: bool, value: Option<String>| FieldState {
            name: name.to_string(),
            enabled,
            value,
        };

        FilenameState {
            folder,
            fields: vec![
                field("label", self.include_label, Some(self.label.clone())),
                field("session", self.include_session, None),
                field("revision", self.include_revision, None),
                field(
                    "time",
                    self.include_time,
                    Some(self.time_format.as_str().into()),
                ),
                field(
                    "date",
                    self.include_date,
                    Some(self.date_format.as_str().into()),
                ),
                field("timespan", self.include_timespan, None),
                field("channel-config", self.include_channel_config, None),
                field("channel", self.include_channel, None),
                field("format-name", self.include_format_name, None),
            ],
        }
    }

    pub fn from_state(
        state: &FilenameState,
        session_name: impl Into<String>,
        session_dir: &Path,
    ) -> Result<Self> {
        let folder = if state.folder.relative {
            session_dir.join(&state.folder.path)
        } else {
            PathBuf::from(&state.folder.path)
        };

        let mut policy = Self::new(session_name, folder);
        policy.include_session = false;

        for field in &state.fields {
            match field.name.as_str() {
                "label" => {
                    policy.include_label = field.enabled;
                    policy.label = field.value.clone().unwrap_or_default();
                }
                "session" => policy.include_session = field.enabled,
                "revision" => policy.include_revision = field.enabled,
                "time" => {
                    policy.include_time = field.enabled;
                    if let Some(value) = &field.value {
                        policy.time_format = TimeFormat::from_name(value).ok_or_else(|| {
                            Error::InvalidConfig(format!("unknown time format '{}'", value))
                        })?;
                    }
                }
                "date" => {
                    policy.include_date = field.enabled;
                    if let Some(value) = &field.value {
                        policy.date_format = DateFormat::from_name(value).ok_or_else(|| {
                            Error::InvalidConfig(format!("unknown date format '{}'", value))
                        })?;
                    }
                }
                "timespan" => policy.include_timespan = field.enabled,
                "channel-config" => policy.include_channel_config = field.enabled,
                "channel" => policy.include_channel = field.enabled,
                "format-name" => policy.include_format_name = field.enabled,
                other => tracing::debug!("Ignoring unknown filename field '{}'", other),
            }
        }

        Ok(policy)
    }
}

/// Replace characters that are not portable in file names.
pub fn legalize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Persisted form of a [`FilenamePolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilenameState {
    pub folder: FolderState,
    pub fields: Vec<FieldState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderState {
    pub relative: bool,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    pub name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}
