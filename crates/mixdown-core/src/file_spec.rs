//! One concrete (channel configuration, format, filename) combination.

use crate::channel::ChannelConfig;
use crate::filename::FilenamePolicy;
use crate::format::FormatSpecification;
use crate::timespan::Timespan;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Broadcast-wave style provenance written by taggers that support it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastInfo {
    pub description: String,
    pub originator: String,
    pub originator_reference: String,
    /// `YYYY-MM-DD hh:mm:ss`
    pub origination_time: String,
}

impl BroadcastInfo {
    /// Provenance stamped with the current local time.
    pub fn now(description: impl Into<String>, originator: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            originator: originator.into(),
            originator_reference: String::new(),
            origination_time: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        }
    }
}

/// Value tuple rendered for a timespan. Owns its filename policy so the
/// handler can adjust naming flags per timespan.
#[derive(Debug, Clone)]
pub struct FileSpec {
    channel_config: Arc<ChannelConfig>,
    format: Arc<FormatSpecification>,
    filename: FilenamePolicy,
    broadcast_info: Option<Arc<BroadcastInfo>>,
}

impl FileSpec {
    pub fn new(
        channel_config: Arc<ChannelConfig>,
        format: Arc<FormatSpecification>,
        mut filename: FilenamePolicy,
        broadcast_info: Option<Arc<BroadcastInfo>>,
    ) -> Self {
        filename.set_channel_config(&channel_config);
        Self {
            channel_config,
            format,
            filename,
            broadcast_info,
        }
    }

    pub fn channel_config(&self) -> &Arc<ChannelConfig> {
        &self.channel_config
    }

    pub fn format(&self) -> &Arc<FormatSpecification> {
        &self.format
    }

    pub fn filename(&self) -> &FilenamePolicy {
        &self.filename
    }

    pub fn filename_mut(&mut self) -> &mut FilenamePolicy {
        &mut self.filename
    }

    pub fn broadcast_info(&self) -> Option<&Arc<BroadcastInfo>> {
        self.broadcast_info.as_ref()
    }

    pub fn set_timespan(&mut self, timespan: &Timespan) {
        self.filename.set_timespan(timespan);
    }

    /// Path of the interleaved output (or the first channel when split).
    pub fn path(&self) -> PathBuf {
        self.output_paths()
            .into_iter()
            .next()
            .unwrap_or_else(|| self.filename.path(&self.format))
    }

    /// Every file this spec produces: one, or one per channel when split.
    pub fn output_paths(&self) -> Vec<PathBuf> {
        if !self.channel_config.split() {
            return vec![self.filename.path(&self.format)];
        }
        (1..=self.channel_config.channel_count())
            .map(|channel| {
                let mut filename = self.filename.clone();
                filename.include_channel = true;
                filename.set_channel(channel);
                filename.path(&self.format)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::EncoderCapabilities;

    fn spec(split: bool) -> FileSpec {
        let mut config = ChannelConfig::stereo("st", "l", "r");
        config.set_split(split);
        let format = FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav());
        FileSpec::new(
            Arc::new(config),
            Arc::new(format),
            FilenamePolicy::new("song", "/out"),
            None,
        )
    }

    #[test]
    fn test_single_path() {
        let fs = spec(false);
        assert_eq!(fs.output_paths(), vec![PathBuf::from("/out/song.wav")]);
        assert_eq!(fs.path(), PathBuf::from("/out/song.wav"));
    }

    #[test]
    fn test_split_paths_per_channel() {
        let fs = spec(true);
        assert_eq!(
            fs.output_paths(),
            vec![
                PathBuf::from("/out/song_channel1.wav"),
                PathBuf::from("/out/song_channel2.wav"),
            ]
        );
        assert!(!fs.filename().include_channel);
    }
}
