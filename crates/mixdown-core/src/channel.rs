//! Channel configurations: which source ports feed which output channel.

use crate::file_spec::{BroadcastInfo, FileSpec};
use crate::filename::FilenamePolicy;
use crate::format::FormatSpecification;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One output channel: the set of source ports summed into it.
///
/// Ports are deduplicated and unordered. An empty channel is legal and
/// renders silence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    ports: BTreeSet<String>,
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.add_port(port);
        self
    }

    /// Returns false if the port was already present.
    pub fn add_port(&mut self, port: impl Into<String>) -> bool {
        self.ports.insert(port.into())
    }

    pub fn remove_port(&mut self, port: &str) -> bool {
        self.ports.remove(port)
    }

    pub fn ports(&self) -> impl Iterator<Item = &str> {
        self.ports.iter().map(String::as_str)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

/// Ordered channels plus the (format, filename) pairs rendered from them.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    name: String,
    channels: Vec<Channel>,
    split: bool,
    outputs: Vec<(Arc<FormatSpecification>, FilenamePolicy)>,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: Vec::new(),
            split: false,
            outputs: Vec::new(),
        }
    }

    /// Stereo configuration fed from two ports.
    pub fn stereo(name: impl Into<String>, left: &str, right: &str) -> Self {
        let mut config = Self::new(name);
        config.register_channel(Channel::new().with_port(left));
        config.register_channel(Channel::new().with_port(right));
        config
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn register_channel(&mut self, channel: Channel) {
        self.channels.push(channel);
    }

    pub fn clear_channels(&mut self) {
        self.channels.clear();
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_count(&self) -> u32 {
        self.channels.len() as u32
    }

    pub fn all_channels_have_ports(&self) -> bool {
        self.channels.iter().all(|c| !c.is_empty())
    }

    /// Zero-based indices of channels without ports.
    pub fn empty_channels(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Write one mono file per channel instead of one interleaved file.
    pub fn split(&self) -> bool {
        self.split
    }

    pub fn set_split(&mut self, split: bool) {
        self.split = split;
    }

    pub fn add_output(&mut self, format: Arc<FormatSpecification>, filename: FilenamePolicy) {
        self.outputs.push((format, filename));
    }

    pub fn outputs(&self) -> &[(Arc<FormatSpecification>, FilenamePolicy)] {
        &self.outputs
    }

    /// Expand the registered outputs into FileSpecs, one per pair.
    pub fn file_specs(self: &Arc<Self>, broadcast_info: Option<Arc<BroadcastInfo>>) -> Vec<FileSpec> {
        self.outputs
            .iter()
            .map(|(format, filename)| {
                FileSpec::new(
                    Arc::clone(self),
                    Arc::clone(format),
                    filename.clone(),
                    broadcast_info.clone(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::EncoderCapabilities;

    #[test]
    fn test_channel_dedups_ports() {
        let mut ch = Channel::new();
        assert!(ch.add_port("master/out 1"));
        assert!(!ch.add_port("master/out 1"));
        assert_eq!(ch.port_count(), 1);
        assert!(ch.remove_port("master/out 1"));
        assert!(ch.is_empty());
    }

    #[test]
    fn test_empty_channels_reported() {
        let mut config = ChannelConfig::stereo("st", "a", "b");
        assert!(config.all_channels_have_ports());
        config.register_channel(Channel::new());
        assert_eq!(config.channel_count(), 3);
        assert!(!config.all_channels_have_ports());
        assert_eq!(config.empty_channels(), vec![2]);
    }

    #[test]
    fn test_file_specs_expand_outputs() {
        let mut config = ChannelConfig::stereo("st", "a", "b");
        let wav = Arc::new(FormatSpecification::for_encoder(
            "wav",
            &EncoderCapabilities::wav(),
        ));
        let flac = Arc::new(FormatSpecification::for_encoder(
            "flac",
            &EncoderCapabilities::flac(),
        ));
        config.add_output(wav, FilenamePolicy::new("s", "/tmp"));
        config.add_output(flac, FilenamePolicy::new("s", "/tmp"));

        let config = Arc::new(config);
        let specs = config.file_specs(None);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].filename().channel_config_name(), "st");
        assert_eq!(specs[1].format().extension(), "flac");
    }
}
