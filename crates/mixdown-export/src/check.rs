//! Pre-flight checks run before an export is started.

use crate::cd_marker::CdMarkerFormat;
use crate::handler::handle_duplicate_format_extensions;
use mixdown_core::{ChannelConfig, FileSpec, FormatSpecification, Timespan};
use std::path::PathBuf;
use std::sync::Arc;

/// Problems found in a prospective export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Warnings {
    /// Prevent the export from starting.
    pub errors: Vec<String>,
    /// Worth showing, not fatal.
    pub warnings: Vec<String>,
    /// Files (audio or CD marker) the export would overwrite.
    pub conflicting_filenames: Vec<PathBuf>,
}

impl Warnings {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.conflicting_filenames.is_empty()
    }
}

/// Why `format` cannot render `channels` channels, if it cannot.
pub(crate) fn format_error(format: &FormatSpecification, channels: u32) -> Option<String> {
    if format.format_id().is_none() {
        return Some(format!("No format selected for '{}'", format.name()));
    }
    if channels == 0 {
        return Some("All channels are empty".into());
    }
    if let Err(e) = format.validate() {
        return Some(e.to_string());
    }
    if format.channel_limit() < channels {
        return Some(format!(
            "{} supports only {} channels, but you have {} channels in your channel configuration",
            format.format_name(),
            format.channel_limit(),
            channels
        ));
    }
    None
}

/// The specs the handler would render for `timespan`, with the same
/// naming adjustments applied.
pub(crate) fn prepared_specs(
    config: &Arc<ChannelConfig>,
    timespan: &Timespan,
    multiple_timespans: bool,
) -> Vec<FileSpec> {
    let mut specs = config.file_specs(None);
    for spec in &mut specs {
        spec.set_timespan(timespan);
        if multiple_timespans {
            spec.filename_mut().include_timespan = true;
        }
    }
    handle_duplicate_format_extensions(&mut specs);
    specs
}

/// Check one channel configuration and its outputs against `timespans`.
pub fn check_config(timespans: &[Arc<Timespan>], config: &Arc<ChannelConfig>) -> Warnings {
    let mut warnings = Warnings::default();

    if timespans.is_empty() {
        warnings.errors.push("No timespan has been selected".into());
    }

    if !config.all_channels_have_ports() {
        warnings.warnings.push("Some channels are empty".into());
    }

    if config.outputs().is_empty() {
        warnings.errors.push("No format selected".into());
    }
    for (format, _) in config.outputs() {
        if let Some(error) = format_error(format, config.channel_count()) {
            warnings.errors.push(error);
        }
    }

    if warnings.has_errors() {
        return warnings;
    }

    let multiple = timespans.len() > 1;
    for timespan in timespans {
        for spec in prepared_specs(config, timespan, multiple) {
            for path in spec.output_paths() {
                let mut candidates = vec![path.clone()];
                candidates.extend(
                    CdMarkerFormat::requested(spec.format())
                        .into_iter()
                        .filter(|f| *f != CdMarkerFormat::Chapters)
                        .map(|f| f.side_file(&path)),
                );
                warnings
                    .conflicting_filenames
                    .extend(candidates.into_iter().filter(|p| p.exists()));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_core::{Channel, EncoderCapabilities, FilenamePolicy, TimespanFactory};
    use tempfile::tempdir;

    fn wav() -> Arc<FormatSpecification> {
        Arc::new(FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav()))
    }

    #[test]
    fn test_no_timespan_and_no_format() {
        let config = Arc::new(ChannelConfig::stereo("master", "l", "r"));
        let warnings = check_config(&[], &config);
        assert!(warnings.errors.iter().any(|e| e.contains("No timespan")));
        assert!(warnings.errors.iter().any(|e| e.contains("No format")));
    }

    #[test]
    fn test_channel_limit() {
        let factory = TimespanFactory::new();
        let timespan = factory.create_shared("t", 0, 100).unwrap();

        let mut config = ChannelConfig::new("wide");
        for i in 0..10 {
            config.register_channel(Channel::new().with_port(format!("out {i}")));
        }
        let flac = FormatSpecification::for_encoder("flac", &EncoderCapabilities::flac());
        config.add_output(Arc::new(flac), FilenamePolicy::new("s", "/tmp"));

        let warnings = check_config(&[timespan], &Arc::new(config));
        assert!(warnings
            .errors
            .iter()
            .any(|e| e.contains("supports only 8 channels, but you have 10")));
    }

    #[test]
    fn test_empty_channel_is_warning() {
        let factory = TimespanFactory::new();
        let timespan = factory.create_shared("t", 0, 100).unwrap();
        let dir = tempdir().unwrap();

        let mut config = ChannelConfig::new("master");
        config.register_channel(Channel::new().with_port("l"));
        config.register_channel(Channel::new());
        config.add_output(wav(), FilenamePolicy::new("s", dir.path()));

        let warnings = check_config(&[timespan], &Arc::new(config));
        assert!(!warnings.has_errors());
        assert_eq!(warnings.warnings, vec!["Some channels are empty".to_string()]);
    }

    #[test]
    fn test_conflicting_filenames_per_split_channel() {
        let factory = TimespanFactory::new();
        let timespan = factory.create_shared("t", 0, 100).unwrap();
        let dir = tempdir().unwrap();

        let mut config = ChannelConfig::stereo("master", "l", "r");
        config.set_split(true);
        config.add_output(wav(), FilenamePolicy::new("s", dir.path()));
        let config = Arc::new(config);

        std::fs::write(dir.path().join("s_channel2.wav"), b"x").unwrap();
        let warnings = check_config(&[timespan], &config);
        assert_eq!(
            warnings.conflicting_filenames,
            vec![dir.path().join("s_channel2.wav")]
        );
    }

    #[test]
    fn test_multiple_timespans_preview_includes_name() {
        let factory = TimespanFactory::new();
        let a = factory.create_shared("verse", 0, 100).unwrap();
        let b = factory.create_shared("chorus", 100, 200).unwrap();
        let dir = tempdir().unwrap();

        let mut config = ChannelConfig::stereo("master", "l", "r");
        config.add_output(wav(), FilenamePolicy::new("s", dir.path()));
        let config = Arc::new(config);

        std::fs::write(dir.path().join("s_chorus.wav"), b"x").unwrap();
        let warnings = check_config(&[a, b], &config);
        assert_eq!(warnings.conflicting_filenames, vec![dir.path().join("s_chorus.wav")]);
    }
}
