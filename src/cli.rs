//! Command line interface of the `mixdown-export` tool.

use crate::error::{Error, Result};
use crate::mixbus::MixBus;
use crate::session_file::open_session;
use clap::{Parser, ValueEnum};
use mixdown_core::{
    BroadcastInfo, ChannelConfig, EncoderCapabilities, ExportProgress, ExportStatus,
    FilenamePolicy, FormatSpecification, HandlerConfig, SampleFormat, SampleRate,
};
use mixdown_export::{check_config, ExportHandler, FileWriterGraph, OfflineEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const PROGRAM_NAME: &str = "mixdown-export";

/// Export a session's range to a WAV file.
#[derive(Parser, Debug, Clone)]
#[command(name = "mixdown-export", version, about)]
pub struct Cli {
    /// Sample format of the exported file.
    #[arg(short = 'b', long = "bitdepth", value_enum, default_value = "24")]
    pub bitdepth: BitDepth,

    /// Write a BWF `bext` chunk (description, originator, time).
    #[arg(short = 'B', long = "broadcast")]
    pub broadcast: bool,

    /// Normalize the peak to 0 dBFS.
    #[arg(short = 'n', long = "normalize")]
    pub normalize: bool,

    /// Output WAV file. Defaults to `<session-dir>/export/<session-name>.wav`.
    #[arg(short = 'o', long = "output", value_name = "FILE", value_parser = parse_output)]
    pub output: Option<PathBuf>,

    /// Output sample rate in Hz. Defaults to the session rate.
    #[arg(short = 's', long = "samplerate", value_name = "RATE", value_parser = parse_sample_rate)]
    pub samplerate: Option<SampleRate>,

    /// Directory holding the session file.
    #[arg(value_name = "SESSION-DIR")]
    pub session_dir: PathBuf,

    /// Session name, without the `.mixdown` extension.
    #[arg(value_name = "SESSION-NAME")]
    pub session_name: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    #[value(name = "16")]
    Int16,
    #[value(name = "24")]
    Int24,
    #[value(name = "32")]
    Int32,
    #[value(name = "float")]
    Float,
}

impl BitDepth {
    pub fn sample_format(self) -> SampleFormat {
        match self {
            BitDepth::Int16 => SampleFormat::S16,
            BitDepth::Int24 => SampleFormat::S24,
            BitDepth::Int32 => SampleFormat::S32,
            BitDepth::Float => SampleFormat::Float,
        }
    }
}

fn parse_sample_rate(value: &str) -> std::result::Result<SampleRate, String> {
    let hz: u32 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    SampleRate::from_hz(hz).ok_or_else(|| {
        let supported: Vec<String> = SampleRate::FIXED
            .iter()
            .map(|r| r.resolve(0).to_string())
            .collect();
        format!("unsupported sample rate {hz}, expected one of {}", supported.join(", "))
    })
}

/// Only WAV is written, so any other extension is a mistake.
fn parse_output(value: &str) -> std::result::Result<PathBuf, String> {
    let path = PathBuf::from(value);
    match path.extension().and_then(|e| e.to_str()) {
        None => Ok(path),
        Some(ext) if ext.eq_ignore_ascii_case("wav") => Ok(path),
        Some(ext) => Err(format!("cannot write .{ext} files, only .wav is supported")),
    }
}

impl Cli {
    /// WAV format for the chosen options.
    pub fn format_spec(&self) -> FormatSpecification {
        let mut format = FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav());
        format.set_sample_format(Some(self.bitdepth.sample_format()));
        if let Some(rate) = self.samplerate {
            format.set_sample_rate(Some(rate));
        }
        if self.normalize {
            format.set_normalize(true, 0.0);
        }
        format
    }

    /// Filename policy writing to `--output`, or the session's export folder.
    pub fn filename_policy(&self) -> FilenamePolicy {
        match &self.output {
            Some(output) => {
                let folder = output
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let mut policy = FilenamePolicy::new(self.session_name.as_str(), folder);
                let label = output
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| self.session_name.clone());
                policy.set_label(label);
                policy.include_session = false;
                policy.include_label = true;
                policy
            }
            None => FilenamePolicy::new(
                self.session_name.as_str(),
                self.session_dir.join("export"),
            ),
        }
    }
}

/// Run the export described by `cli`, reporting progress through `on_progress`.
/// Returns the path of the written file.
pub fn export(cli: &Cli, on_progress: impl FnMut(&ExportProgress)) -> Result<PathBuf> {
    let loaded = open_session(&cli.session_dir, &cli.session_name)?;
    let session = loaded.session;

    let range = session
        .session_range()
        .ok_or_else(|| Error::Session("session has no range".into()))?;
    let timespan = session.timespan_for(range)?;
    let timespans = [timespan];

    let policy = cli.filename_policy();
    if !policy.folder().exists() {
        std::fs::create_dir_all(policy.folder())?;
    }

    let mut config = ChannelConfig::stereo("master", MixBus::MASTER_LEFT, MixBus::MASTER_RIGHT);
    config.add_output(Arc::new(cli.format_spec()), policy);
    let config = Arc::new(config);

    let check = check_config(&timespans, &config);
    for warning in &check.warnings {
        warn!("{warning}");
    }
    for path in &check.conflicting_filenames {
        warn!(path = %path.display(), "overwriting existing file");
    }
    if check.has_errors() {
        return Err(Error::Session(check.errors.join("; ")));
    }

    let status = ExportStatus::shared();
    let engine = Arc::new(OfflineEngine::new(session.sample_rate));
    let handler_config = HandlerConfig {
        program_name: PROGRAM_NAME.to_string(),
        ..HandlerConfig::default()
    };
    let graph = FileWriterGraph::new(
        loaded.mixbus,
        session.sample_rate,
        handler_config.timecode_fps,
    );
    let handler = ExportHandler::new(
        Arc::clone(&session),
        engine.clone(),
        Box::new(graph),
        Arc::clone(&status),
        handler_config,
    )?;
    #[cfg(feature = "tag")]
    let handler = handler.with_tagger(Arc::new(mixdown_export::Id3Tagger));

    let broadcast_info = cli.broadcast.then(|| {
        Arc::new(BroadcastInfo::now(
            format!("{} export", session.name),
            PROGRAM_NAME,
        ))
    });
    handler.add_channel_config(&timespans, &config, broadcast_info)?;

    let path = config
        .file_specs(None)
        .into_iter()
        .next()
        .map(|mut spec| {
            spec.set_timespan(&timespans[0]);
            spec.path()
        })
        .ok_or_else(|| Error::Session("nothing to export".into()))?;

    info!(session = %session.name, output = %path.display(), "exporting");
    handler.start_export()?;
    engine.run(&handler, on_progress)?;

    if status.aborted() {
        return Err(Error::Session("export aborted".into()));
    }
    info!(output = %path.display(), "export finished");
    Ok(path)
}
