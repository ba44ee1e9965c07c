//! File-writing render graph.
//!
//! Ports are summed per channel and either streamed straight to a WAV
//! file (dithered on the way) or captured to a temporary file for a
//! second pass. Captured outputs are trimmed, padded, resampled,
//! normalized, dithered and encoded during postprocessing, one output
//! per cycle.

mod capture;
#[cfg(feature = "flac")]
pub mod flac;
#[cfg(feature = "wav")]
pub mod wav;

use crate::dsp;
use capture::Capture;
use crate::error::{ExportError, Result};
use crate::graph::{PortReader, RenderGraph};
use mixdown_core::{
    AnalysisResult, AnalysisResults, BroadcastInfo, FileSpec, FormatId, FormatSpecification,
    SampleFormat, SampleRate, SamplePos, Timespan,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

enum Sink {
    /// Written as samples arrive, one writer per file.
    #[cfg(feature = "wav")]
    Stream(Vec<wav::WavFileWriter>),
    /// Captured on disk for postprocessing.
    Capture(Capture),
    Done,
}

struct Output {
    format: Arc<FormatSpecification>,
    sample_format: SampleFormat,
    ports: Vec<Vec<String>>,
    paths: Vec<PathBuf>,
    split: bool,
    mix: Vec<Vec<f32>>,
    dither: dsp::DitherState,
    broadcast: Option<Arc<BroadcastInfo>>,
    /// Session position of the first rendered sample.
    start: SamplePos,
    sink: Sink,
}

impl Output {
    fn is_captured(&self) -> bool {
        matches!(self.sink, Sink::Capture(_))
    }

    fn writes_bext(&self) -> bool {
        self.broadcast.is_some()
            && self.format.format_id() == Some(FormatId::Wav)
            && self.format.has_broadcast_info()
    }
}

/// [`RenderGraph`] writing WAV and FLAC files from a [`PortReader`].
pub struct FileWriterGraph {
    reader: Arc<dyn PortReader>,
    session_rate: u32,
    timecode_fps: f64,
    outputs: Vec<Output>,
    scratch: Vec<f32>,
    next_postprocess: usize,
    analysis: AnalysisResults,
}

impl FileWriterGraph {
    pub fn new(reader: Arc<dyn PortReader>, session_rate: u32, timecode_fps: f64) -> Self {
        Self {
            reader,
            session_rate,
            timecode_fps,
            outputs: Vec::new(),
            scratch: Vec::new(),
            next_postprocess: 0,
            analysis: AnalysisResults::new(),
        }
    }

    fn output_rate(&self, format: &FormatSpecification) -> u32 {
        format
            .sample_rate()
            .unwrap_or(SampleRate::Session)
            .resolve(self.session_rate)
    }

    fn can_stream(&self, format: &FormatSpecification) -> bool {
        cfg!(feature = "wav")
            && format.format_id() == Some(FormatId::Wav)
            && self.output_rate(format) == self.session_rate
            && !format.needs_two_pass()
    }

    #[cfg(feature = "wav")]
    fn open_stream(&self, output: &Output) -> Result<Sink> {
        let channels = if output.split { 1 } else { output.ports.len() as u16 };
        let lead = output
            .format
            .silence_beginning_samples(self.session_rate, self.timecode_fps);

        let mut writers = Vec::with_capacity(output.paths.len());
        for path in &output.paths {
            let mut writer =
                wav::WavFileWriter::create(path, output.sample_format, channels, self.session_rate)?;
            writer.write_silence(lead)?;
            writers.push(writer);
        }
        Ok(Sink::Stream(writers))
    }

    #[cfg(not(feature = "wav"))]
    fn open_stream(&self, _output: &Output) -> Result<Sink> {
        Err(ExportError::UnsupportedFormat("WAV support not enabled".into()))
    }

    fn finish_captured(&self, output: &Output, mut channels: Vec<Vec<f32>>) -> Result<AnalysisResult> {
        let format = &output.format;

        if format.trim_beginning() {
            let lead = dsp::leading_silence(&channels);
            for channel in &mut channels {
                channel.drain(..lead);
            }
        }
        if format.trim_end() {
            let tail = dsp::trailing_silence(&channels);
            for channel in &mut channels {
                let len = channel.len() - tail;
                channel.truncate(len);
            }
        }

        let lead = format.silence_beginning_samples(self.session_rate, self.timecode_fps) as usize;
        let tail = format.silence_end_samples(self.session_rate, self.timecode_fps) as usize;
        if lead > 0 || tail > 0 {
            for channel in &mut channels {
                channel.splice(0..0, std::iter::repeat(0.0).take(lead));
                channel.resize(channel.len() + tail, 0.0);
            }
        }

        let rate = self.output_rate(format);
        if rate != self.session_rate {
            channels = dsp::resample(&channels, self.session_rate, rate, format.src_quality())?;
        }

        if format.normalize_loudness() {
            let limit = format
                .use_true_peak_limiter()
                .then(|| format.normalize_dbtp() as f64);
            dsp::normalize_loudness(&mut channels, rate, format.normalize_lufs() as f64, limit)?;
        } else if format.normalize() {
            dsp::normalize_peak(&mut channels, format.normalize_dbfs() as f64);
        }

        let mut result = AnalysisResult {
            peak_dbfs: dsp::sample_peak_dbfs(&channels),
            length_samples: channels.first().map_or(0, |c| c.len() as u64),
            sample_rate: rate,
            ..AnalysisResult::default()
        };
        if format.analyse() {
            let loudness: dsp::LoudnessResult = dsp::analyze_loudness(&channels, rate)?;
            result.integrated_lufs = loudness.integrated_lufs;
            result.true_peak_dbtp = loudness.true_peak_dbtp;
            result.loudness_range_lu = loudness.loudness_range_lu;
        }

        if !output.sample_format.is_float() {
            let mut state = dsp::DitherState::new(format.dither_type(), channels.len());
            dsp::apply_dither(&mut channels, output.sample_format.bits(), &mut state);
        }

        if output.split {
            for (channel, path) in channels.into_iter().zip(&output.paths) {
                encode(format, path, &[channel], output.sample_format, rate)?;
            }
        } else if let Some(path) = output.paths.first() {
            encode(format, path, &channels, output.sample_format, rate)?;
        }
        write_bext(output, self.session_rate, rate)?;

        Ok(result)
    }
}

/// Stamp broadcast info on finished WAV files. `rate` is the file's rate.
#[cfg(feature = "wav")]
fn write_bext(output: &Output, session_rate: u32, rate: u32) -> Result<()> {
    let Some(info) = output.broadcast.as_deref().filter(|_| output.writes_bext()) else {
        return Ok(());
    };
    let time_reference = (output.start as u128 * rate as u128 / session_rate.max(1) as u128) as u64;
    for path in &output.paths {
        wav::append_bext_chunk(path, info, time_reference)?;
    }
    Ok(())
}

#[cfg(not(feature = "wav"))]
fn write_bext(_output: &Output, _session_rate: u32, _rate: u32) -> Result<()> {
    Ok(())
}

fn encode(
    format: &FormatSpecification,
    path: &Path,
    channels: &[Vec<f32>],
    sample_format: SampleFormat,
    sample_rate: u32,
) -> Result<()> {
    info!(path = %path.display(), "encoding {}", format.format_name());
    match format.format_id() {
        #[cfg(feature = "wav")]
        Some(FormatId::Wav) => wav::write_wav_file(path, channels, sample_format, sample_rate),
        #[cfg(feature = "flac")]
        Some(FormatId::Flac) => flac::write_flac_file(path, channels, sample_format, sample_rate),
        other => {
            let _ = (channels, sample_format, sample_rate);
            Err(ExportError::UnsupportedFormat(format!(
                "no encoder for {:?}",
                other
            )))
        }
    }
}

impl RenderGraph for FileWriterGraph {
    fn reset(&mut self) {
        // Dropping a hound writer finalizes whatever was written so far.
        // Dropping a capture deletes its temporary file.
        self.outputs.clear();
        self.next_postprocess = 0;
        self.analysis.clear();
    }

    fn add_config(&mut self, timespan: &Arc<Timespan>, file_spec: &FileSpec) -> Result<()> {
        let format = Arc::clone(file_spec.format());
        let config = file_spec.channel_config();
        let sample_format = format.sample_format().ok_or_else(|| {
            ExportError::InvalidConfig(format!("format '{}' has no sample format", format.name()))
        })?;

        let ports: Vec<Vec<String>> = config
            .channels()
            .iter()
            .map(|c| c.ports().map(String::from).collect())
            .collect();
        if ports.is_empty() {
            return Err(ExportError::InvalidConfig(format!(
                "channel configuration '{}' has no channels",
                config.name()
            )));
        }

        let paths = file_spec.output_paths();
        for path in &paths {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut output = Output {
            sample_format,
            mix: (0..ports.len()).map(|_| Vec::new()).collect(),
            dither: dsp::DitherState::new(format.dither_type(), ports.len()),
            broadcast: file_spec.broadcast_info().cloned(),
            start: timespan.start(),
            split: config.split(),
            ports,
            paths,
            sink: Sink::Done,
            format,
        };
        output.sink = if self.can_stream(&output.format) {
            self.open_stream(&output)?
        } else {
            let dir = output
                .paths
                .first()
                .and_then(|p| p.parent())
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let capture = Capture::create(dir, output.ports.len())?;
            debug!(path = %capture.path().display(), "capturing for postprocessing");
            Sink::Capture(capture)
        };

        debug!(
            timespan = timespan.name(),
            files = output.paths.len(),
            captured = output.is_captured(),
            "registered output"
        );
        self.outputs.push(output);
        Ok(())
    }

    fn process(&mut self, position: SamplePos, nframes: usize, last_cycle: bool) -> Result<usize> {
        if self.scratch.len() < nframes {
            self.scratch.resize(nframes, 0.0);
        }
        let scratch = &mut self.scratch[..nframes];

        for output in &mut self.outputs {
            for (mix, ports) in output.mix.iter_mut().zip(&output.ports) {
                mix.clear();
                mix.resize(nframes, 0.0);
                for port in ports {
                    self.reader.read(port, position, scratch);
                    for (out, sample) in mix.iter_mut().zip(scratch.iter()) {
                        *out += *sample;
                    }
                }
            }

            let mut finished = false;
            match &mut output.sink {
                #[cfg(feature = "wav")]
                Sink::Stream(writers) => {
                    if !output.sample_format.is_float() {
                        dsp::apply_dither(
                            &mut output.mix,
                            output.sample_format.bits(),
                            &mut output.dither,
                        );
                    }
                    if output.split {
                        for (writer, mix) in writers.iter_mut().zip(&output.mix) {
                            writer.write(&[mix.as_slice()], nframes)?;
                        }
                    } else if let Some(writer) = writers.first_mut() {
                        let slices: Vec<&[f32]> = output.mix.iter().map(Vec::as_slice).collect();
                        writer.write(&slices, nframes)?;
                    }

                    if last_cycle {
                        let tail = output
                            .format
                            .silence_end_samples(self.session_rate, self.timecode_fps);
                        for mut writer in std::mem::take(writers) {
                            writer.write_silence(tail)?;
                            writer.finalize()?;
                        }
                        finished = true;
                    }
                }
                Sink::Capture(capture) => capture.write(&output.mix, nframes)?,
                Sink::Done => {}
            }
            if finished {
                output.sink = Sink::Done;
                write_bext(output, self.session_rate, self.session_rate)?;
            }
        }

        Ok(nframes)
    }

    fn needs_postprocessing(&self) -> bool {
        self.outputs.iter().any(Output::is_captured)
    }

    fn postprocess_cycles(&self) -> u64 {
        self.outputs.iter().filter(|o| o.is_captured()).count() as u64
    }

    fn post_process(&mut self) -> Result<bool> {
        while self
            .outputs
            .get(self.next_postprocess)
            .is_some_and(|o| !o.is_captured())
        {
            self.next_postprocess += 1;
        }
        let Some(output) = self.outputs.get_mut(self.next_postprocess) else {
            return Ok(true);
        };

        let Sink::Capture(capture) = std::mem::replace(&mut output.sink, Sink::Done) else {
            return Ok(false);
        };
        debug!(frames = capture.frames(), "reading back capture");
        let channels = capture.read_back()?;

        let output = &self.outputs[self.next_postprocess];
        let result = self.finish_captured(output, channels)?;
        if output.format.analyse() {
            for path in &output.paths {
                self.analysis.insert(path.clone(), result);
            }
        }

        self.next_postprocess += 1;
        Ok(!self.outputs[self.next_postprocess..]
            .iter()
            .any(Output::is_captured))
    }

    fn take_analysis(&mut self) -> AnalysisResults {
        std::mem::take(&mut self.analysis)
    }
}
