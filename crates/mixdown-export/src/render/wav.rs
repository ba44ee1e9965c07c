//! WAV output using hound.
//!
//! Supports 8, 16, 24 and 32-bit integer and 32-bit float files, written
//! either in one go from planar buffers or streamed cycle by cycle.
//! Broadcast info is appended afterwards as a BWF `bext` chunk.

use crate::error::{ExportError, Result};
use hound::{SampleFormat as HoundFormat, WavSpec, WavWriter};
use mixdown_core::{BroadcastInfo, SampleFormat};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Build the hound spec for `format`.
pub fn wav_spec(format: SampleFormat, channels: u16, sample_rate: u32) -> Result<WavSpec> {
    let (bits_per_sample, sample_format) = match format {
        SampleFormat::S8 | SampleFormat::U8 => (8, HoundFormat::Int),
        SampleFormat::S16 => (16, HoundFormat::Int),
        SampleFormat::S24 => (24, HoundFormat::Int),
        SampleFormat::S32 => (32, HoundFormat::Int),
        SampleFormat::Float => (32, HoundFormat::Float),
        SampleFormat::Double => {
            return Err(ExportError::UnsupportedFormat(
                "WAV output does not support 64-bit float".into(),
            ))
        }
    };

    Ok(WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format,
    })
}

/// Streaming writer fed one cycle at a time.
pub struct WavFileWriter {
    writer: WavWriter<BufWriter<File>>,
    format: SampleFormat,
    frames: u64,
}

impl WavFileWriter {
    pub fn create(path: &Path, format: SampleFormat, channels: u16, sample_rate: u32) -> Result<Self> {
        let spec = wav_spec(format, channels, sample_rate)?;
        let writer = WavWriter::create(path, spec)?;
        Ok(Self {
            writer,
            format,
            frames: 0,
        })
    }

    /// Interleave and append the first `frames` samples of each channel.
    pub fn write(&mut self, channels: &[&[f32]], frames: usize) -> Result<()> {
        write_interleaved(&mut self.writer, channels, frames, self.format)?;
        self.frames += frames as u64;
        Ok(())
    }

    /// Append `frames` of digital silence.
    pub fn write_silence(&mut self, frames: u64) -> Result<()> {
        let channels = self.writer.spec().channels as u64;
        for _ in 0..frames * channels {
            write_sample(&mut self.writer, 0.0, self.format)?;
        }
        self.frames += frames;
        Ok(())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn finalize(self) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

/// Encode planar audio to a WAV file.
pub fn write_wav_file(
    path: &Path,
    channels: &[Vec<f32>],
    format: SampleFormat,
    sample_rate: u32,
) -> Result<()> {
    let frames = channels.first().map_or(0, Vec::len);
    if channels.iter().any(|c| c.len() != frames) {
        return Err(ExportError::Encoding(
            "channels have different lengths".into(),
        ));
    }

    let spec = wav_spec(format, channels.len() as u16, sample_rate)?;
    let mut writer = WavWriter::create(path, spec)?;
    let slices: Vec<&[f32]> = channels.iter().map(Vec::as_slice).collect();
    write_interleaved(&mut writer, &slices, frames, format)?;
    writer.finalize()?;

    Ok(())
}

/// Size of a version 1 `bext` body without coding history.
const BEXT_LEN: usize = 602;

fn put_fixed(body: &mut Vec<u8>, text: &str, len: usize) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(len);
    body.extend_from_slice(&bytes[..n]);
    body.resize(body.len() + len - n, 0);
}

fn bext_body(info: &BroadcastInfo, time_reference: u64) -> Vec<u8> {
    let (date, time) = info
        .origination_time
        .split_once(' ')
        .unwrap_or((info.origination_time.as_str(), ""));

    let mut body = Vec::with_capacity(BEXT_LEN);
    put_fixed(&mut body, &info.description, 256);
    put_fixed(&mut body, &info.originator, 32);
    put_fixed(&mut body, &info.originator_reference, 32);
    put_fixed(&mut body, date, 10);
    put_fixed(&mut body, time, 8);
    body.extend_from_slice(&time_reference.to_le_bytes());
    body.extend_from_slice(&1u16.to_le_bytes());
    // UMID and reserved
    body.resize(BEXT_LEN, 0);
    body
}

/// Append a `bext` chunk to a finished WAV file and patch the RIFF size.
///
/// `time_reference` is the first sample of the file on the session timeline.
pub fn append_bext_chunk(path: &Path, info: &BroadcastInfo, time_reference: u64) -> Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;

    let mut header = [0u8; 12];
    file.read_exact(&mut header)?;
    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        return Err(ExportError::Encoding(format!(
            "{} is not a RIFF/WAVE file",
            path.display()
        )));
    }

    let body = bext_body(info, time_reference);
    let end = file.seek(SeekFrom::End(0))?;
    // Chunks start on even offsets.
    if end % 2 == 1 {
        file.write_all(&[0])?;
    }
    file.write_all(b"bext")?;
    file.write_all(&(body.len() as u32).to_le_bytes())?;
    file.write_all(&body)?;

    let riff_size = file.seek(SeekFrom::End(0))? - 8;
    let riff_size = u32::try_from(riff_size)
        .map_err(|_| ExportError::Encoding("WAV file exceeds 4 GiB".into()))?;
    file.seek(SeekFrom::Start(4))?;
    file.write_all(&riff_size.to_le_bytes())?;
    file.flush()?;
    Ok(())
}

fn write_interleaved<W: Write + Seek>(
    writer: &mut WavWriter<W>,
    channels: &[&[f32]],
    frames: usize,
    format: SampleFormat,
) -> Result<()> {
    for i in 0..frames {
        for channel in channels {
            write_sample(writer, channel[i], format)?;
        }
    }
    Ok(())
}

#[inline]
fn write_sample<W: Write + Seek>(
    writer: &mut WavWriter<W>,
    sample: f32,
    format: SampleFormat,
) -> Result<()> {
    match format {
        SampleFormat::S8 | SampleFormat::U8 => writer.write_sample(float_to_i8(sample))?,
        SampleFormat::S16 => writer.write_sample(float_to_i16(sample))?,
        SampleFormat::S24 => writer.write_sample(float_to_i24(sample))?,
        SampleFormat::S32 => writer.write_sample(float_to_i32(sample))?,
        SampleFormat::Float | SampleFormat::Double => writer.write_sample(sample)?,
    }
    Ok(())
}

#[inline]
fn float_to_i8(sample: f32) -> i8 {
    (sample.clamp(-1.0, 1.0) * 127.0) as i8
}

/// Convert float sample to 16-bit integer with clipping
#[inline]
fn float_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Convert float sample to 24-bit integer (stored as i32) with clipping
#[inline]
fn float_to_i24(sample: f32) -> i32 {
    (sample.clamp(-1.0, 1.0) * 8388607.0) as i32
}

#[inline]
fn float_to_i32(sample: f32) -> i32 {
    (sample.clamp(-1.0, 1.0) as f64 * 2147483647.0) as i32
}
