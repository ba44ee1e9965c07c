//! FLAC output using flacenc.
//!
//! Supports 8, 16 and 24-bit lossless encoding.

use crate::error::{ExportError, Result};
use flacenc::bitsink::ByteSink;
use flacenc::component::BitRepr;
use flacenc::config::Encoder as EncoderConfig;
use flacenc::encode_with_fixed_block_size;
use flacenc::error::Verify;
use flacenc::source::MemSource;
use mixdown_core::SampleFormat;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const BLOCK_SIZE: usize = 4096;

fn bits_per_sample(format: SampleFormat) -> Result<usize> {
    match format {
        SampleFormat::S8 => Ok(8),
        SampleFormat::S16 => Ok(16),
        SampleFormat::S24 => Ok(24),
        other => Err(ExportError::UnsupportedFormat(format!(
            "FLAC does not support {} samples, use 8, 16 or 24-bit",
            other.name()
        ))),
    }
}

/// Encode planar audio to a FLAC file.
pub fn write_flac_file(
    path: &Path,
    channels: &[Vec<f32>],
    format: SampleFormat,
    sample_rate: u32,
) -> Result<()> {
    let data = encode_flac_memory(channels, format, sample_rate)?;
    let mut file = File::create(path)?;
    file.write_all(&data)?;
    Ok(())
}

/// Encode planar audio to FLAC bytes.
pub fn encode_flac_memory(
    channels: &[Vec<f32>],
    format: SampleFormat,
    sample_rate: u32,
) -> Result<Vec<u8>> {
    let bits = bits_per_sample(format)?;
    let frames = channels.first().map_or(0, Vec::len);
    if channels.is_empty() || channels.iter().any(|c| c.len() != frames) {
        return Err(ExportError::Encoding(
            "channels are missing or have different lengths".into(),
        ));
    }

    let interleaved = interleave_to_i32(channels, bits);

    let encoder_config = EncoderConfig::default()
        .into_verified()
        .map_err(|e| ExportError::Encoding(format!("Invalid FLAC config: {:?}", e)))?;

    let source = MemSource::from_samples(&interleaved, channels.len(), bits, sample_rate as usize);

    let stream = encode_with_fixed_block_size(&encoder_config, source, BLOCK_SIZE)
        .map_err(|e| ExportError::Encoding(format!("FLAC encoding failed: {:?}", e)))?;

    let mut sink = ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|e| ExportError::Encoding(format!("Failed to write FLAC stream: {:?}", e)))?;

    Ok(sink.into_inner())
}

fn interleave_to_i32(channels: &[Vec<f32>], bits: usize) -> Vec<i32> {
    let frames = channels.first().map_or(0, Vec::len);
    let scale = ((1i64 << (bits - 1)) - 1) as f32;
    let mut interleaved = Vec::with_capacity(frames * channels.len());

    for i in 0..frames {
        for channel in channels {
            interleaved.push((channel[i].clamp(-1.0, 1.0) * scale) as i32);
        }
    }

    interleaved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flac_rejects_float() {
        let channels = vec![vec![0.0; 100]; 2];
        assert!(encode_flac_memory(&channels, SampleFormat::Float, 44100).is_err());
    }

    #[test]
    fn test_interleave_to_i32() {
        let channels = vec![vec![0.0, 1.0], vec![0.5, -0.5]];
        let interleaved = interleave_to_i32(&channels, 16);

        assert_eq!(interleaved, vec![0, 16383, 32767, -16383]);
    }

    #[test]
    fn test_encode_has_magic() {
        let channels = vec![vec![0.1f32; 8192]; 2];
        let bytes = encode_flac_memory(&channels, SampleFormat::S16, 44100).unwrap();
        assert_eq!(&bytes[0..4], b"fLaC");
    }

    #[test]
    fn test_mismatched_channel_lengths() {
        let channels = vec![vec![0.0, 0.5], vec![0.0]];
        assert!(encode_flac_memory(&channels, SampleFormat::S16, 44100).is_err());
    }
}
