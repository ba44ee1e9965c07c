//! Sample rate conversion using rubato.

use crate::error::{ExportError, Result};
use mixdown_core::SrcQuality;
use rubato::{FftFixedIn, Resampler};

fn chunk_size(quality: SrcQuality) -> usize {
    match quality {
        SrcQuality::Fastest | SrcQuality::ZeroOrderHold | SrcQuality::Linear => 512,
        SrcQuality::Quick => 1024,
        SrcQuality::Good => 2048,
        SrcQuality::Best => 4096,
    }
}

fn sub_chunks(quality: SrcQuality) -> usize {
    match quality {
        SrcQuality::Fastest | SrcQuality::ZeroOrderHold | SrcQuality::Linear => 1,
        SrcQuality::Quick => 2,
        SrcQuality::Good => 4,
        SrcQuality::Best => 8,
    }
}

/// Resample planar audio from `source_rate` to `target_rate`.
pub fn resample(
    channels: &[Vec<f32>],
    source_rate: u32,
    target_rate: u32,
    quality: SrcQuality,
) -> Result<Vec<Vec<f32>>> {
    if source_rate == target_rate || channels.is_empty() {
        return Ok(channels.to_vec());
    }

    let input_frames = channels[0].len();
    if channels.iter().any(|c| c.len() != input_frames) {
        return Err(ExportError::Resample(
            "channels have different lengths".into(),
        ));
    }

    let chunk_size = chunk_size(quality);
    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        chunk_size,
        sub_chunks(quality),
        channels.len(),
    )?;

    let expected_output_frames =
        (input_frames as f64 * target_rate as f64 / source_rate as f64).ceil() as usize;
    let mut output: Vec<Vec<f32>> = channels
        .iter()
        .map(|_| Vec::with_capacity(expected_output_frames + chunk_size))
        .collect();

    let mut pos = 0;
    while pos < input_frames {
        let needed = resampler.input_frames_next();
        let copy_frames = (input_frames - pos).min(needed);

        let chunk: Vec<Vec<f32>> = channels
            .iter()
            .map(|c| {
                let mut buf = vec![0.0f32; needed];
                buf[..copy_frames].copy_from_slice(&c[pos..pos + copy_frames]);
                buf
            })
            .collect();

        let resampled = resampler.process(&chunk, None)?;
        for (out, data) in output.iter_mut().zip(resampled.iter()) {
            out.extend_from_slice(data);
        }

        pos += needed;
    }

    for out in &mut output {
        let len = expected_output_frames.min(out.len());
        out.truncate(len);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_no_resample_needed() {
        let channels = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let out = resample(&channels, 44100, 44100, SrcQuality::Fastest).unwrap();
        assert_eq!(out, channels);
    }

    #[test]
    fn test_resample_upsample() {
        let channels = vec![sine(44100, 4410); 2];
        let out = resample(&channels, 44100, 48000, SrcQuality::Good).unwrap();

        let expected = (4410.0_f64 * 48000.0 / 44100.0) as i64;
        assert!((out[0].len() as i64 - expected).abs() < 100);
        assert_eq!(out[0].len(), out[1].len());
    }

    #[test]
    fn test_resample_downsample_mono() {
        let channels = vec![sine(96000, 9600)];
        let out = resample(&channels, 96000, 44100, SrcQuality::Best).unwrap();

        let expected = (9600.0_f64 * 44100.0 / 96000.0) as i64;
        assert!((out[0].len() as i64 - expected).abs() < 100);
    }

    #[test]
    fn test_mismatched_channel_lengths() {
        let channels = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0]];
        assert!(resample(&channels, 44100, 48000, SrcQuality::Quick).is_err());
    }
}
