//! DSP stages applied between capture and encoding.

mod dither;
mod loudness;
mod resample;

pub(crate) use dither::{apply_dither, DitherState};
pub(crate) use loudness::{
    analyze_loudness, normalize_loudness, normalize_peak, sample_peak_dbfs, LoudnessResult,
};
pub(crate) use resample::resample;

/// Number of leading frames whose every channel is exactly zero.
pub(crate) fn leading_silence(channels: &[Vec<f32>]) -> usize {
    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    (0..frames)
        .find(|&i| channels.iter().any(|c| c[i] != 0.0))
        .unwrap_or(frames)
}

/// Number of trailing frames whose every channel is exactly zero.
pub(crate) fn trailing_silence(channels: &[Vec<f32>]) -> usize {
    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    (0..frames)
        .rev()
        .find(|&i| channels.iter().any(|c| c[i] != 0.0))
        .map(|last| frames - last - 1)
        .unwrap_or(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_scan() {
        let channels = vec![vec![0.0, 0.0, 0.3, 0.0], vec![0.0, 0.0, 0.0, 0.0]];
        assert_eq!(leading_silence(&channels), 2);
        assert_eq!(trailing_silence(&channels), 1);

        let silent = vec![vec![0.0; 5]];
        assert_eq!(leading_silence(&silent), 5);
        assert_eq!(trailing_silence(&silent), 5);
    }
}
