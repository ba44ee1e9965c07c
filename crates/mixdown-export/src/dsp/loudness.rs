//! EBU R128 analysis and normalization over planar buffers.

use crate::error::{ExportError, Result};
use ebur128::{EbuR128, Mode};

/// Result of loudness analysis.
#[derive(Debug, Clone, Copy)]
pub struct LoudnessResult {
    /// Integrated loudness in LUFS.
    pub integrated_lufs: f64,
    /// Maximum true peak in dBTP.
    pub true_peak_dbtp: f64,
    /// Loudness range in LU.
    pub loudness_range_lu: f64,
}

fn to_db(linear: f64) -> f64 {
    if linear > 0.0 {
        20.0 * linear.log10()
    } else {
        -144.0
    }
}

fn meter(channels: &[Vec<f32>], sample_rate: u32, mode: Mode) -> Result<EbuR128> {
    let mut meter = EbuR128::new(channels.len().max(1) as u32, sample_rate, mode)
        .map_err(|e| ExportError::Render(format!("loudness meter: {e}")))?;
    let len = channels.iter().map(Vec::len).min().unwrap_or(0);
    if len > 0 {
        let frames: Vec<&[f32]> = channels.iter().map(|c| &c[..len]).collect();
        meter
            .add_frames_planar_f32(&frames)
            .map_err(|e| ExportError::Render(format!("loudness meter: {e}")))?;
    }
    Ok(meter)
}

fn max_true_peak(meter: &EbuR128, channels: usize) -> f64 {
    (0..channels as u32)
        .filter_map(|ch| meter.true_peak(ch).ok())
        .fold(0.0, f64::max)
}

/// One-shot loudness analysis.
pub fn analyze_loudness(channels: &[Vec<f32>], sample_rate: u32) -> Result<LoudnessResult> {
    let meter = meter(channels, sample_rate, Mode::I | Mode::LRA | Mode::TRUE_PEAK)?;
    Ok(LoudnessResult {
        integrated_lufs: meter.loudness_global().unwrap_or(-70.0),
        true_peak_dbtp: to_db(max_true_peak(&meter, channels.len())),
        loudness_range_lu: meter.loudness_range().unwrap_or(0.0),
    })
}

/// Sample peak in dBFS.
pub fn sample_peak_dbfs(channels: &[Vec<f32>]) -> f64 {
    let peak = channels
        .iter()
        .flat_map(|c| c.iter())
        .fold(0.0f32, |acc, s| acc.max(s.abs()));
    to_db(peak as f64)
}

fn apply_gain(channels: &mut [Vec<f32>], gain: f32) {
    for sample in channels.iter_mut().flat_map(|c| c.iter_mut()) {
        *sample *= gain;
    }
}

/// Scale so the sample peak lands on `target_dbfs`. Silence is left alone.
pub fn normalize_peak(channels: &mut [Vec<f32>], target_dbfs: f64) {
    let current = sample_peak_dbfs(channels);
    if current <= -144.0 {
        return;
    }
    let gain = 10.0_f64.powf((target_dbfs - current) / 20.0) as f32;
    apply_gain(channels, gain);
}

/// Scale towards `target_lufs`, optionally backing off so the true peak
/// stays below `true_peak_limit`.
pub fn normalize_loudness(
    channels: &mut [Vec<f32>],
    sample_rate: u32,
    target_lufs: f64,
    true_peak_limit: Option<f64>,
) -> Result<()> {
    let current = analyze_loudness(channels, sample_rate)?;
    if current.integrated_lufs <= -70.0 {
        return Ok(());
    }

    let mut gain_db = target_lufs - current.integrated_lufs;
    if let Some(limit) = true_peak_limit {
        let new_peak = current.true_peak_dbtp + gain_db;
        if new_peak > limit {
            gain_db -= new_peak - limit;
        }
    }

    apply_gain(channels, 10.0_f64.powf(gain_db / 20.0) as f32);
    Ok(())
}
