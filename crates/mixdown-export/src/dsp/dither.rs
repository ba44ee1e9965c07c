//! Dithering for bit depth reduction.

use mixdown_core::DitherType;

pub struct DitherState {
    random_state: u32,
    errors: Vec<f32>,
    dither_type: DitherType,
}

impl DitherState {
    pub fn new(dither_type: DitherType, channels: usize) -> Self {
        Self {
            random_state: 0x12345678,
            errors: vec![0.0; channels],
            dither_type,
        }
    }

    #[inline]
    fn random(&mut self) -> u32 {
        let mut x = self.random_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.random_state = x;
        x
    }

    #[inline]
    fn rectangular_noise(&mut self) -> f32 {
        (self.random() as f32 / u32::MAX as f32) - 0.5
    }

    #[inline]
    fn triangular_noise(&mut self) -> f32 {
        let r1 = self.random() as f32 / u32::MAX as f32;
        let r2 = self.random() as f32 / u32::MAX as f32;
        r1 - r2
    }
}

/// Add dither noise scaled to one LSB of `target_bits`. Float targets and
/// `DitherType::None` leave the audio untouched.
pub fn apply_dither(channels: &mut [Vec<f32>], target_bits: u16, state: &mut DitherState) {
    if state.dither_type == DitherType::None || target_bits == 0 || target_bits >= 32 {
        return;
    }

    let max_value = (1u32 << (target_bits - 1)) as f32;
    let lsb = 1.0 / max_value;
    if state.errors.len() < channels.len() {
        state.errors.resize(channels.len(), 0.0);
    }

    let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
    for i in 0..frames {
        for (ch, samples) in channels.iter_mut().enumerate() {
            match state.dither_type {
                DitherType::None => {}
                DitherType::Rectangular => {
                    samples[i] += state.rectangular_noise() * lsb;
                }
                DitherType::Triangular => {
                    samples[i] += state.triangular_noise() * lsb;
                }
                DitherType::Shaped => {
                    let dither = state.triangular_noise() * lsb;
                    let shaped = samples[i] + dither - state.errors[ch] * 0.5;
                    let quantized = (shaped * max_value).round() / max_value;
                    state.errors[ch] = quantized - samples[i];
                    samples[i] = quantized;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_dither() {
        let mut channels = vec![vec![0.5, -0.5, 0.25], vec![0.5, -0.5, 0.25]];
        let original = channels.clone();

        let mut state = DitherState::new(DitherType::None, 2);
        apply_dither(&mut channels, 16, &mut state);

        assert_eq!(channels, original);
    }

    #[test]
    fn test_rectangular_dither() {
        let mut channels = vec![vec![0.0; 1000]; 2];

        let mut state = DitherState::new(DitherType::Rectangular, 2);
        apply_dither(&mut channels, 16, &mut state);

        let non_zero = channels[0].iter().filter(|&&x| x != 0.0).count();
        assert!(non_zero > 900, "Expected most samples to have dither noise");

        let max_noise = 1.0 / 32768.0;
        for &sample in &channels[1] {
            assert!(sample.abs() < max_noise * 2.0, "Noise exceeds expected bounds");
        }
    }

    #[test]
    fn test_triangular_dither_bounded() {
        let mut channels = vec![vec![0.0; 1000]; 3];

        let mut state = DitherState::new(DitherType::Triangular, 3);
        apply_dither(&mut channels, 16, &mut state);

        let max_noise = 1.0 / 32768.0;
        let max_sample = channels[2].iter().map(|x| x.abs()).fold(0.0f32, f32::max);
        assert!(max_sample < max_noise * 3.0);
    }

    #[test]
    fn test_float_target_untouched() {
        let mut channels = vec![vec![0.1; 64]];
        let mut state = DitherState::new(DitherType::Triangular, 1);
        apply_dither(&mut channels, 32, &mut state);
        assert!(channels[0].iter().all(|&s| s == 0.1));
    }
}
