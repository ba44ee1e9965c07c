//! In-memory track mixer feeding the export render graph.
//!
//! Tracks are decoded up front and summed on demand, so reads for any
//! position are cheap and repeatable. Ports are named `master/out 1`,
//! `master/out 2` for the stereo bus and `<track>/out N` for a single
//! track after gain and pan.

use crate::error::{Error, Result};
use mixdown_core::SamplePos;
use mixdown_export::PortReader;
use std::path::Path;
use tracing::debug;

struct Track {
    name: String,
    channels: Vec<Vec<f32>>,
    position: SamplePos,
    gain: f32,
    pan: f32,
}

impl Track {
    fn end(&self) -> SamplePos {
        self.position + self.channels.first().map_or(0, |c| c.len() as u64)
    }

    /// Balance law: the far side is attenuated linearly, the near side stays at unity.
    fn pan_gain(&self, output: usize) -> f32 {
        match output {
            0 => (1.0 - self.pan).min(1.0),
            _ => (1.0 + self.pan).min(1.0),
        }
    }

    fn mix_into(&self, output: usize, position: SamplePos, out: &mut [f32]) {
        let Some(source) = self
            .channels
            .get(output)
            .or_else(|| self.channels.last())
        else {
            return;
        };

        let start = position.max(self.position);
        let end = (position + out.len() as u64).min(self.position + source.len() as u64);
        if start >= end {
            return;
        }

        let gain = self.gain * self.pan_gain(output);
        let src = &source[(start - self.position) as usize..(end - self.position) as usize];
        let dst = &mut out[(start - position) as usize..(end - position) as usize];
        for (d, s) in dst.iter_mut().zip(src) {
            *d += s * gain;
        }
    }
}

/// Stereo master bus over a set of decoded tracks.
#[derive(Default)]
pub struct MixBus {
    tracks: Vec<Track>,
}

impl MixBus {
    pub const MASTER_LEFT: &'static str = "master/out 1";
    pub const MASTER_RIGHT: &'static str = "master/out 2";

    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track from deinterleaved samples placed at timeline `position`.
    /// `pan` is clamped to `-1.0..=1.0`.
    pub fn add_track(
        &mut self,
        name: impl Into<String>,
        channels: Vec<Vec<f32>>,
        position: SamplePos,
        gain_db: f32,
        pan: f32,
    ) {
        self.tracks.push(Track {
            name: name.into(),
            channels,
            position,
            gain: 10f32.powf(gain_db / 20.0),
            pan: pan.clamp(-1.0, 1.0),
        });
    }

    /// Decode `path` and add it. Its sample rate must match `session_rate`.
    pub fn load_track(
        &mut self,
        name: &str,
        path: &Path,
        position: SamplePos,
        gain_db: f32,
        pan: f32,
        session_rate: u32,
    ) -> Result<()> {
        let (channels, rate) = read_wav(path)?;
        if rate != session_rate {
            return Err(Error::Session(format!(
                "track '{name}' is {rate} Hz but the session runs at {session_rate} Hz"
            )));
        }
        debug!(
            track = name,
            channels = channels.len(),
            frames = channels.first().map_or(0, Vec::len),
            "loaded track"
        );
        self.add_track(name, channels, position, gain_db, pan);
        Ok(())
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Timeline position just past the last sample of any track.
    pub fn length(&self) -> SamplePos {
        self.tracks.iter().map(Track::end).max().unwrap_or(0)
    }
}

/// `(source, output channel)` addressed by a port name.
fn parse_port(port: &str) -> Option<(&str, usize)> {
    let (source, channel) = port.rsplit_once("/out ")?;
    let channel: usize = channel.trim().parse().ok()?;
    channel.checked_sub(1).map(|c| (source, c))
}

impl PortReader for MixBus {
    fn read(&self, port: &str, position: SamplePos, out: &mut [f32]) {
        out.fill(0.0);
        let Some((source, channel)) = parse_port(port) else {
            return;
        };

        if source == "master" {
            if channel < 2 {
                for track in &self.tracks {
                    track.mix_into(channel, position, out);
                }
            }
        } else if let Some(track) = self.tracks.iter().find(|t| t.name == source) {
            track.mix_into(channel, position, out);
        }
    }
}

/// Decode a WAV file to deinterleaved `f32` channels.
pub fn read_wav(path: &Path) -> Result<(Vec<Vec<f32>>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channel_count = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let frames = interleaved.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, sample) in channels.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
    Ok((channels, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn read(bus: &MixBus, port: &str, position: SamplePos, len: usize) -> Vec<f32> {
        let mut out = vec![1.0; len];
        bus.read(port, position, &mut out);
        out
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("master/out 1"), Some(("master", 0)));
        assert_eq!(parse_port("drums/out 2"), Some(("drums", 1)));
        assert_eq!(parse_port("a/b/out 3"), Some(("a/b", 2)));
        assert_eq!(parse_port("master/out 0"), None);
        assert_eq!(parse_port("master"), None);
    }

    #[test]
    fn test_mono_track_offset_and_silence() {
        let mut bus = MixBus::new();
        bus.add_track("bass", vec![vec![0.5; 4]], 2, 0.0, 0.0);
        assert_eq!(bus.length(), 6);

        assert_eq!(
            read(&bus, MixBus::MASTER_LEFT, 0, 8),
            vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.5, 0.0, 0.0]
        );
        assert_eq!(read(&bus, MixBus::MASTER_RIGHT, 4, 2), vec![0.5, 0.5]);
        assert_eq!(read(&bus, "unknown/out 1", 0, 2), vec![0.0, 0.0]);
        assert_eq!(read(&bus, "master/out 3", 2, 2), vec![0.0, 0.0]);
    }

    #[test]
    fn test_gain_pan_and_sum() {
        let mut bus = MixBus::new();
        bus.add_track("a", vec![vec![0.25; 2], vec![0.5; 2]], 0, 0.0, 1.0);
        bus.add_track("b", vec![vec![0.5; 2]], 0, -6.0206, 0.0);

        let left = read(&bus, MixBus::MASTER_LEFT, 0, 2);
        let right = read(&bus, MixBus::MASTER_RIGHT, 0, 2);
        // Hard right pan silences track a on the left.
        assert_relative_eq!(left[0], 0.25, epsilon = 1e-4);
        assert_relative_eq!(right[0], 0.75, epsilon = 1e-4);
        assert_relative_eq!(read(&bus, "a/out 2", 0, 1)[0], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_read_wav_int_and_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [16384i16, -16384, 0, 32767] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let (channels, rate) = read_wav(&path).unwrap();
        assert_eq!(rate, 48000);
        assert_eq!(channels.len(), 2);
        assert_relative_eq!(channels[0][0], 0.5);
        assert_relative_eq!(channels[1][0], -0.5);
        assert_eq!(channels[0].len(), 2);

        let mut bus = MixBus::new();
        let err = bus.load_track("t", &path, 0, 0.0, 0.0, 44100).unwrap_err();
        assert!(matches!(err, Error::Session(_)));
        bus.load_track("t", &path, 0, 0.0, 0.0, 48000).unwrap();
        assert_eq!(bus.track_count(), 1);
    }
}
