//! On-disk capture for outputs that need a second pass.
//!
//! Samples are stored as interleaved little-endian `f32` in a temporary
//! file next to the output. The file is removed when the capture is
//! dropped, whether the export finished or was aborted.

use crate::error::Result;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub(crate) const CAPTURE_SUFFIX: &str = ".capture";

pub(crate) struct Capture {
    file: BufWriter<NamedTempFile>,
    channels: usize,
    frames: u64,
}

impl Capture {
    /// Create an empty capture in `dir`.
    pub(crate) fn create(dir: &Path, channels: usize) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(".mixdown-")
            .suffix(CAPTURE_SUFFIX)
            .tempfile_in(dir)?;
        Ok(Self {
            file: BufWriter::new(file),
            channels,
            frames: 0,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        self.file.get_ref().path()
    }

    pub(crate) fn frames(&self) -> u64 {
        self.frames
    }

    /// Append the first `frames` samples of each channel.
    pub(crate) fn write(&mut self, channels: &[Vec<f32>], frames: usize) -> Result<()> {
        for i in 0..frames {
            for channel in channels {
                self.file.write_all(&channel[i].to_le_bytes())?;
            }
        }
        self.frames += frames as u64;
        Ok(())
    }

    /// Read everything back as planar buffers and delete the file.
    pub(crate) fn read_back(self) -> Result<Vec<Vec<f32>>> {
        let frames = self.frames as usize;
        let mut file = self.file.into_inner().map_err(|e| e.into_error())?;
        file.seek(SeekFrom::Start(0))?;

        let mut channels: Vec<Vec<f32>> =
            (0..self.channels).map(|_| Vec::with_capacity(frames)).collect();
        let mut reader = BufReader::new(file.as_file_mut());
        let mut frame = vec![0u8; 4 * self.channels];
        for _ in 0..frames {
            reader.read_exact(&mut frame)?;
            for (channel, bytes) in channels.iter_mut().zip(frame.chunks_exact(4)) {
                channel.push(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
            }
        }
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_back_restores_planar_channels() {
        let dir = tempdir().unwrap();
        let mut capture = Capture::create(dir.path(), 2).unwrap();
        capture.write(&[vec![0.5, 0.25], vec![-0.5, -0.25]], 2).unwrap();
        capture.write(&[vec![1.0, 9.0], vec![-1.0, 9.0]], 1).unwrap();
        assert_eq!(capture.frames(), 3);

        let path = capture.path().to_path_buf();
        assert!(path.exists());

        let channels = capture.read_back().unwrap();
        assert_eq!(channels, vec![vec![0.5, 0.25, 1.0], vec![-0.5, -0.25, -1.0]]);
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempdir().unwrap();
        let mut capture = Capture::create(dir.path(), 1).unwrap();
        capture.write(&[vec![0.1; 16]], 16).unwrap();
        let path = capture.path().to_path_buf();
        assert!(path.exists());

        drop(capture);
        assert!(!path.exists());
    }
}
