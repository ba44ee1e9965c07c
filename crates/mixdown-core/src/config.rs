//! Export handler configuration.

use crate::{Error, Result};
use std::time::Duration;

/// Configuration for the export handler.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Upper bound for waiting on the engine to leave freewheel mode
    /// before an export starts.
    pub freewheel_timeout: Duration,
    /// Sleep between freewheel polls.
    pub freewheel_poll_interval: Duration,
    /// Timecode frames per second, used for silence durations.
    pub timecode_fps: f64,
    /// Written into CUE/TOC headers.
    pub program_name: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            freewheel_timeout: Duration::from_secs(5),
            freewheel_poll_interval: Duration::from_millis(1),
            timecode_fps: 30.0,
            program_name: String::from("Mixdown"),
        }
    }
}

impl HandlerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.freewheel_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "freewheel_timeout must be non-zero".into(),
            ));
        }
        if self.freewheel_poll_interval > self.freewheel_timeout {
            return Err(Error::InvalidConfig(format!(
                "freewheel_poll_interval {:?} exceeds freewheel_timeout {:?}",
                self.freewheel_poll_interval, self.freewheel_timeout
            )));
        }
        if !(self.timecode_fps > 0.0 && self.timecode_fps <= 120.0) {
            return Err(Error::InvalidConfig(format!(
                "timecode_fps {} out of range (0-120]",
                self.timecode_fps
            )));
        }
        Ok(())
    }
}
