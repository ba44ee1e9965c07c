//! Audio engine seam and an offline driver.

use crate::error::{ExportError, Result};
use crate::handler::{Cycle, ExportHandler};
use mixdown_core::{AtomicFlag, ExportProgress};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// What the handler needs from the engine that calls it.
pub trait AudioEngine: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Whether the engine is running faster than realtime.
    fn freewheeling(&self) -> bool;

    /// Request freewheel mode. May take effect on a later cycle.
    fn set_freewheel(&self, enabled: bool);
}

/// Engine without an audio device.
///
/// [`run`](Self::run) calls the handler in a loop. Freewheeling cycles run
/// back to back; realtime cycles are paced to the block duration.
#[derive(Debug)]
pub struct OfflineEngine {
    sample_rate: u32,
    block_size: usize,
    freewheel: AtomicFlag,
}

impl OfflineEngine {
    const DEFAULT_BLOCK_SIZE: usize = 1024;
    const IDLE_SLEEP: Duration = Duration::from_micros(200);

    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            block_size: Self::DEFAULT_BLOCK_SIZE,
            freewheel: AtomicFlag::new(false),
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate.max(1) as f64)
    }

    /// Drive `handler` until its export finishes.
    ///
    /// `on_progress` is called after every cycle that did work. Returns an
    /// error if the export failed; a plain abort is not an error.
    pub fn run(
        &self,
        handler: &ExportHandler,
        mut on_progress: impl FnMut(&ExportProgress),
    ) -> Result<()> {
        let status = handler.status();
        if !status.running() && !status.finished() {
            return Err(mixdown_core::Error::InvalidState("no export has been started".into()).into());
        }

        let mut cycles = 0u64;
        while !status.finished() {
            match handler.process(self.block_size) {
                Cycle::Rendered(_) => {
                    if !self.freewheeling() {
                        thread::sleep(self.block_duration());
                    }
                }
                Cycle::Postprocessed => {}
                Cycle::Idle | Cycle::Busy | Cycle::Handoff | Cycle::WaitingForFreewheel => {
                    thread::sleep(Self::IDLE_SLEEP);
                    continue;
                }
                Cycle::Aborted => {}
            }
            cycles += 1;
            on_progress(&status.progress());
        }
        debug!(cycles, "offline engine stopped");

        if status.errors() {
            return Err(ExportError::Render("export failed, see log for details".into()));
        }
        Ok(())
    }
}

impl AudioEngine for OfflineEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn freewheeling(&self) -> bool {
        self.freewheel.get()
    }

    fn set_freewheel(&self, enabled: bool) {
        self.freewheel.set(enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::FileWriterGraph;
    use mixdown_core::{ExportStatus, HandlerConfig, Session};
    use std::sync::Arc;

    #[test]
    fn test_run_requires_started_export() {
        let engine = Arc::new(OfflineEngine::new(44100));
        let session = Arc::new(Session::new("song", "/tmp/song", 44100));
        struct Silence;
        impl crate::graph::PortReader for Silence {
            fn read(&self, _port: &str, _position: u64, out: &mut [f32]) {
                out.fill(0.0);
            }
        }
        let graph = FileWriterGraph::new(Arc::new(Silence), 44100, 30.0);
        let handler = ExportHandler::new(
            session,
            engine.clone(),
            Box::new(graph),
            ExportStatus::shared(),
            HandlerConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            engine.run(&handler, |_| {}),
            Err(ExportError::Core(mixdown_core::Error::InvalidState(_)))
        ));
    }

    #[test]
    fn test_block_size_clamped() {
        let engine = OfflineEngine::new(48000).with_block_size(0);
        assert_eq!(engine.block_size(), 1);
        assert!(!engine.freewheeling());
        engine.set_freewheel(true);
        assert!(engine.freewheeling());
    }
}
