//! Seams between the handler and the audio it renders.

use crate::error::Result;
use mixdown_core::{AnalysisResults, FileSpec, SamplePos, Timespan};
use std::sync::Arc;

/// Source of session audio, addressed by port name.
pub trait PortReader: Send + Sync {
    /// Fill `out` with the samples of `port` starting at timeline sample
    /// `position`. Unknown ports and positions past the end read as silence.
    fn read(&self, port: &str, position: SamplePos, out: &mut [f32]);
}

/// Renders the FileSpecs of one timespan.
///
/// The handler drives a graph through one lifecycle per timespan:
/// `reset`, `add_config` for every FileSpec, repeated `process` calls until
/// `last_cycle`, then `post_process` until it reports completion when
/// [`needs_postprocessing`](RenderGraph::needs_postprocessing) is set.
pub trait RenderGraph: Send {
    /// Tear down every registered config. Files being written are closed.
    fn reset(&mut self);

    fn add_config(&mut self, timespan: &Arc<Timespan>, file_spec: &FileSpec) -> Result<()>;

    /// Consume `nframes` samples starting at `position`. Returns frames consumed.
    fn process(&mut self, position: SamplePos, nframes: usize, last_cycle: bool) -> Result<usize>;

    fn needs_postprocessing(&self) -> bool;

    /// Expected number of `post_process` calls, for progress display.
    fn postprocess_cycles(&self) -> u64;

    /// One unit of postprocessing. Returns `true` once everything is written.
    fn post_process(&mut self) -> Result<bool>;

    /// Analysis gathered since the last call.
    fn take_analysis(&mut self) -> AnalysisResults;
}
