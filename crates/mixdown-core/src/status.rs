//! Cross-thread export progress and result state.
//!
//! `running`, `aborted` and `errors` change together under one lock.
//! Progress counters are plain atomics read without locking; pollers may
//! observe a slightly stale mix of values, which is fine for display.

use crate::lockfree::{AtomicCounter, AtomicTag};
use arc_swap::ArcSwap;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// What the exporter is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ActiveJob {
    #[default]
    Exporting = 0,
    Normalizing = 1,
    Encoding = 2,
    Tagging = 3,
    Uploading = 4,
    Command = 5,
}

impl ActiveJob {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ActiveJob::Normalizing,
            2 => ActiveJob::Encoding,
            3 => ActiveJob::Tagging,
            4 => ActiveJob::Uploading,
            5 => ActiveJob::Command,
            _ => ActiveJob::Exporting,
        }
    }
}

/// Per-file analysis produced by the render graph.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnalysisResult {
    /// Sample peak in dBFS.
    pub peak_dbfs: f64,
    /// Integrated loudness in LUFS.
    pub integrated_lufs: f64,
    /// Maximum true peak in dBTP.
    pub true_peak_dbtp: f64,
    /// Loudness range in LU.
    pub loudness_range_lu: f64,
    /// Frames written.
    pub length_samples: u64,
    pub sample_rate: u32,
}

pub type AnalysisResults = BTreeMap<PathBuf, AnalysisResult>;

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    aborted: bool,
    errors: bool,
    finished: bool,
}

/// Point-in-time copy of the progress counters.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    pub running: bool,
    pub aborted: bool,
    pub errors: bool,
    pub active_job: ActiveJob,
    pub total_timespans: u64,
    pub timespan: u64,
    pub timespan_name: String,
    pub total_samples: u64,
    pub processed_samples: u64,
    pub total_samples_current_timespan: u64,
    pub processed_samples_current_timespan: u64,
    pub total_postprocessing_cycles: u64,
    pub current_postprocessing_cycle: u64,
}

impl ExportProgress {
    /// Overall completion in `0.0..=1.0`.
    pub fn fraction(&self) -> f32 {
        if self.active_job == ActiveJob::Normalizing && self.total_postprocessing_cycles > 0 {
            return (self.current_postprocessing_cycle as f32
                / self.total_postprocessing_cycles as f32)
                .min(1.0);
        }
        if self.total_samples == 0 {
            return 0.0;
        }
        (self.processed_samples as f32 / self.total_samples as f32).min(1.0)
    }
}

/// Export progress shared between the handler, the audio thread and pollers.
///
/// One instance per session, reset by [`ExportStatus::init`] at the start
/// of every export.
#[derive(Debug)]
pub struct ExportStatus {
    state: Mutex<RunState>,
    finished: Condvar,

    active_job: AtomicTag,
    total_timespans: AtomicCounter,
    timespan: AtomicCounter,
    timespan_name: ArcSwap<String>,

    total_samples: AtomicCounter,
    processed_samples: AtomicCounter,
    total_samples_current_timespan: AtomicCounter,
    processed_samples_current_timespan: AtomicCounter,

    total_postprocessing_cycles: AtomicCounter,
    current_postprocessing_cycle: AtomicCounter,

    result_map: Mutex<AnalysisResults>,
}

impl Default for ExportStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportStatus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::default()),
            finished: Condvar::new(),
            active_job: AtomicTag::default(),
            total_timespans: AtomicCounter::default(),
            timespan: AtomicCounter::default(),
            timespan_name: ArcSwap::from_pointee(String::new()),
            total_samples: AtomicCounter::default(),
            processed_samples: AtomicCounter::default(),
            total_samples_current_timespan: AtomicCounter::default(),
            processed_samples_current_timespan: AtomicCounter::default(),
            total_postprocessing_cycles: AtomicCounter::default(),
            current_postprocessing_cycle: AtomicCounter::default(),
            result_map: Mutex::new(AnalysisResults::new()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Reset everything for a new export.
    pub fn init(&self) {
        {
            let mut state = self.state.lock();
            *state = RunState::default();
        }
        self.active_job.set(ActiveJob::Exporting as u8);
        self.total_timespans.set(0);
        self.timespan.set(0);
        self.timespan_name.store(Arc::new(String::new()));
        self.total_samples.set(0);
        self.processed_samples.set(0);
        self.total_samples_current_timespan.set(0);
        self.processed_samples_current_timespan.set(0);
        self.total_postprocessing_cycles.set(0);
        self.current_postprocessing_cycle.set(0);
        self.result_map.lock().clear();
    }

    // --- locked trio ---

    pub fn running(&self) -> bool {
        self.state.lock().running
    }

    pub fn set_running(&self, running: bool) {
        self.state.lock().running = running;
    }

    pub fn aborted(&self) -> bool {
        self.state.lock().aborted
    }

    pub fn errors(&self) -> bool {
        self.state.lock().errors
    }

    /// Cooperative cancellation. `error_occurred` marks the run as failed.
    pub fn abort(&self, error_occurred: bool) {
        let mut state = self.state.lock();
        state.aborted = true;
        state.running = false;
        state.errors |= error_occurred;
    }

    /// Mark the export as over and wake any waiters.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.finished = true;
        self.finished.notify_all();
    }

    pub fn finished(&self) -> bool {
        self.state.lock().finished
    }

    /// Block until [`finish`](Self::finish) is called or `timeout` elapses.
    /// Returns whether the export finished.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.finished {
            return true;
        }
        let _ = self
            .finished
            .wait_while_for(&mut state, |s| !s.finished, timeout);
        state.finished
    }

    // --- unlocked progress ---

    pub fn active_job(&self) -> ActiveJob {
        ActiveJob::from_u8(self.active_job.get())
    }

    pub fn set_active_job(&self, job: ActiveJob) {
        self.active_job.set(job as u8);
    }

    pub fn total_timespans(&self) -> u64 {
        self.total_timespans.get()
    }

    pub fn set_total_timespans(&self, count: u64) {
        self.total_timespans.set(count);
    }

    /// 1-based index of the timespan being rendered.
    pub fn timespan(&self) -> u64 {
        self.timespan.get()
    }

    pub fn timespan_name(&self) -> Arc<String> {
        self.timespan_name.load_full()
    }

    pub fn begin_timespan(&self, name: &str, length: u64) {
        self.timespan.increment();
        self.timespan_name.store(Arc::new(name.to_string()));
        self.total_samples_current_timespan.set(length);
        self.processed_samples_current_timespan.set(0);
        self.total_postprocessing_cycles.set(0);
        self.current_postprocessing_cycle.set(0);
        self.set_active_job(ActiveJob::Exporting);
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples.get()
    }

    pub fn set_total_samples(&self, total: u64) {
        self.total_samples.set(total);
    }

    pub fn processed_samples(&self) -> u64 {
        self.processed_samples.get()
    }

    pub fn total_samples_current_timespan(&self) -> u64 {
        self.total_samples_current_timespan.get()
    }

    pub fn processed_samples_current_timespan(&self) -> u64 {
        self.processed_samples_current_timespan.get()
    }

    pub fn add_processed_samples(&self, count: u64) {
        self.processed_samples.add(count);
        self.processed_samples_current_timespan.add(count);
    }

    pub fn total_postprocessing_cycles(&self) -> u64 {
        self.total_postprocessing_cycles.get()
    }

    pub fn set_total_postprocessing_cycles(&self, total: u64) {
        self.total_postprocessing_cycles.set(total);
    }

    pub fn current_postprocessing_cycle(&self) -> u64 {
        self.current_postprocessing_cycle.get()
    }

    pub fn advance_postprocessing_cycle(&self) -> u64 {
        self.current_postprocessing_cycle.increment()
    }

    // --- results ---

    pub fn add_results(&self, results: AnalysisResults) {
        self.result_map.lock().extend(results);
    }

    pub fn results(&self) -> AnalysisResults {
        self.result_map.lock().clone()
    }

    pub fn progress(&self) -> ExportProgress {
        let (running, aborted, errors) = {
            let state = self.state.lock();
            (state.running, state.aborted, state.errors)
        };
        ExportProgress {
            running,
            aborted,
            errors,
            active_job: self.active_job(),
            total_timespans: self.total_timespans(),
            timespan: self.timespan(),
            timespan_name: self.timespan_name().as_ref().clone(),
            total_samples: self.total_samples(),
            processed_samples: self.processed_samples(),
            total_samples_current_timespan: self.total_samples_current_timespan(),
            processed_samples_current_timespan: self.processed_samples_current_timespan(),
            total_postprocessing_cycles: self.total_postprocessing_cycles(),
            current_postprocessing_cycle: self.current_postprocessing_cycle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_sets_trio() {
        let status = ExportStatus::new();
        status.set_running(true);
        status.abort(false);
        assert!(!status.running());
        assert!(status.aborted());
        assert!(!status.errors());

        status.abort(true);
        assert!(status.errors());
    }

    #[test]
    fn test_init_resets() {
        let status = ExportStatus::new();
        status.set_running(true);
        status.abort(true);
        status.set_total_samples(100);
        status.add_processed_samples(40);
        status.finish();

        status.init();
        assert!(!status.aborted());
        assert!(!status.errors());
        assert!(!status.finished());
        assert_eq!(status.processed_samples(), 0);
        assert_eq!(status.total_samples(), 0);
    }

    #[test]
    fn test_begin_timespan_resets_current_counters() {
        let status = ExportStatus::new();
        status.begin_timespan("a", 100);
        status.add_processed_samples(100);
        status.begin_timespan("b", 50);
        assert_eq!(status.timespan(), 2);
        assert_eq!(status.timespan_name().as_str(), "b");
        assert_eq!(status.processed_samples_current_timespan(), 0);
        assert_eq!(status.processed_samples(), 100);
        assert_eq!(status.total_samples_current_timespan(), 50);
    }

    #[test]
    fn test_progress_fraction() {
        let status = ExportStatus::new();
        status.set_total_samples(200);
        status.add_processed_samples(50);
        assert!((status.progress().fraction() - 0.25).abs() < 1e-6);

        status.set_active_job(ActiveJob::Normalizing);
        status.set_total_postprocessing_cycles(4);
        status.advance_postprocessing_cycle();
        assert!((status.progress().fraction() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_wait_finished_across_threads() {
        let status = ExportStatus::shared();
        let other = Arc::clone(&status);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            other.finish();
        });
        assert!(status.wait_finished(Duration::from_secs(5)));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_finished_times_out() {
        let status = ExportStatus::new();
        assert!(!status.wait_finished(Duration::from_millis(5)));
    }
}
