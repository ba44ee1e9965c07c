//! Export orchestration.
//!
//! The handler keeps a map from timespan to the FileSpecs rendered for it
//! and works through it one timespan at a time:
//!
//! ```text
//! Idle -> Handoff -> Exporting -> [Postprocessing] -> Handoff -> ... -> Idle
//! ```
//!
//! `Exporting` and `Postprocessing` advance from [`ExportHandler::process`],
//! called once per engine cycle. Setting up a timespan happens on the
//! export worker thread; `Handoff` means a start task is queued for it.
//! The audio thread only ever `try_lock`s the handler state, so it never
//! waits on the worker.

use crate::cd_marker::{write_cd_marker_file, CdMarkerFormat};
use crate::check::format_error;
use crate::command::{run_command, Substitutions};
use crate::engine::AudioEngine;
use crate::error::{ExportError, Result};
use crate::graph::RenderGraph;
use crate::tagging::Tagger;
use crate::upload::Uploader;
use crate::worker::{self, Task, TaskSender, Worker};
use mixdown_core::{
    ActiveJob, BroadcastInfo, ChannelConfig, ExportStatus, FileSpec, HandlerConfig, SamplePos,
    Session, Timespan,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome of one [`ExportHandler::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// No export in progress.
    Idle,
    /// Handler state is held by another thread; try again next cycle.
    Busy,
    /// Rendered this many frames of the current timespan.
    Rendered(usize),
    /// Ran one postprocessing step.
    Postprocessed,
    /// Postprocessing is pending until the engine freewheels.
    WaitingForFreewheel,
    /// The next timespan is being set up on the worker.
    Handoff,
    /// An abort was observed and the export torn down.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerState {
    Idle,
    Exporting,
    Postprocessing,
    Handoff,
}

struct Current {
    timespan: Arc<Timespan>,
    specs: Vec<FileSpec>,
    position: SamplePos,
}

struct Inner {
    graph: Box<dyn RenderGraph>,
    config_map: BTreeMap<Arc<Timespan>, Vec<FileSpec>>,
    state: HandlerState,
    current: Option<Current>,
    tagger: Option<Arc<dyn Tagger>>,
    uploader: Option<Arc<dyn Uploader>>,
}

struct Shared {
    session: Arc<Session>,
    engine: Arc<dyn AudioEngine>,
    status: Arc<ExportStatus>,
    config: HandlerConfig,
    tasks: TaskSender,
    inner: Mutex<Inner>,
}

/// Renders timespans of a session to files.
///
/// # Example
///
/// ```ignore
/// let handler = ExportHandler::new(session, engine.clone(), Box::new(graph), status, HandlerConfig::default())?;
/// handler.add_channel_config(&[timespan], &config, None)?;
/// handler.start_export()?;
/// engine.run(&handler, |progress| println!("{:.0}%", progress.fraction() * 100.0))?;
/// ```
pub struct ExportHandler {
    // Dropped first: joins the worker while `shared` is still alive.
    _worker: Worker,
    shared: Arc<Shared>,
}

impl ExportHandler {
    pub fn new(
        session: Arc<Session>,
        engine: Arc<dyn AudioEngine>,
        graph: Box<dyn RenderGraph>,
        status: Arc<ExportStatus>,
        config: HandlerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (tasks, queue) = worker::queue();
        let shared = Arc::new(Shared {
            session,
            engine,
            status,
            config,
            tasks,
            inner: Mutex::new(Inner {
                graph,
                config_map: BTreeMap::new(),
                state: HandlerState::Idle,
                current: None,
                tagger: None,
                uploader: None,
            }),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let worker = Worker::spawn("mixdown-export", queue, move |task| {
            if let Some(shared) = weak.upgrade() {
                shared.run_task(task);
            }
        })?;

        Ok(Self {
            _worker: worker,
            shared,
        })
    }

    pub fn with_tagger(self, tagger: Arc<dyn Tagger>) -> Self {
        self.shared.inner.lock().tagger = Some(tagger);
        self
    }

    pub fn with_uploader(self, uploader: Arc<dyn Uploader>) -> Self {
        self.shared.inner.lock().uploader = Some(uploader);
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.shared.session
    }

    pub fn status(&self) -> &Arc<ExportStatus> {
        &self.shared.status
    }

    /// Queue `file_spec` for rendering over `timespan`.
    pub fn add_export_config(&self, timespan: Arc<Timespan>, file_spec: FileSpec) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.state != HandlerState::Idle {
            return Err(ExportError::Busy);
        }
        inner.config_map.entry(timespan).or_default().push(file_spec);
        Ok(())
    }

    /// Queue every output of `config` for each of `timespans`.
    pub fn add_channel_config(
        &self,
        timespans: &[Arc<Timespan>],
        config: &Arc<ChannelConfig>,
        broadcast_info: Option<Arc<BroadcastInfo>>,
    ) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.state != HandlerState::Idle {
            return Err(ExportError::Busy);
        }
        for timespan in timespans {
            inner
                .config_map
                .entry(Arc::clone(timespan))
                .or_default()
                .extend(config.file_specs(broadcast_info.clone()));
        }
        Ok(())
    }

    /// Number of queued FileSpecs across all timespans.
    pub fn config_count(&self) -> usize {
        self.shared.inner.lock().config_map.values().map(Vec::len).sum()
    }

    /// Drop every queued config. Refused while an export runs.
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.state != HandlerState::Idle {
            return Err(ExportError::Busy);
        }
        inner.config_map.clear();
        Ok(())
    }

    /// Validate the queued configs and begin exporting.
    ///
    /// Returns once the first timespan has been handed to the worker;
    /// progress is then driven by [`process`](Self::process). Nothing is
    /// marked running if validation fails.
    pub fn start_export(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.status.running() {
            return Err(ExportError::Busy);
        }

        let mut inner = shared.inner.lock();
        if inner.state != HandlerState::Idle {
            return Err(ExportError::Busy);
        }
        if inner.config_map.is_empty() {
            return Err(ExportError::InvalidConfig("nothing to export".into()));
        }
        for specs in inner.config_map.values() {
            for spec in specs {
                validate_file_spec(spec)?;
            }
        }

        let timespans = inner.config_map.len();
        if timespans > 1 {
            for spec in inner.config_map.values_mut().flatten() {
                spec.filename_mut().include_timespan = true;
            }
        }
        let total_samples: u64 = inner.config_map.keys().map(|t| t.length()).sum();

        shared.wait_for_freewheel_off()?;

        shared.status.init();
        shared.status.set_total_timespans(timespans as u64);
        shared.status.set_total_samples(total_samples);
        shared.status.set_running(true);
        info!(timespans, total_samples, "starting export");

        inner.state = HandlerState::Handoff;
        if !shared.tasks.post(Task::StartNextTimespan) {
            shared.status.abort(true);
            shared.cleanup(&mut inner);
            return Err(ExportError::Render("export worker unavailable".into()));
        }
        Ok(())
    }

    /// Advance the export by one engine cycle of `nframes` frames.
    ///
    /// Called from the audio thread. Never blocks.
    pub fn process(&self, nframes: usize) -> Cycle {
        let Some(mut inner) = self.shared.inner.try_lock() else {
            return Cycle::Busy;
        };
        self.shared.process(&mut inner, nframes)
    }

    /// Request cancellation. Observed on the next cycle; files already
    /// written stay on disk.
    pub fn abort(&self) {
        info!("export abort requested");
        self.shared.status.abort(false);
    }
}

impl Shared {
    fn run_task(&self, task: Task) {
        match task {
            Task::StartNextTimespan => self.start_timespan(),
            Task::Shutdown => {}
        }
    }

    fn wait_for_freewheel_off(&self) -> Result<()> {
        let deadline = Instant::now() + self.config.freewheel_timeout;
        while self.engine.freewheeling() {
            if Instant::now() >= deadline {
                return Err(mixdown_core::Error::FreewheelTimeout(self.config.freewheel_timeout).into());
            }
            thread::sleep(self.config.freewheel_poll_interval);
        }
        Ok(())
    }

    /// Runs on the worker.
    fn start_timespan(&self) {
        let mut inner = self.inner.lock();

        if self.status.aborted() {
            info!("export aborted before next timespan");
            self.cleanup(&mut inner);
            return;
        }

        let Some((timespan, mut specs)) = inner.config_map.pop_first() else {
            info!("export finished");
            inner.state = HandlerState::Idle;
            self.engine.set_freewheel(false);
            self.status.finish();
            return;
        };

        self.status.begin_timespan(timespan.name(), timespan.length());
        inner.graph.reset();

        for spec in &mut specs {
            spec.set_timespan(&timespan);
        }
        if handle_duplicate_format_extensions(&mut specs) {
            debug!(timespan = timespan.name(), "format name added to disambiguate extensions");
        }

        for spec in &specs {
            if let Err(e) = inner.graph.add_config(&timespan, spec) {
                error!(timespan = timespan.name(), path = %spec.path().display(), "failed to set up output: {e}");
                self.status.abort(true);
                self.cleanup(&mut inner);
                return;
            }
        }

        self.engine.set_freewheel(!timespan.realtime());
        info!(
            timespan = timespan.name(),
            start = timespan.start(),
            end = timespan.end(),
            files = specs.len(),
            "exporting timespan"
        );

        inner.current = Some(Current {
            position: timespan.start(),
            timespan,
            specs,
        });
        inner.state = HandlerState::Exporting;
    }

    fn process(&self, inner: &mut Inner, nframes: usize) -> Cycle {
        match inner.state {
            HandlerState::Idle => return Cycle::Idle,
            // The worker owns the next step and observes aborts itself.
            HandlerState::Handoff => return Cycle::Handoff,
            HandlerState::Exporting | HandlerState::Postprocessing => {}
        }

        if self.status.aborted() {
            info!("export aborted");
            self.cleanup(inner);
            return Cycle::Aborted;
        }

        match inner.state {
            HandlerState::Exporting => self.process_timespan(inner, nframes),
            _ => self.process_postprocess(inner),
        }
    }

    fn process_timespan(&self, inner: &mut Inner, nframes: usize) -> Cycle {
        let Some(current) = inner.current.as_mut() else {
            inner.state = HandlerState::Idle;
            return Cycle::Idle;
        };

        let remaining = current.timespan.end() - current.position;
        let frames = (nframes as u64).min(remaining);
        let last_cycle = frames == remaining;

        if let Err(e) = inner
            .graph
            .process(current.position, frames as usize, last_cycle)
        {
            error!(timespan = current.timespan.name(), "render failed: {e}");
            self.status.abort(true);
            self.cleanup(inner);
            return Cycle::Aborted;
        }
        current.position += frames;
        self.status.add_processed_samples(frames);

        if last_cycle {
            if inner.graph.needs_postprocessing() {
                let normalizing = current
                    .specs
                    .iter()
                    .any(|s| s.format().normalize() || s.format().normalize_loudness());
                self.status.set_active_job(if normalizing {
                    ActiveJob::Normalizing
                } else {
                    ActiveJob::Encoding
                });
                self.status
                    .set_total_postprocessing_cycles(inner.graph.postprocess_cycles());
                debug!(timespan = current.timespan.name(), "entering postprocessing");
                inner.state = HandlerState::Postprocessing;
                self.engine.set_freewheel(true);
            } else {
                self.finish_timespan(inner);
            }
        }
        Cycle::Rendered(frames as usize)
    }

    fn process_postprocess(&self, inner: &mut Inner) -> Cycle {
        if !self.engine.freewheeling() {
            self.engine.set_freewheel(true);
            return Cycle::WaitingForFreewheel;
        }

        match inner.graph.post_process() {
            Ok(done) => {
                self.status.advance_postprocessing_cycle();
                if done {
                    self.finish_timespan(inner);
                }
                Cycle::Postprocessed
            }
            Err(e) => {
                error!("postprocessing failed: {e}");
                self.status.abort(true);
                self.cleanup(inner);
                Cycle::Aborted
            }
        }
    }

    fn finish_timespan(&self, inner: &mut Inner) {
        let Some(current) = inner.current.take() else {
            return;
        };

        self.status.add_results(inner.graph.take_analysis());
        // Close every file before anything reads it back.
        inner.graph.reset();

        let tagger = inner.tagger.clone();
        let uploader = inner.uploader.clone();
        'specs: for spec in &current.specs {
            for path in spec.output_paths() {
                if self.status.aborted() {
                    break 'specs;
                }
                self.run_side_effects(
                    &current.timespan,
                    spec,
                    &path,
                    tagger.as_deref(),
                    uploader.as_deref(),
                );
            }
        }
        info!(timespan = current.timespan.name(), "timespan done");

        inner.state = HandlerState::Handoff;
        if !self.tasks.post(Task::StartNextTimespan) {
            self.status.abort(true);
            self.cleanup(inner);
        }
    }

    /// Marker, tag, command, upload. Failures are logged and do not stop
    /// the export.
    fn run_side_effects(
        &self,
        timespan: &Timespan,
        spec: &FileSpec,
        path: &Path,
        tagger: Option<&dyn Tagger>,
        uploader: Option<&dyn Uploader>,
    ) {
        let format = spec.format();

        for marker_format in CdMarkerFormat::requested(format) {
            // Logged and cleaned up by the writer.
            let _ = write_cd_marker_file(
                &self.session,
                timespan,
                format,
                path,
                marker_format,
                &self.config.program_name,
            );
        }

        if format.tag() {
            self.status.set_active_job(ActiveJob::Tagging);
            match tagger {
                Some(tagger) => {
                    let broadcast = spec.broadcast_info().map(Arc::as_ref);
                    if let Err(e) = tagger.tag(path, format, &self.session.metadata, broadcast) {
                        warn!(path = %path.display(), "tagging failed: {e}");
                    }
                }
                None => warn!(path = %path.display(), "tagging requested but no tagger is set"),
            }
        }

        if !format.command().trim().is_empty() {
            self.status.set_active_job(ActiveJob::Command);
            let subs = Substitutions::for_file(&self.session, timespan, path);
            if let Err(e) = run_command(format.command(), &subs) {
                warn!(path = %path.display(), "post-export command: {e}");
            }
        }

        if format.upload() {
            self.status.set_active_job(ActiveJob::Uploading);
            match uploader {
                Some(uploader) => {
                    let title = if self.session.metadata.title.is_empty() {
                        timespan.name()
                    } else {
                        &self.session.metadata.title
                    };
                    if let Err(e) = uploader.upload(path, title) {
                        warn!(path = %path.display(), "upload failed: {e}");
                    }
                }
                None => warn!(path = %path.display(), "upload requested but no uploader is set"),
            }
        }
    }

    fn cleanup(&self, inner: &mut Inner) {
        inner.graph.reset();
        inner.config_map.clear();
        inner.current = None;
        inner.state = HandlerState::Idle;
        self.engine.set_freewheel(false);
        self.status.finish();
    }
}

fn validate_file_spec(spec: &FileSpec) -> Result<()> {
    let config = spec.channel_config();
    if let Some(reason) = format_error(spec.format(), config.channel_count()) {
        return Err(ExportError::InvalidConfig(reason));
    }
    let empty = config.empty_channels();
    if !empty.is_empty() {
        warn!(config = config.name(), ?empty, "some channels have no ports");
    }
    Ok(())
}

/// Give every spec of a timespan a distinct name when extensions alone
/// would collide.
///
/// Specs are keyed by (timespan name if included, channel config name if
/// included, extension). If any key repeats, the format name is enabled on
/// every spec, not just the colliding ones. Returns whether that happened.
pub fn handle_duplicate_format_extensions(specs: &mut [FileSpec]) -> bool {
    let duplicate = {
        let mut seen = HashSet::new();
        specs.iter().any(|spec| {
            let filename = spec.filename();
            let key = (
                filename
                    .include_timespan
                    .then(|| filename.timespan_name().to_string()),
                filename
                    .include_channel_config
                    .then(|| filename.channel_config_name().to_string()),
                spec.format().extension().to_string(),
            );
            !seen.insert(key)
        })
    };

    if duplicate {
        for spec in specs.iter_mut() {
            spec.filename_mut().include_format_name = true;
        }
    }
    duplicate
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_core::{
        AnalysisResults, AtomicFlag, EncoderCapabilities, FilenamePolicy, FormatSpecification,
        SampleFormat, TimespanFactory,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Engine {
        freewheel: AtomicFlag,
    }

    impl AudioEngine for Engine {
        fn sample_rate(&self) -> u32 {
            44100
        }
        fn freewheeling(&self) -> bool {
            self.freewheel.get()
        }
        fn set_freewheel(&self, enabled: bool) {
            self.freewheel.set(enabled);
        }
    }

    #[derive(Default)]
    struct Log {
        events: Mutex<Vec<String>>,
    }

    impl Log {
        fn push(&self, event: impl Into<String>) {
            self.events.lock().push(event.into());
        }
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    struct MockGraph {
        log: Arc<Log>,
        two_pass: bool,
        outputs: usize,
        post_done: usize,
    }

    impl RenderGraph for MockGraph {
        fn reset(&mut self) {
            self.outputs = 0;
            self.post_done = 0;
            self.log.push("reset");
        }
        fn add_config(&mut self, timespan: &Arc<Timespan>, spec: &FileSpec) -> Result<()> {
            self.outputs += 1;
            self.log.push(format!(
                "add {} {}",
                timespan.name(),
                spec.path().file_name().unwrap().to_string_lossy()
            ));
            Ok(())
        }
        fn process(&mut self, position: SamplePos, nframes: usize, last: bool) -> Result<usize> {
            self.log.push(format!("process {position} {nframes} {last}"));
            Ok(nframes)
        }
        fn needs_postprocessing(&self) -> bool {
            self.two_pass
        }
        fn postprocess_cycles(&self) -> u64 {
            self.outputs as u64
        }
        fn post_process(&mut self) -> Result<bool> {
            self.post_done += 1;
            self.log.push("post");
            Ok(self.post_done >= self.outputs)
        }
        fn take_analysis(&mut self) -> AnalysisResults {
            AnalysisResults::new()
        }
    }

    struct Fixture {
        handler: ExportHandler,
        engine: Arc<Engine>,
        log: Arc<Log>,
        factory: TimespanFactory,
        dir: tempfile::TempDir,
    }

    fn fixture(two_pass: bool) -> Fixture {
        let log = Arc::new(Log::default());
        let engine = Arc::new(Engine::default());
        let graph = MockGraph {
            log: Arc::clone(&log),
            two_pass,
            outputs: 0,
            post_done: 0,
        };
        let handler = ExportHandler::new(
            Arc::new(Session::new("song", "/sessions/song", 44100)),
            engine.clone(),
            Box::new(graph),
            ExportStatus::shared(),
            HandlerConfig::default(),
        )
        .unwrap();
        Fixture {
            handler,
            engine,
            log,
            factory: TimespanFactory::new(),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn spec(dir: &Path, encoder: &str, caps: &EncoderCapabilities) -> FileSpec {
        let mut format = FormatSpecification::for_encoder(encoder, caps);
        format.set_sample_format(Some(SampleFormat::S16));
        FileSpec::new(
            Arc::new(ChannelConfig::stereo("master", "l", "r")),
            Arc::new(format),
            FilenamePolicy::new("song", dir),
            None,
        )
    }

    fn wav(dir: &Path) -> FileSpec {
        spec(dir, "wav", &EncoderCapabilities::wav())
    }

    /// Drive the handler until the export finishes.
    fn drive(handler: &ExportHandler, nframes: usize) -> Vec<Cycle> {
        let mut cycles = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while !handler.status().finished() && Instant::now() < deadline {
            let cycle = handler.process(nframes);
            match cycle {
                Cycle::Handoff | Cycle::Busy | Cycle::Idle => {
                    thread::sleep(Duration::from_micros(100))
                }
                other => cycles.push(other),
            }
        }
        assert!(handler.status().finished(), "export did not finish");
        cycles
    }

    #[test]
    fn test_single_timespan_in_blocks() {
        let f = fixture(false);
        let ts = f.factory.create_shared("all", 100, 350).unwrap();
        f.handler.add_export_config(ts, wav(f.dir.path())).unwrap();
        f.handler.start_export().unwrap();
        assert!(f.handler.status().running());

        let cycles = drive(&f.handler, 100);
        assert_eq!(
            cycles,
            vec![Cycle::Rendered(100), Cycle::Rendered(100), Cycle::Rendered(50)]
        );

        let events = f.log.events();
        let process: Vec<_> = events.iter().filter(|e| e.starts_with("process")).collect();
        assert_eq!(
            process,
            vec!["process 100 100 false", "process 200 100 false", "process 300 50 true"]
        );

        let status = f.handler.status();
        assert!(!status.running());
        assert!(!status.aborted());
        assert!(!status.errors());
        assert_eq!(status.processed_samples(), 250);
        assert_eq!(status.processed_samples_current_timespan(), 250);
        assert!(!f.engine.freewheeling());
    }

    #[test]
    fn test_configs_registered_before_processing() {
        let f = fixture(false);
        let ts = f.factory.create_shared("all", 0, 10).unwrap();
        f.handler.add_export_config(ts.clone(), wav(f.dir.path())).unwrap();
        f.handler
            .add_export_config(ts, spec(f.dir.path(), "flac", &EncoderCapabilities::flac()))
            .unwrap();
        f.handler.start_export().unwrap();
        drive(&f.handler, 64);

        let events = f.log.events();
        let first_process = events.iter().position(|e| e.starts_with("process")).unwrap();
        let adds: Vec<_> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.starts_with("add"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(adds.len(), 2);
        assert!(adds.iter().all(|&i| i < first_process));
    }

    #[test]
    fn test_timespans_in_order_with_names() {
        let f = fixture(false);
        let late = f.factory.create_shared("late", 500, 600).unwrap();
        let early = f.factory.create_shared("early", 0, 100).unwrap();
        f.handler.add_export_config(late, wav(f.dir.path())).unwrap();
        f.handler.add_export_config(early, wav(f.dir.path())).unwrap();
        f.handler.start_export().unwrap();
        drive(&f.handler, 1000);

        let adds: Vec<_> = f
            .log
            .events()
            .into_iter()
            .filter(|e| e.starts_with("add"))
            .collect();
        assert_eq!(adds, vec!["add early song_early.wav", "add late song_late.wav"]);
        assert_eq!(f.handler.status().total_timespans(), 2);
        assert_eq!(f.handler.status().timespan(), 2);
        assert_eq!(f.handler.status().total_samples(), 200);
    }

    #[test]
    fn test_postprocessing_waits_for_freewheel() {
        let f = fixture(true);
        let mut realtime = f.factory.create("rt", 0, 10).unwrap();
        realtime.set_realtime(true);
        f.handler
            .add_export_config(Arc::new(realtime), wav(f.dir.path()))
            .unwrap();
        f.handler.start_export().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match f.handler.process(64) {
                Cycle::Rendered(n) => {
                    assert_eq!(n, 10);
                    break;
                }
                _ => assert!(Instant::now() < deadline),
            }
        }
        // Realtime spans render without freewheel; the handler asks for it
        // only once postprocessing is due.
        assert!(f.engine.freewheeling());
        f.engine.set_freewheel(false);
        assert_eq!(f.handler.process(64), Cycle::WaitingForFreewheel);
        assert!(f.engine.freewheeling());
        assert_eq!(f.handler.process(64), Cycle::Postprocessed);

        drive(&f.handler, 64);
        assert_eq!(f.handler.status().current_postprocessing_cycle(), 1);
        assert!(!f.engine.freewheeling());
    }

    #[test]
    fn test_empty_timespan_finishes() {
        let f = fixture(false);
        let ts = f.factory.create_shared("empty", 42, 42).unwrap();
        f.handler.add_export_config(ts, wav(f.dir.path())).unwrap();
        f.handler.start_export().unwrap();
        assert_eq!(drive(&f.handler, 64), vec![Cycle::Rendered(0)]);
        assert!(!f.handler.status().errors());
    }

    #[test]
    fn test_abort_stops_processing() {
        let f = fixture(false);
        let ts = f.factory.create_shared("long", 0, 1_000_000).unwrap();
        f.handler.add_export_config(ts, wav(f.dir.path())).unwrap();
        f.handler.start_export().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !matches!(f.handler.process(64), Cycle::Rendered(_)) {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_micros(100));
        }

        f.handler.abort();
        let status = f.handler.status();
        assert!(!status.running());
        assert!(status.aborted());
        assert!(!status.errors());

        assert_eq!(f.handler.process(64), Cycle::Aborted);
        assert_eq!(f.handler.process(64), Cycle::Idle);
        assert!(status.finished());
        assert_eq!(status.processed_samples(), 64);
        assert_eq!(f.handler.config_count(), 0);
    }

    #[test]
    fn test_start_rejects_bad_config() {
        let f = fixture(false);
        assert!(matches!(
            f.handler.start_export(),
            Err(ExportError::InvalidConfig(_))
        ));

        let ts = f.factory.create_shared("t", 0, 10).unwrap();
        let incomplete = FileSpec::new(
            Arc::new(ChannelConfig::stereo("master", "l", "r")),
            Arc::new(FormatSpecification::new("nothing")),
            FilenamePolicy::new("song", f.dir.path()),
            None,
        );
        f.handler.add_export_config(ts, incomplete).unwrap();
        assert!(f.handler.start_export().is_err());
        assert!(!f.handler.status().running());
    }

    #[test]
    fn test_start_times_out_while_freewheeling() {
        let log = Arc::new(Log::default());
        let engine = Arc::new(Engine::default());
        engine.set_freewheel(true);
        let handler = ExportHandler::new(
            Arc::new(Session::new("song", "/tmp/song", 44100)),
            engine.clone(),
            Box::new(MockGraph {
                log,
                two_pass: false,
                outputs: 0,
                post_done: 0,
            }),
            ExportStatus::shared(),
            HandlerConfig {
                freewheel_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let ts = TimespanFactory::new().create_shared("t", 0, 10).unwrap();
        handler.add_export_config(ts, wav(dir.path())).unwrap();
        assert!(matches!(
            handler.start_export(),
            Err(ExportError::Core(mixdown_core::Error::FreewheelTimeout(_)))
        ));
        assert!(!handler.status().running());
    }

    #[test]
    fn test_side_effects_run_in_order() {
        let f = fixture(false);
        let order = Arc::new(Log::default());

        struct RecordingTagger(Arc<Log>);
        impl Tagger for RecordingTagger {
            fn tag(
                &self,
                path: &Path,
                _format: &FormatSpecification,
                _metadata: &mixdown_core::SessionMetadata,
                _broadcast_info: Option<&BroadcastInfo>,
            ) -> Result<()> {
                self.0.push(format!("tag {}", path.file_name().unwrap().to_string_lossy()));
                Ok(())
            }
        }

        let uploads = Arc::new(AtomicUsize::new(0));
        let upload_log = Arc::clone(&order);
        let upload_count = Arc::clone(&uploads);
        let handler = f
            .handler
            .with_tagger(Arc::new(RecordingTagger(Arc::clone(&order))))
            .with_uploader(Arc::new(move |path: &Path, _title: &str| -> Result<()> {
                upload_log.push(format!("upload {}", path.file_name().unwrap().to_string_lossy()));
                upload_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));

        let mut format = FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav());
        format.set_sample_format(Some(SampleFormat::S16));
        format.set_tag(true);
        format.set_upload(true);
        format.set_with_cue(true);
        let spec = FileSpec::new(
            Arc::new(ChannelConfig::stereo("master", "l", "r")),
            Arc::new(format),
            FilenamePolicy::new("song", f.dir.path()),
            None,
        );
        let cue = f.dir.path().join("song.wav.cue");

        let ts = f.factory.create_shared("t", 0, 10).unwrap();
        handler.add_export_config(ts, spec).unwrap();
        handler.start_export().unwrap();
        drive(&handler, 64);

        assert!(cue.exists());
        assert_eq!(order.events(), vec!["tag song.wav", "upload song.wav"]);
        assert_eq!(uploads.load(Ordering::SeqCst), 1);
        assert_eq!(handler.status().active_job(), ActiveJob::Uploading);
    }

    #[test]
    fn test_busy_while_running() {
        let f = fixture(false);
        let ts = f.factory.create_shared("t", 0, 1_000_000).unwrap();
        f.handler.add_export_config(ts.clone(), wav(f.dir.path())).unwrap();
        f.handler.start_export().unwrap();

        assert!(matches!(f.handler.start_export(), Err(ExportError::Busy)));
        assert!(matches!(
            f.handler.add_export_config(ts, wav(f.dir.path())),
            Err(ExportError::Busy)
        ));

        f.handler.abort();
        drive(&f.handler, 64);
        assert!(f.handler.reset().is_ok());
    }

    #[test]
    fn test_duplicate_extensions_enable_format_name_for_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = spec(dir.path(), "a", &EncoderCapabilities::wav());
        let mut b = spec(dir.path(), "b", &EncoderCapabilities::wav());
        let c = spec(dir.path(), "c", &EncoderCapabilities::flac());
        a.filename_mut().include_timespan = true;
        b.filename_mut().include_timespan = true;

        let mut specs = vec![a, b, c];
        assert!(handle_duplicate_format_extensions(&mut specs));
        assert!(specs.iter().all(|s| s.filename().include_format_name));

        let names: Vec<_> = specs
            .iter()
            .map(|s| s.path().file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["song_a.wav", "song_b.wav", "song_c.flac"]);
    }

    #[test]
    fn test_distinct_extensions_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut specs = vec![
            spec(dir.path(), "a", &EncoderCapabilities::wav()),
            spec(dir.path(), "b", &EncoderCapabilities::flac()),
        ];
        assert!(!handle_duplicate_format_extensions(&mut specs));
        assert!(specs.iter().all(|s| !s.filename().include_format_name));
    }

    #[test]
    fn test_channel_config_name_separates_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = wav(dir.path());
        let mut b = FileSpec::new(
            Arc::new(ChannelConfig::stereo("stems", "l", "r")),
            Arc::clone(a.format()),
            FilenamePolicy::new("song", dir.path()),
            None,
        );
        a.filename_mut().include_channel_config = true;
        b.filename_mut().include_channel_config = true;

        let mut specs = vec![a, b];
        assert!(!handle_duplicate_format_extensions(&mut specs));
    }
}
