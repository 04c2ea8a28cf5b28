//! Pipeline driver - runs capture cycles and reports diagnostics

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::RwLock;
use strand_analysis::ExpFilter;
use strand_config::{EffectKind, Settings};

use crate::capture::{CaptureError, SampleSource};
use crate::pipeline::Pipeline;
use crate::pixels::{PixelBuffer, PixelSink};

/// Minimum spacing between two reports of the same recurring error
const ERROR_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum spacing between two FPS log lines
const FPS_LOG_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration changes sent to the pipeline, applied between cycles
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCommand {
    SetFrequencyRange { min: f32, max: f32 },
    SetMinFrequency(f32),
    SetMaxFrequency(f32),
    SetNumBands(usize),
    SetNumPixels(usize),
    SetVolumeThreshold(f32),
    SelectEffect(EffectKind),

    // System
    Shutdown,
}

impl PipelineCommand {
    /// Write this command's change into `settings` (unvalidated)
    pub fn apply_to(&self, settings: &mut Settings) {
        match *self {
            PipelineCommand::SetFrequencyRange { min, max } => {
                settings.min_frequency = min;
                settings.max_frequency = max;
            }
            PipelineCommand::SetMinFrequency(v) => settings.min_frequency = v,
            PipelineCommand::SetMaxFrequency(v) => settings.max_frequency = v,
            PipelineCommand::SetNumBands(n) => settings.num_bands = n,
            PipelineCommand::SetNumPixels(n) => settings.num_pixels = n,
            PipelineCommand::SetVolumeThreshold(v) => settings.min_volume_threshold = v,
            PipelineCommand::SelectEffect(kind) => settings.effect = kind,
            PipelineCommand::Shutdown => {}
        }
    }
}

/// Events sent from the capture context
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Rate-limited overflow report
    Overflow {
        /// Overflows since the pipeline started
        total: u64,
        /// Overflows since the previous report
        since_last: u64,
    },
    /// A batch of commands was applied
    Reconfigured { rebuilt_filterbank: bool },
    /// A command was refused; the previous configuration stays active
    ConfigRejected(String),
    /// Capture failed and the context stopped
    Fatal(String),
    /// The context stopped on request
    Stopped,
}

/// Read-only snapshot published after every cycle
#[derive(Debug, Clone)]
pub struct Diagnostics {
    /// Filtered frames-per-second estimate
    pub fps: f32,
    pub overflow_count: u64,
    /// Frames the pixel sink failed to take
    pub sink_failures: u64,
    pub filterbank_rebuilds: u64,
    pub cycles: u64,
    /// Last cycle was below the volume threshold
    pub silent: bool,
    pub effect: EffectKind,
    pub bands: Vec<f32>,
    /// Display-smoothed bands for optional plotting
    pub plot_bands: Vec<f32>,
    pub pixels: PixelBuffer,
    /// Configuration in force, including accepted runtime changes
    pub settings: Settings,
}

impl Diagnostics {
    pub fn new(settings: &Settings) -> Self {
        Self {
            fps: settings.fps as f32,
            overflow_count: 0,
            sink_failures: 0,
            filterbank_rebuilds: 0,
            cycles: 0,
            silent: true,
            effect: settings.effect,
            bands: vec![0.0; settings.num_bands],
            plot_bands: vec![0.0; settings.num_bands],
            pixels: PixelBuffer::new(settings.num_pixels),
            settings: settings.clone(),
        }
    }

    #[inline]
    pub fn effect_name(&self) -> &'static str {
        self.effect.name()
    }
}

/// Smoothed frames-per-second estimate from cycle timestamps
#[derive(Debug, Clone)]
pub struct FpsCounter {
    filter: ExpFilter,
    target: u32,
    last_tick: Option<Instant>,
    last_log: Option<Instant>,
}

impl FpsCounter {
    pub fn new(target_fps: u32) -> Self {
        Self {
            filter: ExpFilter::new(target_fps as f32, 0.2, 0.2),
            target: target_fps,
            last_tick: None,
            last_log: None,
        }
    }

    /// Record a cycle at `now` and return the updated estimate
    pub fn tick(&mut self, now: Instant) -> f32 {
        if let Some(previous) = self.last_tick.replace(now) {
            let dt_ms = now.duration_since(previous).as_secs_f32() * 1000.0;
            if dt_ms > 0.0 {
                self.filter.update(1000.0 / dt_ms);
            }
        }
        self.filter.value()
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.filter.value()
    }

    #[inline]
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Whether enough time has passed since the last FPS log line
    pub fn should_log(&mut self, now: Instant) -> bool {
        match self.last_log {
            Some(last) if now.duration_since(last) < FPS_LOG_INTERVAL => false,
            _ => {
                self.last_log = Some(now);
                true
            }
        }
    }
}

/// Report emitted by [`ErrorReporter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReport {
    pub total: u64,
    pub since_last: u64,
}

/// Counts a recurring error and decides when it is worth reporting.
///
/// The first occurrence is reported immediately; later ones at most once per
/// interval, carrying how many were folded into the report.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    total: u64,
    unreported: u64,
    last_report: Option<Instant>,
    interval: Duration,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(ERROR_REPORT_INTERVAL)
    }
}

impl ErrorReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            total: 0,
            unreported: 0,
            last_report: None,
            interval,
        }
    }

    /// Count one occurrence at `now`; returns a report if one is due
    pub fn record(&mut self, now: Instant) -> Option<ErrorReport> {
        self.total += 1;
        self.unreported += 1;

        let due = match self.last_report {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        };
        if !due {
            return None;
        }

        self.last_report = Some(now);
        let since_last = std::mem::take(&mut self.unreported);
        Some(ErrorReport {
            total: self.total,
            since_last,
        })
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Why a driver stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The stop flag was raised
    Stopped,
    /// A `Shutdown` command was received
    Shutdown,
}

/// Outcome of a single cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Rendered,
    Shutdown,
}

/// Create channels for driver communication
pub fn create_channels() -> (
    Sender<PipelineCommand>,
    Receiver<PipelineCommand>,
    Sender<PipelineEvent>,
    Receiver<PipelineEvent>,
) {
    let (cmd_tx, cmd_rx) = bounded(256);
    let (evt_tx, evt_rx) = bounded(256);
    (cmd_tx, cmd_rx, evt_tx, evt_rx)
}

/// Runs the pipeline against one sample source
pub struct PipelineDriver<S: SampleSource> {
    source: S,
    pipeline: Pipeline,
    sink: Box<dyn PixelSink>,
    frame: Vec<f32>,
    fps: FpsCounter,
    overflow: ErrorReporter,
    sink_errors: ErrorReporter,
    show_fps: bool,
    cycles: u64,
    commands: Receiver<PipelineCommand>,
    events: Sender<PipelineEvent>,
    diagnostics: Arc<RwLock<Diagnostics>>,
}

impl<S: SampleSource> PipelineDriver<S> {
    pub fn new(
        source: S,
        pipeline: Pipeline,
        sink: Box<dyn PixelSink>,
        commands: Receiver<PipelineCommand>,
        events: Sender<PipelineEvent>,
        diagnostics: Arc<RwLock<Diagnostics>>,
    ) -> Self {
        let frame_size = pipeline.frame_size();
        if source.frame_size() != frame_size || source.sample_rate() != pipeline.settings().sample_rate {
            tracing::warn!(
                "Source delivers {} samples at {} Hz, pipeline expects {} at {} Hz",
                source.frame_size(),
                source.sample_rate(),
                frame_size,
                pipeline.settings().sample_rate
            );
        }
        let fps = FpsCounter::new(pipeline.settings().fps);
        Self {
            source,
            pipeline,
            sink,
            frame: vec![0.0; frame_size],
            fps,
            overflow: ErrorReporter::default(),
            sink_errors: ErrorReporter::default(),
            show_fps: false,
            cycles: 0,
            commands,
            events,
            diagnostics,
        }
    }

    /// Log the FPS estimate periodically
    pub fn with_fps_logging(mut self, show_fps: bool) -> Self {
        self.show_fps = show_fps;
        self
    }

    /// Apply pending commands, then read, process and emit one frame
    pub fn run_cycle(&mut self) -> Result<Cycle, CaptureError> {
        if self.apply_pending() {
            return Ok(Cycle::Shutdown);
        }

        match self.source.read_frame(&mut self.frame) {
            Ok(()) => {}
            Err(CaptureError::Overflow) => self.on_overflow(),
            Err(e) => {
                tracing::error!("{}", e);
                let _ = self.events.try_send(PipelineEvent::Fatal(e.to_string()));
                return Err(e);
            }
        }

        let pixels = self.pipeline.process(&self.frame);
        if let Err(e) = self.sink.send(pixels) {
            self.on_sink_error(&e);
        }

        self.cycles += 1;
        let now = Instant::now();
        let fps = self.fps.tick(now);
        if self.show_fps && self.fps.should_log(now) {
            tracing::info!("FPS {:.0} / {:.0}", fps, self.fps.target());
        }
        self.publish();
        Ok(Cycle::Rendered)
    }

    /// Cycle until `stop` is raised, a `Shutdown` command arrives or capture fails
    pub fn run(&mut self, stop: &AtomicBool) -> Result<StopReason, CaptureError> {
        while !stop.load(Ordering::Relaxed) {
            if self.run_cycle()? == Cycle::Shutdown {
                return Ok(StopReason::Shutdown);
            }
        }
        Ok(StopReason::Stopped)
    }

    /// Drain and apply queued commands; true when shutdown was requested
    fn apply_pending(&mut self) -> bool {
        let mut batch = Vec::new();
        let mut shutdown = false;
        loop {
            match self.commands.try_recv() {
                Ok(PipelineCommand::Shutdown) => shutdown = true,
                Ok(cmd) => batch.push(cmd),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if shutdown {
            return true;
        }
        if batch.is_empty() {
            return false;
        }

        let result = self.pipeline.apply(&batch);
        for e in &result.rejected {
            let _ = self.events.try_send(PipelineEvent::ConfigRejected(e.to_string()));
        }
        if result.changed() {
            // Visible to the host even if the next read fails
            self.diagnostics.write().settings = self.pipeline.settings().clone();
            let _ = self.events.try_send(PipelineEvent::Reconfigured {
                rebuilt_filterbank: result.rebuilt_filterbank,
            });
        }
        false
    }

    /// Log a failed sink write; true when this one was reported
    fn on_sink_error(&mut self, err: &std::io::Error) -> bool {
        match self.sink_errors.record(Instant::now()) {
            Some(report) => {
                tracing::warn!(
                    "Pixel sink failed {} times ({} since last report): {}",
                    report.total,
                    report.since_last,
                    err
                );
                true
            }
            None => false,
        }
    }

    fn on_overflow(&mut self) {
        if let Some(report) = self.overflow.record(Instant::now()) {
            tracing::warn!(
                "Audio buffer has overflowed {} times ({} since last report)",
                report.total,
                report.since_last
            );
            let _ = self.events.try_send(PipelineEvent::Overflow {
                total: report.total,
                since_last: report.since_last,
            });
        }
    }

    fn publish(&self) {
        let mut diag = self.diagnostics.write();
        diag.fps = self.fps.fps();
        diag.overflow_count = self.overflow.total();
        diag.sink_failures = self.sink_errors.total();
        diag.filterbank_rebuilds = self.pipeline.filterbank_rebuilds();
        diag.cycles = self.cycles;
        diag.silent = self.pipeline.is_silent();
        diag.effect = self.pipeline.effect();
        diag.bands.clear();
        diag.bands.extend_from_slice(self.pipeline.bands());
        diag.plot_bands.clear();
        diag.plot_bands.extend_from_slice(self.pipeline.plot_bands());
        diag.pixels.clone_from(self.pipeline.pixels());
        if diag.settings != *self.pipeline.settings() {
            diag.settings = self.pipeline.settings().clone();
        }
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Hand the sink back once the driver is done
    pub fn into_sink(self) -> Box<dyn PixelSink> {
        self.sink
    }
}
