//! Capture context - the single thread that owns the audio device
//!
//! Exactly one driver runs at a time. Stopping raises a flag the driver
//! checks between reads and then joins the thread, so the device handle is
//! released before anything else may open one. Swapping the input device is
//! a full stop followed by a fresh start with the latest configuration; the
//! rolling window and filters start over because they described the old
//! device's signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use strand_config::{validate_frequency_range, ConfigError, EffectKind, Settings};
use thiserror::Error;

use crate::capture::{CaptureError, MicrophoneSource, SampleSource};
use crate::engine::{create_channels, Diagnostics, PipelineCommand, PipelineDriver, PipelineEvent, StopReason};
use crate::pipeline::Pipeline;
use crate::pixels::{NullSink, PixelSink};

/// Opens a sample source for the given settings; called on the capture thread
pub type SourceOpener =
    Arc<dyn Fn(&Settings) -> Result<Box<dyn SampleSource>, CaptureError> + Send + Sync>;

/// Errors raised while starting or reconfiguring a capture context
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("Capture context is already running")]
    AlreadyRunning,
    #[error("Command queue is full; dropped {0}")]
    QueueFull(String),
    #[error("Capture thread failed: {0}")]
    Thread(String),
}

struct Running {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Box<dyn PixelSink>>,
}

/// Host-side handle to the capture thread
pub struct CaptureContext {
    settings: Settings,
    opener: SourceOpener,
    show_fps: bool,
    command_tx: Sender<PipelineCommand>,
    command_rx: Receiver<PipelineCommand>,
    event_tx: Sender<PipelineEvent>,
    event_rx: Receiver<PipelineEvent>,
    diagnostics: Arc<RwLock<Diagnostics>>,
    sink: Option<Box<dyn PixelSink>>,
    running: Option<Running>,
}

impl CaptureContext {
    /// Context capturing from the microphone selected by `settings.device_index`
    pub fn new(settings: Settings, sink: Box<dyn PixelSink>) -> Self {
        let opener: SourceOpener = Arc::new(|settings: &Settings| {
            let source = MicrophoneSource::open(
                settings.device_index,
                settings.sample_rate,
                settings.frame_size(),
            )?;
            Ok(Box::new(source) as Box<dyn SampleSource>)
        });
        Self::with_opener(settings, sink, opener)
    }

    /// Context reading from sources built by `opener`
    pub fn with_opener(settings: Settings, sink: Box<dyn PixelSink>, opener: SourceOpener) -> Self {
        let (command_tx, command_rx, event_tx, event_rx) = create_channels();
        let diagnostics = Arc::new(RwLock::new(Diagnostics::new(&settings)));
        Self {
            settings,
            opener,
            show_fps: false,
            command_tx,
            command_rx,
            event_tx,
            event_rx,
            diagnostics,
            sink: Some(sink),
            running: None,
        }
    }

    /// Log the FPS estimate periodically
    pub fn show_fps(&mut self, enabled: bool) {
        self.show_fps = enabled;
    }

    /// Open the device and start the capture thread.
    ///
    /// Returns once the source is open, so device errors surface here.
    pub fn start(&mut self) -> Result<(), ContextError> {
        if self.running.is_some() {
            return Err(ContextError::AlreadyRunning);
        }

        let settings = self.settings.clone();
        let pipeline = Pipeline::new(settings.clone())?;
        *self.diagnostics.write() = Diagnostics::new(&settings);

        let stop = Arc::new(AtomicBool::new(false));
        let sink = self.sink.take().unwrap_or_else(|| Box::new(NullSink));
        let (ready_tx, ready_rx) = bounded::<Result<(), CaptureError>>(1);

        let opener = self.opener.clone();
        let commands = self.command_rx.clone();
        let events = self.event_tx.clone();
        let diagnostics = self.diagnostics.clone();
        let stop_flag = stop.clone();
        let show_fps = self.show_fps;

        let handle = thread::Builder::new()
            .name("strand-capture".into())
            .spawn(move || {
                let source = match (*opener)(&settings) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return sink;
                    }
                };

                let mut driver =
                    PipelineDriver::new(source, pipeline, sink, commands, events.clone(), diagnostics)
                        .with_fps_logging(show_fps);
                match driver.run(&stop_flag) {
                    Ok(StopReason::Shutdown) => {
                        tracing::info!("Capture shut down on request");
                        let _ = events.try_send(PipelineEvent::Stopped);
                    }
                    Ok(StopReason::Stopped) => {
                        tracing::debug!("Capture stopped");
                        let _ = events.try_send(PipelineEvent::Stopped);
                    }
                    // Already reported by the driver
                    Err(_) => {}
                }
                driver.into_sink()
            })
            .map_err(|e| ContextError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.running = Some(Running { stop, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                self.sink = handle.join().ok();
                Err(e.into())
            }
            Err(_) => {
                let _ = handle.join();
                Err(ContextError::Thread("capture thread exited during start-up".into()))
            }
        }
    }

    /// Signal the capture thread and wait for it to release the device
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.stop.store(true, Ordering::Relaxed);
        match running.handle.join() {
            Ok(sink) => self.sink = Some(sink),
            Err(_) => tracing::error!("Capture thread panicked"),
        }
        // Keep runtime changes for the next start
        self.settings = self.diagnostics.read().settings.clone();
    }

    /// Stop, switch to input device `device_index` and start again
    pub fn swap_device(&mut self, device_index: Option<usize>) -> Result<(), ContextError> {
        self.stop();
        self.settings.device_index = device_index;
        tracing::info!(
            "Switching input device to {}",
            device_index.map_or_else(|| "default".to_string(), |i| i.to_string())
        );
        self.start()
    }

    /// Whether the capture thread is alive
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    /// Queue a command for the next safepoint
    pub fn send(&self, cmd: PipelineCommand) -> Result<(), ContextError> {
        self.command_tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(cmd) => ContextError::QueueFull(format!("{:?}", cmd)),
            TrySendError::Disconnected(_) => ContextError::Thread("command channel closed".into()),
        })
    }

    pub fn set_frequency_range(&self, min: f32, max: f32) -> Result<(), ContextError> {
        validate_frequency_range(min, max)?;
        self.send(PipelineCommand::SetFrequencyRange { min, max })
    }

    pub fn set_num_bands(&self, num_bands: usize) -> Result<(), ContextError> {
        if num_bands == 0 {
            return Err(ConfigError::Invalid {
                field: "num_bands",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        self.send(PipelineCommand::SetNumBands(num_bands))
    }

    pub fn set_num_pixels(&self, num_pixels: usize) -> Result<(), ContextError> {
        if num_pixels == 0 {
            return Err(ConfigError::Invalid {
                field: "num_pixels",
                reason: "must be at least 1".into(),
            }
            .into());
        }
        self.send(PipelineCommand::SetNumPixels(num_pixels))
    }

    pub fn set_volume_threshold(&self, threshold: f32) -> Result<(), ContextError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::Invalid {
                field: "min_volume_threshold",
                reason: "must be a finite, non-negative level".into(),
            }
            .into());
        }
        self.send(PipelineCommand::SetVolumeThreshold(threshold))
    }

    pub fn select_effect(&self, effect: EffectKind) -> Result<(), ContextError> {
        self.send(PipelineCommand::SelectEffect(effect))
    }

    /// Snapshot of the latest diagnostics
    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().clone()
    }

    /// Configuration the next start would use (or the running one)
    pub fn settings(&self) -> Settings {
        if self.running.is_some() {
            self.diagnostics.read().settings.clone()
        } else {
            self.settings.clone()
        }
    }

    /// Events from the capture thread
    #[inline]
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.event_rx
    }
}

impl Drop for CaptureContext {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    use crate::pipeline::tests::{scenario_settings, sine_frame};

    /// Endless tone, paced a little so the thread does not spin
    struct ToneSource {
        index: usize,
        remaining: Option<usize>,
    }

    impl SampleSource for ToneSource {
        fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), CaptureError> {
            if let Some(remaining) = self.remaining.as_mut() {
                if *remaining == 0 {
                    return Err(CaptureError::Fatal("device unplugged".into()));
                }
                *remaining -= 1;
            }
            thread::sleep(Duration::from_millis(1));
            frame.copy_from_slice(&sine_frame(1000.0, 0.5, 16000, frame.len(), self.index));
            self.index += 1;
            Ok(())
        }

        fn sample_rate(&self) -> u32 {
            16000
        }

        fn frame_size(&self) -> usize {
            400
        }
    }

    fn tone_opener(opened: Arc<Mutex<Vec<Option<usize>>>>, frames: Option<usize>) -> SourceOpener {
        Arc::new(move |settings: &Settings| {
            opened.lock().push(settings.device_index);
            if settings.device_index == Some(99) {
                return Err(CaptureError::DeviceNotFound(99));
            }
            Ok(Box::new(ToneSource {
                index: 0,
                remaining: frames,
            }) as Box<dyn SampleSource>)
        })
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_start_and_stop() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = CaptureContext::with_opener(
            scenario_settings(),
            Box::new(NullSink),
            tone_opener(opened.clone(), None),
        );
        ctx.start().unwrap();
        assert!(ctx.is_running());
        assert!(wait_for(|| ctx.diagnostics().cycles >= 3));

        ctx.stop();
        assert!(!ctx.is_running());
        assert_eq!(ctx.events().try_iter().last(), Some(PipelineEvent::Stopped));
        assert_eq!(opened.lock().as_slice(), &[None]);
    }

    #[test]
    fn test_second_start_is_refused() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = CaptureContext::with_opener(
            scenario_settings(),
            Box::new(NullSink),
            tone_opener(opened.clone(), None),
        );
        ctx.start().unwrap();
        assert!(matches!(ctx.start(), Err(ContextError::AlreadyRunning)));
        assert_eq!(opened.lock().len(), 1);
    }

    #[test]
    fn test_swap_device_restarts_with_fresh_state() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = CaptureContext::with_opener(
            scenario_settings(),
            Box::new(NullSink),
            tone_opener(opened.clone(), None),
        );
        ctx.start().unwrap();
        ctx.select_effect(EffectKind::Energy).unwrap();
        assert!(wait_for(|| ctx.diagnostics().effect == EffectKind::Energy));
        assert!(wait_for(|| ctx.diagnostics().cycles >= 20));

        ctx.swap_device(Some(2)).unwrap();
        assert!(ctx.is_running());
        assert_eq!(opened.lock().as_slice(), &[None, Some(2)]);

        // Runtime changes survive the swap, counters start over
        let diag = ctx.diagnostics();
        assert!(diag.cycles < 20);
        assert_eq!(diag.settings.device_index, Some(2));
        assert_eq!(ctx.settings().effect, EffectKind::Energy);
    }

    #[test]
    fn test_open_failure_surfaces_on_start() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let settings = Settings {
            device_index: Some(99),
            ..scenario_settings()
        };
        let mut ctx = CaptureContext::with_opener(settings, Box::new(NullSink), tone_opener(opened, None));

        let err = ctx.start().unwrap_err();
        assert!(matches!(err, ContextError::Capture(CaptureError::DeviceNotFound(99))));
        assert!(!ctx.is_running());

        // The sink came back, so a later start still works
        ctx.swap_device(None).unwrap();
        assert!(ctx.is_running());
    }

    #[test]
    fn test_fatal_capture_ends_thread() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = CaptureContext::with_opener(
            scenario_settings(),
            Box::new(NullSink),
            tone_opener(opened, Some(3)),
        );
        ctx.start().unwrap();

        let event = ctx.events().recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, PipelineEvent::Fatal("Audio capture failed: device unplugged".into()));
        assert!(wait_for(|| !ctx.is_running()));
        assert_eq!(ctx.diagnostics().cycles, 3);
    }

    #[test]
    fn test_invalid_settings_refused_at_boundary() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let ctx = CaptureContext::with_opener(
            scenario_settings(),
            Box::new(NullSink),
            tone_opener(opened, None),
        );
        assert!(ctx.set_frequency_range(500.0, 100.0).is_err());
        assert!(ctx.set_num_bands(0).is_err());
        assert!(ctx.set_num_pixels(0).is_err());
        assert!(ctx.set_volume_threshold(-1.0).is_err());
        assert!(ctx.set_num_pixels(30).is_ok());
    }

    #[test]
    fn test_full_command_queue_is_reported() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let ctx = CaptureContext::with_opener(
            scenario_settings(),
            Box::new(NullSink),
            tone_opener(opened, None),
        );
        // Not running, so nothing drains the queue
        for _ in 0..256 {
            ctx.set_num_pixels(30).unwrap();
        }
        assert!(matches!(ctx.set_num_pixels(31), Err(ContextError::QueueFull(_))));
        assert!(matches!(
            ctx.select_effect(EffectKind::Scroll),
            Err(ContextError::QueueFull(_))
        ));
    }

    #[test]
    fn test_invalid_start_settings() {
        let opened = Arc::new(Mutex::new(Vec::new()));
        let settings = Settings {
            num_bands: 0,
            ..scenario_settings()
        };
        let mut ctx = CaptureContext::with_opener(settings, Box::new(NullSink), tone_opener(opened.clone(), None));
        assert!(matches!(ctx.start(), Err(ContextError::Config(_))));
        assert!(opened.lock().is_empty());
    }
}
