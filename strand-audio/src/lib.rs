//! Audio pipeline for strand - capture, effects, and the pipeline driver
//!
//! This module turns microphone input into LED frames:
//! - Capture: blocking sample sources (cpal microphone, ring-buffered)
//! - Pipeline: rolling window, FFT, mel bands, gain and smoothing
//! - Effects: energy, scroll and spectrum renderers
//! - Engine: cycle driver, commands, events and diagnostics
//! - Context: the capture thread, stop flag and device swaps

mod capture;
mod context;
mod effects;
mod engine;
mod pipeline;
mod pixels;

pub use capture::{input_devices, CaptureError, MicrophoneSource, SampleSource};
pub use context::{CaptureContext, ContextError, SourceOpener};
pub use effects::{create_effect, Effect, EffectEngine, Energy, Scroll, Spectrum};
pub use engine::{
    create_channels, Cycle, Diagnostics, ErrorReport, ErrorReporter, FpsCounter, PipelineCommand,
    PipelineDriver, PipelineEvent, StopReason,
};
pub use pipeline::{Pipeline, Reconfiguration};
pub use pixels::{half_len, mirror, ChannelSink, NullSink, PixelBuffer, PixelSink};
