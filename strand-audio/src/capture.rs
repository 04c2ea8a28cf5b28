//! Audio capture sources
//!
//! A [`SampleSource`] yields fixed-size frames of mono samples normalized to
//! [-1.0, 1.0], blocking until a whole frame is available. The cpal-backed
//! [`MicrophoneSource`] bridges the device callback to that blocking
//! interface through a lock-free ring buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, SupportedStreamConfigRange};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use thiserror::Error;

/// Frames of headroom in the ring between the device callback and the reader
const RING_FRAMES: usize = 8;

/// How long `read_frame` waits for samples before declaring the device dead
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors raised while capturing audio
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Input arrived faster than it was drained; samples were dropped
    #[error("Audio input buffer overflowed")]
    Overflow,
    #[error("No input device at index {0}")]
    DeviceNotFound(usize),
    #[error("No default input device available")]
    NoDefaultDevice,
    #[error("Unsupported input configuration: {0}")]
    UnsupportedConfig(String),
    /// The stream cannot be read at all (disconnected, permission denied, ...)
    #[error("Audio capture failed: {0}")]
    Fatal(String),
}

impl CaptureError {
    /// Everything except an overflow ends the capture context
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CaptureError::Overflow)
    }
}

/// Blocking source of fixed-size, normalized mono frames
pub trait SampleSource {
    /// Fill `frame` with the next `frame.len()` samples.
    ///
    /// On [`CaptureError::Overflow`] the frame still holds the samples that
    /// were read; any other error leaves its contents unspecified.
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), CaptureError>;

    fn sample_rate(&self) -> u32;

    fn frame_size(&self) -> usize;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), CaptureError> {
        (**self).read_frame(frame)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn frame_size(&self) -> usize {
        (**self).frame_size()
    }
}

/// Reader half of the device callback handoff.
///
/// Drains the ring into whole frames, polling while it runs short. Stream
/// errors and a ring that stays short past the stall timeout are fatal.
struct RingReader {
    consumer: HeapCons<f32>,
    overflowed: Arc<AtomicBool>,
    stream_error: Arc<Mutex<Option<String>>>,
    poll_interval: Duration,
    stall_timeout: Duration,
}

impl RingReader {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), CaptureError> {
        if let Some(message) = self.stream_error.lock().take() {
            return Err(CaptureError::Fatal(message));
        }

        let started = Instant::now();
        let mut filled = 0;
        loop {
            filled += self.consumer.pop_slice(&mut frame[filled..]);
            if filled == frame.len() {
                // The frame is complete either way; the overrun happened before it
                if self.overflowed.swap(false, Ordering::AcqRel) {
                    return Err(CaptureError::Overflow);
                }
                return Ok(());
            }
            if let Some(message) = self.stream_error.lock().take() {
                return Err(CaptureError::Fatal(message));
            }
            if started.elapsed() > self.stall_timeout {
                return Err(CaptureError::Fatal(format!(
                    "no audio received for {:?} ({} of {} samples buffered)",
                    self.stall_timeout,
                    filled + self.consumer.occupied_len(),
                    frame.len()
                )));
            }
            thread::sleep(self.poll_interval);
        }
    }
}

/// Microphone input through cpal
///
/// The stream lives as long as the source; dropping it releases the device.
pub struct MicrophoneSource {
    _stream: cpal::Stream,
    reader: RingReader,
    sample_rate: u32,
    frame_size: usize,
}

impl MicrophoneSource {
    /// Open input device `device_index` (or the host default) and start capturing
    pub fn open(
        device_index: Option<usize>,
        sample_rate: u32,
        frame_size: usize,
    ) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device_index {
            Some(index) => host
                .input_devices()
                .map_err(|e| CaptureError::Fatal(e.to_string()))?
                .nth(index)
                .ok_or(CaptureError::DeviceNotFound(index))?,
            None => host
                .default_input_device()
                .ok_or(CaptureError::NoDefaultDevice)?,
        };
        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());

        let supported = pick_config(
            device
                .supported_input_configs()
                .map_err(|e| CaptureError::Fatal(e.to_string()))?,
            sample_rate,
        )?;
        let sample_format = supported.sample_format();
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.with_sample_rate(SampleRate(sample_rate)).into();

        let ring = HeapRb::<f32>::new(frame_size.max(1) * RING_FRAMES);
        let (mut producer, consumer) = ring.split();

        let overflowed = Arc::new(AtomicBool::new(false));
        let stream_error = Arc::new(Mutex::new(None));

        let overflow_flag = overflowed.clone();
        let error_slot = stream_error.clone();
        let on_error = move |err: cpal::StreamError| {
            tracing::error!("Audio input stream error: {}", err);
            *error_slot.lock() = Some(err.to_string());
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    push_mono(data, channels, &mut producer, &overflow_flag, |s| {
                        s as f32 / 32768.0
                    });
                },
                on_error,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    push_mono(data, channels, &mut producer, &overflow_flag, |s| s);
                },
                on_error,
                None,
            ),
            other => {
                return Err(CaptureError::UnsupportedConfig(format!(
                    "sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| CaptureError::Fatal(e.to_string()))?;

        stream
            .play()
            .map_err(|e| CaptureError::Fatal(e.to_string()))?;

        tracing::info!(
            "Capturing from '{}' at {} Hz ({} ch {:?}), {} samples per frame",
            device_name,
            sample_rate,
            channels,
            sample_format,
            frame_size
        );

        let frame_period = Duration::from_secs_f64(frame_size as f64 / sample_rate.max(1) as f64);
        Ok(Self {
            _stream: stream,
            reader: RingReader {
                consumer,
                overflowed,
                stream_error,
                poll_interval: (frame_period / 8).max(Duration::from_millis(1)),
                stall_timeout: STALL_TIMEOUT,
            },
            sample_rate,
            frame_size,
        })
    }
}

impl SampleSource for MicrophoneSource {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), CaptureError> {
        self.reader.read_frame(frame)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        tracing::debug!("Releasing audio input device");
    }
}

/// Names of the host's input devices, in index order
pub fn input_devices() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::Fatal(e.to_string()))?;
    Ok(devices
        .map(|d| d.name().unwrap_or_else(|_| "<unknown>".into()))
        .collect())
}

/// Pick a device config that supports `sample_rate`, preferring 16-bit and fewer channels
fn pick_config(
    configs: impl Iterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Result<SupportedStreamConfigRange, CaptureError> {
    let format_rank = |format: SampleFormat| match format {
        SampleFormat::I16 => 0,
        SampleFormat::F32 => 1,
        _ => 2,
    };

    configs
        .filter(|c| c.min_sample_rate().0 <= sample_rate && sample_rate <= c.max_sample_rate().0)
        .filter(|c| format_rank(c.sample_format()) < 2)
        .min_by_key(|c| (format_rank(c.sample_format()), c.channels()))
        .ok_or_else(|| {
            CaptureError::UnsupportedConfig(format!(
                "no 16-bit or float input config at {} Hz",
                sample_rate
            ))
        })
}

/// Downmix interleaved input to mono and push it into the ring
///
/// Runs on the device callback thread: no allocation, no locking.
fn push_mono<T: Copy>(
    data: &[T],
    channels: usize,
    producer: &mut HeapProd<f32>,
    overflowed: &AtomicBool,
    to_f32: impl Fn(T) -> f32,
) {
    let channels = channels.max(1);
    let scale = 1.0 / channels as f32;
    for frame in data.chunks_exact(channels) {
        let mono = frame.iter().map(|&s| to_f32(s)).sum::<f32>() * scale;
        if producer.try_push(mono).is_err() {
            overflowed.store(true, Ordering::Release);
            return;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory source for pipeline tests

    use std::collections::VecDeque;

    use super::{CaptureError, SampleSource};

    pub(crate) enum Step {
        Frame(Vec<f32>),
        Overflow,
        Fatal,
    }

    pub(crate) struct ScriptedSource {
        steps: VecDeque<Step>,
        sample_rate: u32,
        frame_size: usize,
    }

    impl ScriptedSource {
        pub(crate) fn new(sample_rate: u32, frame_size: usize, steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
                sample_rate,
                frame_size,
            }
        }
    }

    impl SampleSource for ScriptedSource {
        fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), CaptureError> {
            match self.steps.pop_front() {
                Some(Step::Frame(samples)) => {
                    frame.copy_from_slice(&samples[..frame.len()]);
                    Ok(())
                }
                Some(Step::Overflow) => {
                    frame.fill(0.0);
                    Err(CaptureError::Overflow)
                }
                Some(Step::Fatal) | None => Err(CaptureError::Fatal("end of script".into())),
            }
        }

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn frame_size(&self) -> usize {
            self.frame_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_mono_downmixes() {
        let (mut producer, mut consumer) = HeapRb::<f32>::new(8).split();
        let overflowed = AtomicBool::new(false);
        push_mono(&[16384i16, 0, -32768, -32768], 2, &mut producer, &overflowed, |s| {
            s as f32 / 32768.0
        });

        let mut out = [0.0f32; 2];
        assert_eq!(consumer.pop_slice(&mut out), 2);
        assert!((out[0] - 0.25).abs() < 1e-6);
        assert!((out[1] + 1.0).abs() < 1e-6);
        assert!(!overflowed.load(Ordering::Acquire));
    }

    #[test]
    fn test_push_mono_flags_overflow() {
        let (mut producer, _consumer) = HeapRb::<f32>::new(2).split();
        let overflowed = AtomicBool::new(false);
        push_mono(&[0.1f32, 0.2, 0.3], 1, &mut producer, &overflowed, |s| s);
        assert!(overflowed.load(Ordering::Acquire));
    }

    fn ring_reader(capacity: usize, stall_timeout: Duration) -> (HeapProd<f32>, RingReader) {
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let reader = RingReader {
            consumer,
            overflowed: Arc::new(AtomicBool::new(false)),
            stream_error: Arc::new(Mutex::new(None)),
            poll_interval: Duration::from_millis(1),
            stall_timeout,
        };
        (producer, reader)
    }

    #[test]
    fn test_reader_fills_frame_across_pops() {
        let (mut producer, mut reader) = ring_reader(16, Duration::from_secs(2));
        let feeder = thread::spawn(move || {
            for chunk in [[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]] {
                thread::sleep(Duration::from_millis(5));
                producer.push_slice(&chunk);
            }
        });

        let mut frame = [0.0f32; 6];
        reader.read_frame(&mut frame).unwrap();
        assert_eq!(frame, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        feeder.join().unwrap();
    }

    #[test]
    fn test_reader_reports_overflow_with_complete_frame() {
        let (mut producer, mut reader) = ring_reader(16, Duration::from_secs(2));
        producer.push_slice(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
        reader.overflowed.store(true, Ordering::Release);

        let mut frame = [0.0f32; 4];
        assert!(matches!(reader.read_frame(&mut frame), Err(CaptureError::Overflow)));
        assert_eq!(frame, [0.1, 0.2, 0.3, 0.4]);

        // Reported once; the next frame reads clean
        assert!(reader.read_frame(&mut frame).is_ok());
        assert_eq!(frame, [0.5, 0.6, 0.7, 0.8]);
    }

    #[test]
    fn test_reader_promotes_stream_error() {
        let (mut producer, mut reader) = ring_reader(16, Duration::from_secs(2));
        producer.push_slice(&[0.5; 4]);
        *reader.stream_error.lock() = Some("device unplugged".into());

        let mut frame = [0.0f32; 4];
        match reader.read_frame(&mut frame) {
            Err(CaptureError::Fatal(message)) => assert_eq!(message, "device unplugged"),
            other => panic!("expected fatal error, got {:?}", other),
        }
    }

    #[test]
    fn test_reader_stream_error_while_waiting() {
        let (mut producer, mut reader) = ring_reader(16, Duration::from_secs(2));
        producer.push_slice(&[0.5; 2]);
        let error_slot = reader.stream_error.clone();
        let failer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            *error_slot.lock() = Some("stream closed".into());
        });

        let mut frame = [0.0f32; 4];
        assert!(matches!(reader.read_frame(&mut frame), Err(CaptureError::Fatal(_))));
        failer.join().unwrap();
    }

    #[test]
    fn test_reader_stall_timeout() {
        let (mut producer, mut reader) = ring_reader(16, Duration::from_millis(20));
        producer.push_slice(&[0.5; 3]);

        let started = Instant::now();
        let mut frame = [0.0f32; 8];
        match reader.read_frame(&mut frame) {
            Err(CaptureError::Fatal(message)) => assert!(message.contains("3 of 8"), "{}", message),
            other => panic!("expected stall, got {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_only_overflow_is_recoverable() {
        assert!(!CaptureError::Overflow.is_fatal());
        assert!(CaptureError::Fatal("gone".into()).is_fatal());
        assert!(CaptureError::DeviceNotFound(3).is_fatal());
    }
}
