//! FFT-based magnitude spectrum of the rolling analysis window

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Windowed, zero-padded FFT over a fixed-length analysis window
pub struct SpectralAnalyzer {
    window_len: usize,
    fft_size: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    /// Hamming window, `window_len` coefficients
    window: Vec<f32>,
    /// Pre-allocated FFT buffer to avoid allocation in analyze()
    fft_buffer: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectralAnalyzer {
    /// Create an analyzer for windows of `window_len` samples.
    ///
    /// The FFT size is the next power of two at or above `window_len`.
    pub fn new(window_len: usize) -> Self {
        let window_len = window_len.max(1);
        let fft_size = window_len.next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            window_len,
            fft_size,
            fft,
            window: hamming_window(window_len),
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            magnitudes: vec![0.0; fft_size / 2],
        }
    }

    /// Magnitude spectrum of `samples`, first `fft_size / 2` bins.
    ///
    /// Input longer than the window is truncated, shorter input is zero padded.
    pub fn analyze(&mut self, samples: &[f32]) -> &[f32] {
        let count = samples.len().min(self.window_len);
        for (buf, (&s, &w)) in self
            .fft_buffer
            .iter_mut()
            .zip(samples[..count].iter().zip(&self.window))
        {
            *buf = Complex::new(s * w, 0.0);
        }
        for buf in self.fft_buffer.iter_mut().skip(count) {
            *buf = Complex::new(0.0, 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        for (mag, c) in self.magnitudes.iter_mut().zip(&self.fft_buffer) {
            *mag = c.norm();
        }
        &self.magnitudes
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins produced per call
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2
    }
}

/// Symmetric Hamming window: `0.54 - 0.46 cos(2 pi n / (M - 1))`
pub fn hamming_window(len: usize) -> Vec<f32> {
    if len == 1 {
        return vec![1.0];
    }
    (0..len)
        .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f32 / (len - 1) as f32).cos())
        .collect()
}
