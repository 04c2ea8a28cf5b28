//! Mel-scale triangular filterbank
//!
//! Collapses an FFT magnitude spectrum into a small number of perceptual
//! bands. Band centers are spaced uniformly on the mel scale between the
//! configured frequency bounds; each band is a triangle with unit peak whose
//! feet sit on the neighbouring centers.
//!
//! A bank is immutable once built. Changing any parameter means building a
//! new bank and swapping it in whole.

use std::ops::Range;

/// Parameters a filterbank is built from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MelBankParams {
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub sample_rate: u32,
    /// Zero-padded FFT length; the bank spans `fft_size / 2` bins
    pub fft_size: usize,
    pub num_bands: usize,
}

/// Convert Hz to mels (`3340 * log9(1 + f / 250)`)
#[inline]
pub fn hz_to_mel(hz: f32) -> f32 {
    3340.0 * (1.0 + hz / 250.0).ln() / 9.0f32.ln()
}

/// Convert mels back to Hz
#[inline]
pub fn mel_to_hz(mel: f32) -> f32 {
    250.0 * (9.0f32.powf(mel / 3340.0) - 1.0)
}

/// Dense `[num_bins x num_bands]` weight matrix
#[derive(Debug, Clone)]
pub struct MelFilterBank {
    params: MelBankParams,
    num_bins: usize,
    /// Row-major: `weights[bin * num_bands + band]`
    weights: Vec<f32>,
    centers: Vec<f32>,
}

impl MelFilterBank {
    /// Build a bank from validated parameters
    pub fn new(params: MelBankParams) -> Self {
        let num_bands = params.num_bands.max(1);
        let num_bins = (params.fft_size / 2).max(1);

        let mel_min = hz_to_mel(params.min_frequency);
        let mel_max = hz_to_mel(params.max_frequency);
        let delta = (mel_max - mel_min).abs() / (num_bands + 1) as f32;

        // num_bands + 2 edge points: band i spans points i..=i+2
        let points: Vec<f32> = (0..num_bands + 2)
            .map(|i| mel_to_hz(mel_min + delta * i as f32))
            .collect();
        let centers = points[1..num_bands + 1].to_vec();

        let bin_hz = params.sample_rate as f32 / params.fft_size.max(1) as f32;
        let mut weights = vec![0.0f32; num_bins * num_bands];

        for bin in 0..num_bins {
            let freq = bin as f32 * bin_hz;
            for band in 0..num_bands {
                weights[bin * num_bands + band] =
                    triangle(freq, points[band], points[band + 1], points[band + 2]);
            }
        }

        tracing::debug!(
            "Built mel filterbank: {} bands x {} bins, {:.0}-{:.0} Hz",
            num_bands,
            num_bins,
            params.min_frequency,
            params.max_frequency
        );

        Self {
            params,
            num_bins,
            weights,
            centers,
        }
    }

    /// Project a magnitude spectrum onto the bands (matrix-vector product).
    ///
    /// `out` must hold `num_bands` values; missing spectrum bins count as zero.
    pub fn project_into(&self, spectrum: &[f32], out: &mut [f32]) {
        let num_bands = self.num_bands();
        out.fill(0.0);
        for (row, &mag) in self.weights.chunks_exact(num_bands).zip(spectrum) {
            if mag == 0.0 {
                continue;
            }
            for (acc, &w) in out.iter_mut().zip(row) {
                *acc += w * mag;
            }
        }
    }

    /// Allocating variant of [`project_into`](Self::project_into)
    pub fn project(&self, spectrum: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0; self.num_bands()];
        self.project_into(spectrum, &mut out);
        out
    }

    #[inline]
    pub fn params(&self) -> &MelBankParams {
        &self.params
    }

    #[inline]
    pub fn num_bands(&self) -> usize {
        self.centers.len()
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Weight of FFT `bin` in `band`
    #[inline]
    pub fn weight(&self, bin: usize, band: usize) -> f32 {
        self.weights[bin * self.num_bands() + band]
    }

    /// Center frequency of each band in Hz
    pub fn center_frequencies(&self) -> &[f32] {
        &self.centers
    }

    /// Bins with non-zero weight in `band`, or `None` when the band falls
    /// entirely between bins or above Nyquist
    pub fn support(&self, band: usize) -> Option<Range<usize>> {
        let first = (0..self.num_bins).find(|&bin| self.weight(bin, band) > 0.0)?;
        let last = (first..self.num_bins)
            .rev()
            .find(|&bin| self.weight(bin, band) > 0.0)?;
        Some(first..last + 1)
    }

    /// Band whose center frequency is nearest to `hz`
    pub fn nearest_band(&self, hz: f32) -> usize {
        self.centers
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - hz).abs().total_cmp(&(b.1 - hz).abs()))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

#[inline]
fn triangle(freq: f32, lower: f32, center: f32, upper: f32) -> f32 {
    if freq < lower || freq > upper {
        0.0
    } else if freq <= center {
        if center > lower {
            (freq - lower) / (center - lower)
        } else {
            1.0
        }
    } else if upper > center {
        (upper - freq) / (upper - center)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(min: f32, max: f32, sample_rate: u32, fft_size: usize, bands: usize) -> MelBankParams {
        MelBankParams {
            min_frequency: min,
            max_frequency: max,
            sample_rate,
            fft_size,
            num_bands: bands,
        }
    }

    #[test]
    fn test_mel_roundtrip() {
        for hz in [0.0, 200.0, 1000.0, 8000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 0.1);
        }
    }

    #[test]
    fn test_shape() {
        let bank = MelFilterBank::new(params(200.0, 12000.0, 16000, 1024, 24));
        assert_eq!(bank.num_bands(), 24);
        assert_eq!(bank.num_bins(), 512);
        assert_eq!(bank.center_frequencies().len(), 24);
    }

    #[test]
    fn test_weights_non_negative_and_within_bounds() {
        for (min, max, sr, fft, bands) in [
            (200.0, 12000.0, 16000, 1024, 24),
            (20.0, 20000.0, 44100, 2048, 64),
            (500.0, 600.0, 48000, 4096, 3),
            (0.0, 4000.0, 8000, 256, 1),
        ] {
            let bank = MelFilterBank::new(params(min, max, sr, fft, bands));
            let bin_hz = sr as f32 / fft as f32;
            for band in 0..bank.num_bands() {
                for bin in 0..bank.num_bins() {
                    let w = bank.weight(bin, band);
                    assert!(w >= 0.0 && w <= 1.0 + 1e-6);
                    if w > 0.0 {
                        let freq = bin as f32 * bin_hz;
                        assert!(freq >= min - 1e-2 && freq <= max + 1e-2, "bin {} outside range", bin);
                    }
                }
            }
        }
    }

    #[test]
    fn test_centers_increase() {
        let bank = MelFilterBank::new(params(200.0, 12000.0, 44100, 2048, 24));
        let centers = bank.center_frequencies();
        assert!(centers.windows(2).all(|w| w[1] > w[0]));
        assert!(centers[0] > 200.0 && centers[23] < 12000.0);
    }

    #[test]
    fn test_bands_above_nyquist_are_empty() {
        // 12 kHz upper bound with an 8 kHz Nyquist
        let bank = MelFilterBank::new(params(200.0, 12000.0, 16000, 1024, 24));
        let last = bank.num_bands() - 1;
        assert!(bank.center_frequencies()[last] > 8000.0);
        assert!(bank.support(last).is_none());
        assert!(bank.support(0).is_some());
    }

    #[test]
    fn test_project_single_bin() {
        let bank = MelFilterBank::new(params(200.0, 12000.0, 16000, 1024, 24));
        let band = bank.nearest_band(1000.0);
        let bin = (1000.0f32 / (16000.0 / 1024.0)).round() as usize;

        let mut spectrum = vec![0.0; bank.num_bins()];
        spectrum[bin] = 1.0;
        let out = bank.project(&spectrum);

        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, band);
        assert!(out.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_rebuild_is_a_new_bank() {
        let a = MelFilterBank::new(params(200.0, 12000.0, 16000, 1024, 24));
        let b = MelFilterBank::new(params(200.0, 6000.0, 16000, 1024, 24));
        assert!(b.center_frequencies()[23] < a.center_frequencies()[23]);
        assert_eq!(a.params().max_frequency, 12000.0);
    }
}
