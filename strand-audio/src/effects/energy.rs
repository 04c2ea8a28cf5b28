//! Energy effect
//!
//! Low, mid and high band energy each light a bar of red, green and blue
//! growing outward from the center of the strip.

use strand_analysis::{gaussian_filter1d, VecExpFilter};
use strand_config::EffectKind;

use super::{normalize, thirds, Effect};
use crate::pixels::{half_len, mirror, PixelBuffer};

/// Exponent applied to normalized band energy before averaging
const ENERGY_SCALE: f32 = 0.9;

/// Blur applied to the bar edges
const EDGE_SIGMA: f32 = 4.0;

pub struct Energy {
    num_pixels: usize,
    half: usize,
    gain: VecExpFilter,
    /// Smoothed bars, three rows of `half` values
    bars: VecExpFilter,
}

impl Energy {
    pub fn new(num_bands: usize, num_pixels: usize) -> Self {
        let half = half_len(num_pixels);
        Self {
            num_pixels,
            half,
            gain: VecExpFilter::new(num_bands, 0.01, 0.001, 0.99),
            bars: VecExpFilter::new(3 * half, 1.0, 0.1, 0.99),
        }
    }

    /// Bar length in pixels for one range of normalized bands
    fn bar_length(&self, y: &[f32]) -> usize {
        if y.is_empty() {
            return 0;
        }
        let mean = y.iter().map(|v| v.max(0.0).powf(ENERGY_SCALE)).sum::<f32>() / y.len() as f32;
        (mean as usize).min(self.half)
    }
}

impl Effect for Energy {
    fn render(&mut self, bands: &[f32]) -> PixelBuffer {
        let gain = self.gain.update(bands);
        let reach = self.half.saturating_sub(1) as f32;
        let y: Vec<f32> = bands
            .iter()
            .zip(gain)
            .map(|(&v, &g)| normalize(v, g) * reach)
            .collect();

        let mut target = vec![0.0f32; 3 * self.half];
        for (row, range) in thirds(y.len()).into_iter().enumerate() {
            let len = self.bar_length(&y[range]);
            target[row * self.half..row * self.half + len].fill(255.0);
        }

        let smoothed: Vec<f32> = self.bars.update(&target).iter().map(|v| v.round()).collect();

        let channels: Vec<Vec<f32>> = smoothed
            .chunks_exact(self.half)
            .map(|row| mirror(&gaussian_filter1d(row, EDGE_SIGMA), self.num_pixels))
            .collect();
        PixelBuffer::from_channels(self.num_pixels, &channels[0], &channels[1], &channels[2])
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Energy
    }
}
