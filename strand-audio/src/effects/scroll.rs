//! Scroll effect
//!
//! Each frame a new color is injected at the center of the strip (red from
//! the bass third, green from the mids, blue from the highs) and the existing
//! history moves one pixel outward, fading as it goes.

use strand_analysis::{gaussian_filter1d, VecExpFilter};
use strand_config::EffectKind;

use super::{normalize, thirds, Effect};
use crate::pixels::{half_len, mirror, PixelBuffer};

/// Per-frame fade of the scrolled history
const FADE: f32 = 0.98;

/// Light blur applied to the history each frame
const BLUR_SIGMA: f32 = 0.2;

pub struct Scroll {
    num_pixels: usize,
    gain: VecExpFilter,
    /// Color history, one row per channel, index 0 at the center
    history: [Vec<f32>; 3],
}

impl Scroll {
    pub fn new(num_bands: usize, num_pixels: usize) -> Self {
        let half = half_len(num_pixels);
        Self {
            num_pixels,
            gain: VecExpFilter::new(num_bands, 0.01, 0.001, 0.99),
            history: [vec![1.0; half], vec![1.0; half], vec![1.0; half]],
        }
    }
}

impl Effect for Scroll {
    fn render(&mut self, bands: &[f32]) -> PixelBuffer {
        let power: Vec<f32> = bands.iter().map(|v| v * v).collect();
        let gain = self.gain.update(&power);
        let y: Vec<f32> = power
            .iter()
            .zip(gain)
            .map(|(&v, &g)| normalize(v, g) * 255.0)
            .collect();

        let ranges = thirds(y.len());
        for (row, range) in self.history.iter_mut().zip(ranges) {
            let newest = y[range].iter().copied().fold(0.0f32, f32::max).floor();

            row.rotate_right(1);
            for v in row.iter_mut() {
                *v *= FADE;
            }
            *row = gaussian_filter1d(row, BLUR_SIGMA);
            row[0] = newest;
        }

        let [r, g, b] = &self.history;
        PixelBuffer::from_channels(
            self.num_pixels,
            &mirror(r, self.num_pixels),
            &mirror(g, self.num_pixels),
            &mirror(b, self.num_pixels),
        )
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Scroll
    }
}
