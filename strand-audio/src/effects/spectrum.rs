//! Mirrored spectrum effect
//!
//! The band vector is stretched across half the strip and mirrored. Red
//! shows energy above a slowly tracked common-mode floor, green shows
//! frame-to-frame change, blue shows smoothed level.

use strand_analysis::{interpolate, VecExpFilter};
use strand_config::EffectKind;

use super::Effect;
use crate::pixels::{half_len, mirror, PixelBuffer};

pub struct Spectrum {
    num_pixels: usize,
    common_mode: VecExpFilter,
    red_filter: VecExpFilter,
    blue_filter: VecExpFilter,
    previous: Vec<f32>,
}

impl Spectrum {
    pub fn new(num_pixels: usize) -> Self {
        let half = half_len(num_pixels);
        Self {
            num_pixels,
            common_mode: VecExpFilter::new(half, 0.01, 0.99, 0.01),
            red_filter: VecExpFilter::new(half, 0.01, 0.2, 0.99),
            blue_filter: VecExpFilter::new(half, 0.01, 0.1, 0.5),
            previous: vec![0.01; half],
        }
    }
}

impl Effect for Spectrum {
    fn render(&mut self, bands: &[f32]) -> PixelBuffer {
        let y = interpolate(bands, self.previous.len());

        let floor = self.common_mode.update(&y).to_vec();
        let above_floor: Vec<f32> = y.iter().zip(&floor).map(|(v, f)| v - f).collect();
        let change: Vec<f32> = y
            .iter()
            .zip(&self.previous)
            .map(|(v, p)| (v - p).abs())
            .collect();
        self.previous.copy_from_slice(&y);

        let red = self.red_filter.update(&above_floor);
        let blue = self.blue_filter.update(&y);

        let n = self.num_pixels;
        let scale = |half: &[f32]| -> Vec<f32> {
            mirror(half, n).into_iter().map(|v| v * 255.0).collect()
        };
        PixelBuffer::from_channels(n, &scale(red), &scale(&change), &scale(blue))
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Spectrum
    }
}
