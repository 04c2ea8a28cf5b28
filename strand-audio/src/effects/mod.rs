//! Visualization effects for strand
//!
//! Each effect maps a smoothed band vector to a full strip of pixels. Effects
//! own whatever history they need; nothing is shared between them, and
//! switching effect always starts the new one from a fresh state.

mod energy;
mod scroll;
mod spectrum;

pub use energy::Energy;
pub use scroll::Scroll;
pub use spectrum::Spectrum;

use std::ops::Range;

use strand_config::EffectKind;

use crate::pixels::PixelBuffer;

/// Trait for visualization effects
pub trait Effect: Send {
    /// Render one frame from a band vector of `num_bands` values
    fn render(&mut self, bands: &[f32]) -> PixelBuffer;

    /// Which effect this is
    fn kind(&self) -> EffectKind;

    /// Get effect name
    fn name(&self) -> &'static str {
        self.kind().name()
    }
}

/// Build a fresh effect instance sized for the given dimensions
pub fn create_effect(kind: EffectKind, num_bands: usize, num_pixels: usize) -> Box<dyn Effect> {
    match kind {
        EffectKind::Energy => Box::new(Energy::new(num_bands, num_pixels)),
        EffectKind::Scroll => Box::new(Scroll::new(num_bands, num_pixels)),
        EffectKind::Spectrum => Box::new(Spectrum::new(num_pixels)),
    }
}

/// Holds the single active effect
pub struct EffectEngine {
    active: Box<dyn Effect>,
    num_bands: usize,
    num_pixels: usize,
}

impl EffectEngine {
    pub fn new(kind: EffectKind, num_bands: usize, num_pixels: usize) -> Self {
        Self {
            active: create_effect(kind, num_bands, num_pixels),
            num_bands,
            num_pixels,
        }
    }

    /// Render through the active effect
    #[inline]
    pub fn render(&mut self, bands: &[f32]) -> PixelBuffer {
        self.active.render(bands)
    }

    /// Replace the active effect; the old one and its history are dropped
    pub fn select(&mut self, kind: EffectKind) {
        self.active = create_effect(kind, self.num_bands, self.num_pixels);
        tracing::debug!("Selected effect: {}", kind);
    }

    /// Rebuild the active effect for new dimensions
    pub fn resize(&mut self, num_bands: usize, num_pixels: usize) {
        self.num_bands = num_bands;
        self.num_pixels = num_pixels;
        self.select(self.kind());
    }

    #[inline]
    pub fn kind(&self) -> EffectKind {
        self.active.kind()
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.active.name()
    }

    #[inline]
    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.num_pixels
    }
}

/// Low / mid / high thirds of a band vector (any of them may be empty)
pub(crate) fn thirds(len: usize) -> [Range<usize>; 3] {
    [0..len / 3, len / 3..2 * len / 3, 2 * len / 3..len]
}

/// Divide by a tracked gain without blowing up on an exhausted gain
#[inline]
pub(crate) fn normalize(value: f32, gain: f32) -> f32 {
    value / gain.max(1e-9)
}
