//! Audio-to-pixel pipeline state
//!
//! One [`Pipeline`] owns everything a cycle touches: the rolling window, the
//! FFT, the mel filterbank, the adaptive filters and the active effect.
//! Configuration changes are staged and applied in one go between cycles by
//! [`Pipeline::apply`], so no cycle ever sees a half-updated configuration.

use strand_analysis::{
    gaussian_filter1d, ExpFilter, MelBankParams, MelFilterBank, RollingWindow, SpectralAnalyzer,
    VecExpFilter,
};
use strand_config::{ConfigError, EffectKind, Settings};

use crate::effects::EffectEngine;
use crate::engine::PipelineCommand;
use crate::pixels::PixelBuffer;

/// Starting value of every band filter and of the gain
const INITIAL_LEVEL: f32 = 0.1;

/// Sigma of the smoothing applied to the gain filter's input only
const GAIN_SIGMA: f32 = 1.0;

/// What a batch of commands changed
#[derive(Debug, Default)]
pub struct Reconfiguration {
    /// The filterbank was replaced
    pub rebuilt_filterbank: bool,
    /// Effect, band count or strip length changed
    pub rebuilt_effect: bool,
    /// Commands refused at the configuration boundary; nothing of them was applied
    pub rejected: Vec<ConfigError>,
}

impl Reconfiguration {
    /// Whether any accepted command changed the running configuration
    pub fn changed(&self) -> bool {
        self.rebuilt_filterbank || self.rebuilt_effect
    }
}

pub struct Pipeline {
    settings: Settings,
    window: RollingWindow,
    analyzer: SpectralAnalyzer,
    filterbank: MelFilterBank,
    gain: ExpFilter,
    smoothing: VecExpFilter,
    /// Display-only copy of the bands, smoothed harder than what effects see
    plot: VecExpFilter,
    effects: EffectEngine,
    /// Filterbank output before normalization
    mel: Vec<f32>,
    bands: Vec<f32>,
    pixels: PixelBuffer,
    silent: bool,
    filterbank_rebuilds: u64,
}

impl Pipeline {
    /// Build a pipeline from validated settings
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let num_bands = settings.num_bands;
        let pipeline = Self {
            window: RollingWindow::new(settings.history_depth, settings.frame_size()),
            analyzer: SpectralAnalyzer::new(settings.window_len()),
            filterbank: MelFilterBank::new(bank_params(&settings)),
            gain: ExpFilter::new(INITIAL_LEVEL, 0.01, 0.99),
            smoothing: VecExpFilter::new(num_bands, INITIAL_LEVEL, 0.5, 0.99),
            plot: VecExpFilter::new(num_bands, INITIAL_LEVEL, 0.5, 0.99),
            effects: EffectEngine::new(settings.effect, num_bands, settings.num_pixels),
            mel: vec![0.0; num_bands],
            bands: vec![0.0; num_bands],
            pixels: PixelBuffer::new(settings.num_pixels),
            silent: true,
            filterbank_rebuilds: 0,
            settings,
        };

        tracing::info!(
            "Pipeline ready: {} Hz, {} samples x {} frames, {}-point FFT, {} bands, {} pixels, effect {}",
            pipeline.settings.sample_rate,
            pipeline.settings.frame_size(),
            pipeline.settings.history_depth,
            pipeline.analyzer.fft_size(),
            num_bands,
            pipeline.settings.num_pixels,
            pipeline.settings.effect
        );
        Ok(pipeline)
    }

    /// Run one frame through the pipeline and return the pixels to show
    pub fn process(&mut self, frame: &[f32]) -> &PixelBuffer {
        self.window.push(frame);

        let peak = self.window.peak();
        if peak < self.settings.min_volume_threshold {
            if !self.silent {
                tracing::trace!("No audio input, volume {:.2e} below threshold", peak);
            }
            self.silent = true;
            self.bands.fill(0.0);
            self.pixels.clear();
            return &self.pixels;
        }
        self.silent = false;

        let spectrum = self.analyzer.analyze(self.window.concat());
        self.filterbank.project_into(spectrum, &mut self.mel);
        for v in self.mel.iter_mut() {
            *v *= *v;
        }

        let reference = gaussian_filter1d(&self.mel, GAIN_SIGMA)
            .into_iter()
            .fold(0.0f32, f32::max);
        let gain = self.gain.update(reference).max(f32::MIN_POSITIVE);
        for v in self.mel.iter_mut() {
            *v /= gain;
        }

        self.bands.copy_from_slice(self.smoothing.update(&self.mel));
        self.plot.update(&self.mel);
        self.pixels = self.effects.render(&self.bands);
        &self.pixels
    }

    /// Apply a batch of commands at a safepoint.
    ///
    /// Each command is validated on its own against the configuration staged
    /// so far; rejected ones are skipped and reported. Whatever survives is
    /// applied at once, so a batch touching the frequency range several
    /// times still rebuilds the filterbank exactly once.
    pub fn apply(&mut self, commands: &[PipelineCommand]) -> Reconfiguration {
        let mut result = Reconfiguration::default();
        let mut staged = self.settings.clone();

        for command in commands {
            let mut next = staged.clone();
            command.apply_to(&mut next);
            match next.validate() {
                Ok(()) => staged = next,
                Err(e) => {
                    tracing::warn!("Rejected {:?}: {}", command, e);
                    result.rejected.push(e);
                }
            }
        }

        if staged == self.settings {
            return result;
        }

        if bank_params(&staged) != bank_params(&self.settings) {
            self.filterbank = MelFilterBank::new(bank_params(&staged));
            self.filterbank_rebuilds += 1;
            result.rebuilt_filterbank = true;
        }

        let bands_changed = staged.num_bands != self.settings.num_bands;
        if bands_changed {
            let n = staged.num_bands;
            self.gain.reset(INITIAL_LEVEL);
            self.smoothing = VecExpFilter::new(n, INITIAL_LEVEL, 0.5, 0.99);
            self.plot = VecExpFilter::new(n, INITIAL_LEVEL, 0.5, 0.99);
            self.mel = vec![0.0; n];
            self.bands = vec![0.0; n];
        }

        if bands_changed || staged.num_pixels != self.settings.num_pixels {
            self.effects.resize(staged.num_bands, staged.num_pixels);
            self.pixels = PixelBuffer::new(staged.num_pixels);
            result.rebuilt_effect = true;
        }
        if staged.effect != self.effects.kind() {
            self.effects.select(staged.effect);
            result.rebuilt_effect = true;
        }

        tracing::info!(
            "Reconfigured: {:.0}-{:.0} Hz, {} bands, {} pixels, threshold {:.1e}, effect {}",
            staged.min_frequency,
            staged.max_frequency,
            staged.num_bands,
            staged.num_pixels,
            staged.min_volume_threshold,
            staged.effect
        );
        self.settings = staged;
        result
    }

    /// Settings currently in force
    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn filterbank(&self) -> &MelFilterBank {
        &self.filterbank
    }

    /// Smoothed band vector of the last cycle (all zero after a silent one)
    #[inline]
    pub fn bands(&self) -> &[f32] {
        &self.bands
    }

    /// Display-smoothed band vector
    #[inline]
    pub fn plot_bands(&self) -> &[f32] {
        self.plot.value()
    }

    #[inline]
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Current gain-normalization level
    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain.value()
    }

    #[inline]
    pub fn effect(&self) -> EffectKind {
        self.effects.kind()
    }

    /// Whether the last cycle fell below the volume threshold
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Number of filterbank rebuilds since construction
    #[inline]
    pub fn filterbank_rebuilds(&self) -> u64 {
        self.filterbank_rebuilds
    }

    /// Samples expected per frame
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.window.frame_size()
    }
}

fn bank_params(settings: &Settings) -> MelBankParams {
    MelBankParams {
        min_frequency: settings.min_frequency,
        max_frequency: settings.max_frequency,
        sample_rate: settings.sample_rate,
        fft_size: settings.fft_size(),
        num_bands: settings.num_bands,
    }
}
