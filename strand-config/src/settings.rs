//! Runtime settings and their validation

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Longest analysis window accepted, in seconds of audio
const MAX_WINDOW_SECONDS: usize = 10;

/// Errors raised at the configuration boundary
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Available visualization effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum EffectKind {
    /// Bars of color growing from the center with band energy
    Energy,
    /// Colors injected at the center and scrolled outward
    Scroll,
    /// Mirrored spectrum, one color channel per feature
    #[default]
    Spectrum,
}

impl EffectKind {
    pub const ALL: [EffectKind; 3] = [EffectKind::Energy, EffectKind::Scroll, EffectKind::Spectrum];

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Energy => "energy",
            EffectKind::Scroll => "scroll",
            EffectKind::Spectrum => "spectrum",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "energy" => Ok(EffectKind::Energy),
            "scroll" => Ok(EffectKind::Scroll),
            "spectrum" => Ok(EffectKind::Spectrum),
            other => Err(ConfigError::invalid(
                "effect",
                format!("unknown effect '{}' (expected energy, scroll or spectrum)", other),
            )),
        }
    }
}

/// Everything the pipeline needs to know about its shape and tuning
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Target pipeline cycles per second
    pub fps: u32,
    /// Number of frames kept in the rolling window
    pub history_depth: usize,
    /// Number of mel bands
    pub num_bands: usize,
    /// Number of LEDs on the strip
    pub num_pixels: usize,
    /// Lower filterbank bound in Hz
    pub min_frequency: f32,
    /// Upper filterbank bound in Hz
    pub max_frequency: f32,
    /// Peak level below which a cycle is treated as silence
    pub min_volume_threshold: f32,
    /// Effect selected at start-up
    pub effect: EffectKind,
    /// Input device index (None = host default)
    pub device_index: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fps: 60,
            history_depth: 2,
            num_bands: 24,
            num_pixels: 60,
            min_frequency: 200.0,
            max_frequency: 12000.0,
            min_volume_threshold: 1e-7,
            effect: EffectKind::default(),
            device_index: None,
        }
    }
}

impl Settings {
    /// Samples read per pipeline cycle
    #[inline]
    pub fn frame_size(&self) -> usize {
        (self.sample_rate / self.fps.max(1)) as usize
    }

    /// Length of the concatenated rolling window
    #[inline]
    pub fn window_len(&self) -> usize {
        self.history_depth.saturating_mul(self.frame_size())
    }

    /// Zero-padded FFT length
    #[inline]
    pub fn fft_size(&self) -> usize {
        self.window_len().max(1).next_power_of_two()
    }

    /// Number of magnitude bins fed to the filterbank
    #[inline]
    pub fn num_fft_bins(&self) -> usize {
        self.fft_size() / 2
    }

    /// Wall-clock budget of one cycle
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    /// Check every constraint; the first violation is reported
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::invalid("sample_rate", "must be positive"));
        }
        if self.fps == 0 {
            return Err(ConfigError::invalid("fps", "must be positive"));
        }
        if self.frame_size() == 0 {
            return Err(ConfigError::invalid(
                "fps",
                format!("{} fps leaves no samples per frame at {} Hz", self.fps, self.sample_rate),
            ));
        }
        if self.history_depth == 0 {
            return Err(ConfigError::invalid("history_depth", "must be at least 1"));
        }
        let max_window = self.sample_rate as usize * MAX_WINDOW_SECONDS;
        match self
            .history_depth
            .checked_mul(self.frame_size())
            .and_then(usize::checked_next_power_of_two)
        {
            Some(_) if self.window_len() <= max_window => {}
            _ => {
                return Err(ConfigError::invalid(
                    "history_depth",
                    format!(
                        "{} frames of {} samples exceed {} s of audio",
                        self.history_depth,
                        self.frame_size(),
                        MAX_WINDOW_SECONDS
                    ),
                ))
            }
        }
        if self.num_bands == 0 {
            return Err(ConfigError::invalid("num_bands", "must be at least 1"));
        }
        if self.num_pixels == 0 {
            return Err(ConfigError::invalid("num_pixels", "must be at least 1"));
        }
        validate_frequency_range(self.min_frequency, self.max_frequency)?;
        if !self.min_volume_threshold.is_finite() || self.min_volume_threshold < 0.0 {
            return Err(ConfigError::invalid(
                "min_volume_threshold",
                "must be a finite, non-negative level",
            ));
        }
        Ok(())
    }
}

/// Validate a filterbank frequency range on its own
pub fn validate_frequency_range(min_frequency: f32, max_frequency: f32) -> Result<(), ConfigError> {
    if !min_frequency.is_finite() || min_frequency < 0.0 {
        return Err(ConfigError::invalid("min_frequency", "must be a finite, non-negative frequency"));
    }
    if !max_frequency.is_finite() {
        return Err(ConfigError::invalid("max_frequency", "must be finite"));
    }
    if min_frequency >= max_frequency {
        return Err(ConfigError::invalid(
            "min_frequency",
            format!("{} Hz is not below max_frequency {} Hz", min_frequency, max_frequency),
        ));
    }
    Ok(())
}
