use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use strand_config::{EffectKind, Settings};

/// Where finished frames go
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Output {
    /// Discard frames (diagnostics only)
    Null,
    /// One line of hex RRGGBB triplets per frame on stdout
    Stdout,
}

#[derive(Parser, Debug)]
#[command(name = "strand", version, about = "Audio-reactive LED strip visualizer")]
pub struct Cli {
    /// Config file (default: <config dir>/strand/config.txt)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Effect to start with (energy, scroll, spectrum)
    #[arg(short, long)]
    pub effect: Option<EffectKind>,

    /// Input device index (see --list-devices)
    #[arg(short, long)]
    pub device: Option<usize>,

    /// Capture sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Target frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Frames kept in the rolling analysis window
    #[arg(long)]
    pub history: Option<usize>,

    /// Number of mel bands
    #[arg(long)]
    pub bands: Option<usize>,

    /// Number of LEDs on the strip
    #[arg(short, long)]
    pub pixels: Option<usize>,

    /// Lower filterbank bound in Hz
    #[arg(long)]
    pub min_freq: Option<f32>,

    /// Upper filterbank bound in Hz
    #[arg(long)]
    pub max_freq: Option<f32>,

    /// Peak level below which input counts as silence
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Frame output
    #[arg(short, long, value_enum, default_value_t = Output::Null)]
    pub output: Output,

    /// Log the measured frame rate twice a second
    #[arg(long)]
    pub show_fps: bool,

    /// List input devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

impl Cli {
    /// Override file settings with whatever was given on the command line
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(effect) = self.effect {
            settings.effect = effect;
        }
        if self.device.is_some() {
            settings.device_index = self.device;
        }
        if let Some(v) = self.sample_rate {
            settings.sample_rate = v;
        }
        if let Some(v) = self.fps {
            settings.fps = v;
        }
        if let Some(v) = self.history {
            settings.history_depth = v;
        }
        if let Some(v) = self.bands {
            settings.num_bands = v;
        }
        if let Some(v) = self.pixels {
            settings.num_pixels = v;
        }
        if let Some(v) = self.min_freq {
            settings.min_frequency = v;
        }
        if let Some(v) = self.max_freq {
            settings.max_frequency = v;
        }
        if let Some(v) = self.threshold {
            settings.min_volume_threshold = v;
        }
    }
}
