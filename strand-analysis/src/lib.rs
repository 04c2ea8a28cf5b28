//! Audio analysis for strand
//!
//! Pure DSP building blocks for the audio-to-pixel pipeline: the rolling
//! sample window, the windowed FFT, the mel filterbank, and the asymmetric
//! exponential filters used for gain control and smoothing.

mod filter;
mod melbank;
mod smooth;
mod spectrum;
mod window;

pub use filter::{ExpFilter, VecExpFilter};
pub use melbank::{hz_to_mel, mel_to_hz, MelBankParams, MelFilterBank};
pub use smooth::{gaussian_filter1d, interpolate};
pub use spectrum::{hamming_window, SpectralAnalyzer};
pub use window::RollingWindow;
