//! Configuration for strand - settings, validation, and the config file

mod config;
mod settings;

pub use config::Config;
pub use settings::{validate_frequency_range, ConfigError, EffectKind, Settings};
