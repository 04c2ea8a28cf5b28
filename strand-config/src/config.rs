//! Config file loading for strand
//!
//! Settings are read from a simple `key=value` text file. The file is only
//! ever read; runtime changes are not written back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::settings::{ConfigError, EffectKind, Settings};

/// Config file access
pub struct Config;

impl Config {
    /// Load settings from the default location
    ///
    /// Returns defaults if the file doesn't exist or can't be used.
    pub fn load() -> Settings {
        let path = Self::config_path();
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(ConfigError::Io(ref e)) if e.kind() == io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                tracing::warn!("Ignoring config file {}: {}", path.display(), e);
                Settings::default()
            }
        }
    }

    /// Load and validate settings from a specific path
    pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
        let content = fs::read_to_string(path)?;
        let settings = Self::parse(&content)?;
        settings.validate()?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strand")
            .join("config.txt")
    }

    /// Parse settings from `key=value` lines on top of the defaults
    pub fn parse(content: &str) -> Result<Settings, ConfigError> {
        let mut settings = Settings::default();

        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Parse {
                    line: line_no,
                    message: format!("expected key=value, got '{}'", line),
                });
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "sample_rate" => settings.sample_rate = parse_value(key, value, line_no)?,
                "fps" => settings.fps = parse_value(key, value, line_no)?,
                "history_depth" => settings.history_depth = parse_value(key, value, line_no)?,
                "num_bands" => settings.num_bands = parse_value(key, value, line_no)?,
                "num_pixels" => settings.num_pixels = parse_value(key, value, line_no)?,
                "min_frequency" => settings.min_frequency = parse_value(key, value, line_no)?,
                "max_frequency" => settings.max_frequency = parse_value(key, value, line_no)?,
                "min_volume_threshold" => {
                    settings.min_volume_threshold = parse_value(key, value, line_no)?
                }
                "effect" => {
                    settings.effect = EffectKind::from_str(value).map_err(|e| ConfigError::Parse {
                        line: line_no,
                        message: e.to_string(),
                    })?
                }
                "device_index" => {
                    settings.device_index = if value.is_empty() || value == "default" {
                        None
                    } else {
                        Some(parse_value(key, value, line_no)?)
                    }
                }
                _ => tracing::warn!("Unknown config key '{}' on line {}", key, line_no),
            }
        }

        Ok(settings)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str, line: usize) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Parse {
        line,
        message: format!("invalid value '{}' for {}", value, key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        let settings = Config::parse("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_values() {
        let content = "sample_rate=16000\nfps = 40\nnum_pixels=144\neffect=scroll\ndevice_index=2";
        let settings = Config::parse(content).unwrap();
        assert_eq!(settings.sample_rate, 16000);
        assert_eq!(settings.fps, 40);
        assert_eq!(settings.num_pixels, 144);
        assert_eq!(settings.effect, EffectKind::Scroll);
        assert_eq!(settings.device_index, Some(2));
    }

    #[test]
    fn test_parse_with_comments_and_unknown_keys() {
        let content = "# Comment\nmax_frequency=8000\nbrightness=0.5\n# Another comment";
        let settings = Config::parse(content).unwrap();
        assert_eq!(settings.max_frequency, 8000.0);
    }

    #[test]
    fn test_parse_errors_report_line() {
        let err = Config::parse("fps=60\nnum_bands=many").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 2, .. }));

        let err = Config::parse("just a line").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_load_from_rejects_invalid_settings() {
        let path = std::env::temp_dir().join(format!("strand-config-test-{}.txt", std::process::id()));
        fs::write(&path, "min_frequency=9000\nmax_frequency=100\n").unwrap();

        let result = Config::load_from(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = Config::load_from(Path::new("/nonexistent/strand/config.txt"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
