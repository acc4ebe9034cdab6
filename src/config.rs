//! Configuration management (<config_dir>/keytape/config.toml)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::code::Color;
use crate::scheduler::PlaybackOptions;
use crate::timer::PrecisionTimer;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_coarse_step_ms")]
    pub coarse_step_ms: u64,
    #[serde(default = "default_spin_threshold_us")]
    pub spin_threshold_us: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub capture_timing: bool,
    #[serde(default = "default_true")]
    pub release_on_stop: bool,
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// `#AARRGGBB` or `#RRGGBB` colour reported by the dry-run probe.
    #[serde(default = "default_probe_color")]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_coarse_step_ms() -> u64 { 5 }
fn default_spin_threshold_us() -> u64 { 2000 }
fn default_speed() -> f64 { 1.0 }
fn default_true() -> bool { true }
fn default_screen_width() -> u32 { 1920 }
fn default_screen_height() -> u32 { 1080 }
fn default_probe_color() -> String { "#FF000000".to_string() }
fn default_filter() -> String { "info".to_string() }

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            coarse_step_ms: default_coarse_step_ms(),
            spin_threshold_us: default_spin_threshold_us(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            capture_timing: false,
            release_on_stop: true,
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            color: default_probe_color(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl Config {
    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.playback.speed.is_finite() && self.playback.speed > 0.0) {
            bail!("playback.speed must be greater than 0, got {}", self.playback.speed);
        }
        if self.timer.coarse_step_ms == 0 {
            bail!("timer.coarse_step_ms must be at least 1");
        }
        if self.playback.screen_width == 0 || self.playback.screen_height == 0 {
            bail!("playback screen size must be non-zero");
        }
        self.probe_color()?;
        Ok(())
    }

    pub fn probe_color(&self) -> Result<Color> {
        Color::from_hex(&self.probe.color)
            .with_context(|| format!("invalid probe.color '{}'", self.probe.color))
    }

    pub fn timer(&self) -> PrecisionTimer {
        PrecisionTimer::new(
            Duration::from_millis(self.timer.coarse_step_ms),
            Duration::from_micros(self.timer.spin_threshold_us),
        )
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            speed: self.playback.speed,
            capture_timing: self.playback.capture_timing,
            lateness_warning: Duration::from_millis(self.timer.coarse_step_ms),
        }
    }
}

pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "keytape").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Load from `explicit` if given, else from the user config directory if a
/// file exists there, else defaults.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config_dir().map(|dir| dir.join("config.toml")) {
            Some(path) if path.exists() => path,
            _ => return Ok(Config::default()),
        },
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Config::from_toml(&text).with_context(|| format!("in config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.timer.coarse_step_ms, 5);
        assert_eq!(config.timer.spin_threshold_us, 2000);
        assert!((config.playback.speed - 1.0).abs() < f64::EPSILON);
        assert!(!config.playback.capture_timing);
        assert!(config.playback.release_on_stop);
        assert_eq!(config.log.filter, "info");
        assert_eq!(config.probe_color().unwrap(), Color::argb(0xFF, 0, 0, 0));
    }

    #[test]
    fn test_config_deserialize_empty() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r##"
[playback]
speed = 2.5
capture_timing = true

[probe]
color = "#00FF00"
"##;
        let config = Config::from_toml(toml_str).unwrap();
        assert!((config.playback.speed - 2.5).abs() < f64::EPSILON);
        assert!(config.playback.capture_timing);
        assert!(config.playback.release_on_stop); // default
        assert_eq!(config.playback.screen_width, 1920); // default
        assert_eq!(config.probe_color().unwrap(), Color::rgb(0, 255, 0));
    }

    #[test]
    fn test_config_serialize_roundtrip() {
        let mut config = Config::default();
        config.timer.coarse_step_ms = 2;
        config.log.filter = "keytape=trace".to_string();
        let toml_str = toml::to_string(&config).unwrap();
        assert_eq!(Config::from_toml(&toml_str).unwrap(), config);
    }

    #[test]
    fn test_rejects_non_positive_speed() {
        assert!(Config::from_toml("[playback]\nspeed = 0.0\n").is_err());
        assert!(Config::from_toml("[playback]\nspeed = -1.0\n").is_err());
    }

    #[test]
    fn test_rejects_bad_probe_color() {
        let err = Config::from_toml("[probe]\ncolor = \"red\"\n").unwrap_err();
        assert!(err.to_string().contains("probe.color"), "got: {}", err);
    }

    #[test]
    fn test_playback_options() {
        let mut config = Config::default();
        config.playback.speed = 3.0;
        let options = config.playback_options();
        assert!((options.speed - 3.0).abs() < f64::EPSILON);
        assert_eq!(options.lateness_warning, Duration::from_millis(5));
        assert_eq!(config.timer().coarse_step(), Duration::from_millis(5));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[timer]\nspin_threshold_us = 500\n").unwrap();
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.timer.spin_threshold_us, 500);
        assert!(load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
