//! Configuration management for the player core
//!
//! This module handles loading and managing configuration from config files
//! and environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::output::{check_ratio, VOLUME_MAX};
use crate::player::{MediaStoppedAction, RATE_MAX, RATE_MIN};
use crate::utils::error::{CoreError, IntoCoreError, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playback behaviour
    pub player: PlayerConfig,

    /// Audio output defaults
    pub audio: AudioConfig,

    /// Video output defaults
    pub video: VideoConfig,

    /// General settings
    pub general: GeneralConfig,
}

/// Playback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Chain to the next media without leaving the Playing state
    pub gapless: bool,

    /// Period of the input clock in milliseconds
    pub tick_interval_ms: u64,

    /// Action taken when a media ends
    pub media_stopped_action: MediaStoppedAction,

    /// Pause while the audio system corks the player
    pub pause_on_cork: bool,

    /// Playback rate applied to new players
    pub initial_rate: f32,

    /// Preferred audio language (ISO 639 code)
    pub audio_language: Option<String>,

    /// Preferred subtitle language; subtitles stay off without one
    pub subtitle_language: Option<String>,
}

/// Audio output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Initial volume (0.0 - 2.0)
    pub volume: f32,

    /// Start muted
    pub muted: bool,

    /// Volume change per increment step
    pub volume_step: f32,
}

/// Video output configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Start in fullscreen mode
    pub fullscreen: bool,

    /// Forced aspect ratio, such as "16:9"
    pub aspect_ratio: Option<String>,
}

/// General configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            gapless: true,
            tick_interval_ms: 10,
            media_stopped_action: MediaStoppedAction::Continue,
            pause_on_cork: false,
            initial_rate: 1.0,
            audio_language: None,
            subtitle_language: None,
        }
    }
}

impl PlayerConfig {
    /// Input clock period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
            volume_step: 0.05,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from the default locations
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. User config file (`~/.config/ccplayer/core.toml` on Linux)
    /// 3. Environment variables (`CCPLAYER_*` prefix)
    pub fn load() -> Result<Self> {
        let mut config = match Self::user_config_path() {
            Some(path) if path.exists() => Self::read_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file, then apply the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| CoreError::Config("Cannot determine user config path".to_string()))?;
        self.save_to(&path)
    }

    /// Save configuration to a file, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }
        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(path, toml).config_err("Failed to write config file")?;
        Ok(())
    }

    /// Read a TOML file; missing keys keep their default values
    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        toml::from_str(&contents).config_err("Failed to parse config file")
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `CCPLAYER_*` overrides read through `lookup`
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .parse()
                .map_err(|_| CoreError::Config(format!("Invalid {}: '{}'", key, value)))
        }

        if let Some(v) = lookup("CCPLAYER_GAPLESS") {
            self.player.gapless = parse("CCPLAYER_GAPLESS", &v)?;
        }
        if let Some(v) = lookup("CCPLAYER_TICK_INTERVAL_MS") {
            self.player.tick_interval_ms = parse("CCPLAYER_TICK_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("CCPLAYER_MEDIA_STOPPED_ACTION") {
            self.player.media_stopped_action = v
                .parse::<MediaStoppedAction>()
                .config_err("Invalid CCPLAYER_MEDIA_STOPPED_ACTION")?;
        }
        if let Some(v) = lookup("CCPLAYER_RATE") {
            self.player.initial_rate = parse("CCPLAYER_RATE", &v)?;
        }
        if let Some(v) = lookup("CCPLAYER_AUDIO_LANGUAGE") {
            self.player.audio_language = Some(v);
        }
        if let Some(v) = lookup("CCPLAYER_SUBTITLE_LANGUAGE") {
            self.player.subtitle_language = Some(v);
        }
        if let Some(v) = lookup("CCPLAYER_AUDIO_VOLUME") {
            self.audio.volume = parse("CCPLAYER_AUDIO_VOLUME", &v)?;
        }
        if let Some(v) = lookup("CCPLAYER_LOG_LEVEL") {
            self.general.log_level = v;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.player.tick_interval_ms == 0 {
            return Err(CoreError::Config("tick_interval_ms must be non-zero".to_string()));
        }

        let rate = self.player.initial_rate;
        if !(RATE_MIN..=RATE_MAX).contains(&rate) {
            return Err(CoreError::Config(format!(
                "initial_rate must be between {} and {}",
                RATE_MIN, RATE_MAX
            )));
        }

        if !(0.0..=VOLUME_MAX).contains(&self.audio.volume) {
            return Err(CoreError::Config(format!(
                "Audio volume must be between 0.0 and {}",
                VOLUME_MAX
            )));
        }

        if let Some(ratio) = &self.video.aspect_ratio {
            check_ratio(ratio).config_err("Invalid aspect_ratio")?;
        }

        if !LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(CoreError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, LOG_LEVELS
            )));
        }

        Ok(())
    }

    /// User config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ccplayer").join("core.toml"))
    }
}
