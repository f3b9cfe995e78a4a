use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    capture::CaptureFormat,
    error::{ConfigError, Result},
};

/// Main configuration for the Reel-Compositor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output surface and encode settings
    pub output: OutputConfig,

    /// Capture format negotiation
    pub capture: CaptureConfig,

    /// Clip scheduling constants
    pub scheduler: SchedulerConfig,

    /// Subtitle tokenisation
    pub subtitles: SubtitleConfig,

    /// Overlay drawing
    pub overlay: OverlayConfig,

    /// Timeline clock behaviour
    pub clock: ClockConfig,

    /// Logging setup used by the binary
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        self.capture.validate()?;
        self.scheduler.validate()?;
        self.subtitles.validate()?;
        Ok(())
    }
}

/// Output surface and encode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Frames per second of the composited surface
    pub fps: f64,

    /// Target video bitrate in bits per second
    pub bitrate: u32,

    /// Long edge in pixels used when the plan only gives an aspect ratio
    pub long_edge: u32,

    /// Sample rate of the mixed audio destination
    pub sample_rate: u32,

    /// Channel count of the mixed audio destination
    pub channels: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            bitrate: 5_000_000,
            long_edge: 1280,
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        if !(self.fps > 0.0 && self.fps <= 120.0) {
            return Err(ConfigError::InvalidValue {
                key: "output.fps".to_string(),
                value: self.fps.to_string()
            }.into());
        }

        if self.long_edge < 16 {
            return Err(ConfigError::InvalidValue {
                key: "output.long_edge".to_string(),
                value: self.long_edge.to_string()
            }.into());
        }

        if self.sample_rate == 0 || self.channels == 0 {
            return Err(ConfigError::InvalidValue {
                key: "output.audio".to_string(),
                value: format!("{} Hz / {} ch", self.sample_rate, self.channels)
            }.into());
        }

        Ok(())
    }
}

/// Capture format negotiation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Ordered preference list, most preferred first
    pub preferences: Vec<CaptureFormat>,

    /// FFmpeg executable used by the default backends
    pub ffmpeg_path: PathBuf,

    /// FFprobe executable used for clip metadata
    pub ffprobe_path: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            preferences: CaptureFormat::default_preferences(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl CaptureConfig {
    fn validate(&self) -> Result<()> {
        if self.preferences.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "capture.preferences".to_string(),
                value: "[]".to_string()
            }.into());
        }
        Ok(())
    }
}

/// Segment scheduler timing constants (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Remaining clip time at which the next clip starts buffering
    pub preload_lead: f64,

    /// Gain ramp between outgoing and incoming clip audio
    pub crossfade: f64,

    /// Delay between the last clip ending and capture stop (no narration)
    pub end_buffer: f64,

    /// Tolerance added to the total duration before a forced stop
    pub stop_epsilon: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            preload_lead: 0.25,
            crossfade: 0.12,
            end_buffer: 0.1,
            stop_epsilon: 0.05,
        }
    }
}

impl SchedulerConfig {
    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("scheduler.preload_lead", self.preload_lead),
            ("scheduler.crossfade", self.crossfade),
            ("scheduler.end_buffer", self.end_buffer),
            ("scheduler.stop_epsilon", self.stop_epsilon),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string()
                }.into());
            }
        }
        Ok(())
    }
}

/// Subtitle tokenisation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    /// Words shown together as one token
    pub words_per_group: usize,

    /// Floor for the per-token display duration (seconds)
    pub min_word_duration: f64,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            words_per_group: 3,
            min_word_duration: 0.3,
        }
    }
}

impl SubtitleConfig {
    fn validate(&self) -> Result<()> {
        if self.words_per_group == 0 {
            return Err(ConfigError::InvalidValue {
                key: "subtitles.words_per_group".to_string(),
                value: "0".to_string()
            }.into());
        }
        Ok(())
    }
}

/// Overlay drawing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Distance in pixels between an edge anchor and the frame edge
    pub padding: f64,

    /// Font used when a text style does not name a loadable font file
    pub default_font: Option<PathBuf>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            padding: 16.0,
            default_font: None,
        }
    }
}

/// How the timeline clock measures elapsed time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// Advance exactly one frame interval per compositor tick
    Offline,
    /// Follow the wall clock, pacing ticks at the output frame rate
    Realtime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub mode: ClockMode,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { mode: ClockMode::Offline }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reel_compositor=debug,warn")
    pub level: String,

    /// Whether to output structured JSON logs
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.output.fps = 25.0;
        original_config.clock.mode = ClockMode::Realtime;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.output.fps, 25.0);
        assert_eq!(loaded_config.clock.mode, ClockMode::Realtime);
        assert_eq!(
            loaded_config.capture.preferences,
            original_config.capture.preferences
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("partial.toml");
        std::fs::write(&file_path, "[subtitles]\nwords_per_group = 2\n").unwrap();

        let config = Config::from_file(&file_path).unwrap();
        assert_eq!(config.subtitles.words_per_group, 2);
        assert_eq!(config.scheduler.preload_lead, 0.25);
        assert_eq!(config.overlay.padding, 16.0);
    }

    #[test]
    fn test_invalid_fps() {
        let mut config = Config::default();
        config.output.fps = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_capture_preferences_rejected() {
        let mut config = Config::default();
        config.capture.preferences.clear();
        assert!(config.validate().is_err());
    }
}
