use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assets::AssetSource;
use crate::error::{AssetError, ConfigError, Result};
use crate::overlays::{SubtitlePlan, TextOverlaySpec, WatermarkSpec};
use crate::video::ClipWindow;

/// One source clip, optionally trimmed to a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRef {
    pub source: AssetSource,
    /// Seconds into the source where playback begins
    #[serde(default)]
    pub start: Option<f64>,
    /// Seconds of source to play
    #[serde(default)]
    pub duration: Option<f64>,
}

impl ClipRef {
    pub fn new(source: AssetSource) -> Self {
        Self { source, start: None, duration: None }
    }

    pub fn trimmed(source: AssetSource, start: f64, duration: f64) -> Self {
        Self { source, start: Some(start), duration: Some(duration) }
    }

    pub fn window(&self) -> Option<ClipWindow> {
        if self.start.is_none() && self.duration.is_none() {
            return None;
        }
        Some(ClipWindow { start: self.start.unwrap_or(0.0), duration: self.duration })
    }
}

/// Named aspect ratios for the output surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:5")]
    Feed,
    /// Use the first clip's aspect ratio
    #[serde(rename = "match-first-clip")]
    MatchFirstClip,
}

/// Output surface size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum OutputSize {
    Fixed { width: u32, height: u32 },
    Aspect { ratio: AspectRatio },
}

impl Default for OutputSize {
    fn default() -> Self {
        OutputSize::Aspect { ratio: AspectRatio::Portrait }
    }
}

impl OutputSize {
    /// Concrete even dimensions; aspect policies put `long_edge` on the longer side
    pub fn resolve(&self, long_edge: u32, first_clip: (u32, u32)) -> (u32, u32) {
        let (width, height) = match *self {
            OutputSize::Fixed { width, height } => (width, height),
            OutputSize::Aspect { ratio } => {
                let (rw, rh) = match ratio {
                    AspectRatio::Portrait => (9, 16),
                    AspectRatio::Landscape => (16, 9),
                    AspectRatio::Square => (1, 1),
                    AspectRatio::Feed => (4, 5),
                    AspectRatio::MatchFirstClip => first_clip,
                };
                scale_to_long_edge(rw.max(1), rh.max(1), long_edge)
            }
        };
        (even(width), even(height))
    }
}

fn scale_to_long_edge(rw: u32, rh: u32, long_edge: u32) -> (u32, u32) {
    let long_edge = long_edge as f64;
    if rw >= rh {
        (long_edge as u32, (long_edge * rh as f64 / rw as f64).round() as u32)
    } else {
        ((long_edge * rw as f64 / rh as f64).round() as u32, long_edge as u32)
    }
}

fn even(value: u32) -> u32 {
    (value.max(2) / 2) * 2
}

/// Declarative description of one render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPlan {
    pub clips: Vec<ClipRef>,
    /// Narration or soundtrack; the timeline follows it when present
    #[serde(default)]
    pub audio: Option<AssetSource>,
    #[serde(default)]
    pub mix_original_audio: bool,
    #[serde(default)]
    pub watermark: Option<WatermarkSpec>,
    #[serde(default)]
    pub text_overlay: Option<TextOverlaySpec>,
    #[serde(default)]
    pub subtitles: Option<SubtitlePlan>,
    #[serde(default)]
    pub output: OutputSize,
    /// Overrides `output.fps` from the config
    #[serde(default)]
    pub fps: Option<f64>,
    /// Overrides `output.bitrate` from the config
    #[serde(default)]
    pub bitrate: Option<u32>,
}

impl CompositionPlan {
    pub fn new(clips: Vec<ClipRef>) -> Self {
        Self {
            clips,
            audio: None,
            mix_original_audio: false,
            watermark: None,
            text_overlay: None,
            subtitles: None,
            output: OutputSize::default(),
            fps: None,
            bitrate: None,
        }
    }

    /// Load a plan from TOML or JSON (chosen by extension, JSON for `.json`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let plan: CompositionPlan = if is_json {
            serde_json::from_str(&content)
                .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?
        } else {
            toml::from_str(&content)
                .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Structural checks that need no I/O
    pub fn validate(&self) -> Result<()> {
        if self.clips.is_empty() {
            return Err(AssetError::InvalidReference {
                details: "composition plan has no clips".to_string(),
            }
            .into());
        }

        for (index, clip) in self.clips.iter().enumerate() {
            let bad_start = clip.start.is_some_and(|s| !(s >= 0.0 && s.is_finite()));
            let bad_duration = clip.duration.is_some_and(|d| !(d > 0.0 && d.is_finite()));
            if bad_start || bad_duration {
                return Err(AssetError::InvalidReference {
                    details: format!("clip {} has an invalid window", index),
                }
                .into());
            }
        }

        if let OutputSize::Fixed { width, height } = self.output {
            if width < 2 || height < 2 {
                return Err(ConfigError::InvalidValue {
                    key: "output".to_string(),
                    value: format!("{}x{}", width, height),
                }
                .into());
            }
        }

        if let Some(fps) = self.fps {
            if !(fps > 0.0 && fps <= 120.0) {
                return Err(ConfigError::InvalidValue {
                    key: "fps".to_string(),
                    value: fps.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}
