use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capture::encoder::CaptureBackend;
use crate::error::{CaptureError, Result};

/// Output container of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Webm,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Webm => "video/webm",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A container plus video/audio codec pair the capture can produce
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub container: Container,
    pub video_codec: String,
    pub audio_codec: String,
}

impl CaptureFormat {
    pub fn new(container: Container, video_codec: &str, audio_codec: &str) -> Self {
        Self {
            container,
            video_codec: video_codec.to_string(),
            audio_codec: audio_codec.to_string(),
        }
    }

    pub fn mp4_h264_aac() -> Self {
        Self::new(Container::Mp4, "h264", "aac")
    }

    pub fn webm_vp8_opus() -> Self {
        Self::new(Container::Webm, "vp8", "opus")
    }

    /// MP4/H.264+AAC first, WebM/VP8+Opus as fallback
    pub fn default_preferences() -> Vec<Self> {
        vec![Self::mp4_h264_aac(), Self::webm_vp8_opus()]
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}+{}", self.container, self.video_codec, self.audio_codec)
    }
}

/// Pick the first preferred format the backend supports
pub async fn negotiate(
    backend: &dyn CaptureBackend,
    preferences: &[CaptureFormat],
) -> Result<CaptureFormat> {
    for format in preferences {
        if backend.supports(format).await {
            info!("🎥 Capture format: {}", format);
            return Ok(format.clone());
        }
        debug!("Capture format {} not supported", format);
    }

    let tried = preferences
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(CaptureError::UnsupportedFormat { tried }.into())
}
