use image::RgbaImage;

use crate::assets::ledger::TempRef;
use crate::assets::source::AssetSource;
use crate::audio::AudioData;
use crate::video::{VideoDecoder, VideoMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Video,
    Audio,
    Image,
}

/// Summary of a resolved asset, for logs and reports
#[derive(Debug, Clone, PartialEq)]
pub struct AssetInfo {
    pub kind: AssetKind,
    pub source: AssetSource,
    pub natural_width: Option<u32>,
    pub natural_height: Option<u32>,
    pub duration: f64,
}

/// A decoded, seekable video clip
pub struct VideoAsset {
    pub source: AssetSource,
    pub decoder: Box<dyn VideoDecoder>,
    pub metadata: VideoMetadata,
    /// The clip's own soundtrack, when requested and present
    pub audio: Option<AudioData>,
    pub temp: Option<TempRef>,
}

impl VideoAsset {
    /// Playable duration after trimming
    pub fn duration(&self) -> f64 {
        self.decoder.duration()
    }

    pub fn info(&self) -> AssetInfo {
        let (width, height) = self.decoder.dimensions();
        AssetInfo {
            kind: AssetKind::Video,
            source: self.source.clone(),
            natural_width: Some(width),
            natural_height: Some(height),
            duration: self.duration(),
        }
    }
}

/// Decoded narration or soundtrack audio
pub struct AudioAsset {
    pub source: AssetSource,
    pub data: AudioData,
    pub temp: Option<TempRef>,
}

impl AudioAsset {
    pub fn info(&self) -> AssetInfo {
        AssetInfo {
            kind: AssetKind::Audio,
            source: self.source.clone(),
            natural_width: None,
            natural_height: None,
            duration: self.data.duration,
        }
    }
}

/// Decoded still image (watermarks)
pub struct ImageAsset {
    pub source: AssetSource,
    pub image: RgbaImage,
    pub temp: Option<TempRef>,
}

impl ImageAsset {
    pub fn info(&self) -> AssetInfo {
        AssetInfo {
            kind: AssetKind::Image,
            source: self.source.clone(),
            natural_width: Some(self.image.width()),
            natural_height: Some(self.image.height()),
            duration: 0.0,
        }
    }
}
