use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::assets::ledger::{ReleaseLedger, TempRef};
use crate::assets::source::{AssetSource, RemoteFetcher};
use crate::assets::types::{AudioAsset, ImageAsset, VideoAsset};
use crate::audio::{AudioData, AudioLoader};
use crate::composition::plan::ClipRef;
use crate::error::{AssetError, AudioError, CompositorError, Result, VideoError};
use crate::video::{probe_video, ClipWindow, FfmpegDecoder, VideoDecoder, VideoMetadata};

/// A video opened by a media backend
pub struct OpenedVideo {
    pub decoder: Box<dyn VideoDecoder>,
    pub metadata: VideoMetadata,
    pub audio: Option<AudioData>,
}

/// Decodes local media files
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn open_video(
        &self,
        path: &Path,
        window: Option<ClipWindow>,
        fps: f64,
        with_audio: bool,
    ) -> Result<OpenedVideo>;

    async fn open_audio(&self, path: &Path) -> Result<AudioData>;

    async fn open_image(&self, path: &Path) -> Result<RgbaImage>;
}

/// Media backend built on the ffmpeg/ffprobe binaries
pub struct FfmpegMediaBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    sample_rate: u32,
    channels: u16,
}

impl FfmpegMediaBackend {
    pub fn new(ffmpeg: &Path, ffprobe: &Path, sample_rate: u32, channels: u16) -> Self {
        Self {
            ffmpeg: ffmpeg.to_path_buf(),
            ffprobe: ffprobe.to_path_buf(),
            sample_rate,
            channels,
        }
    }

    /// Decode the audio stream of any container through a temporary WAV
    async fn extract_audio(&self, path: &Path, window: Option<ClipWindow>) -> Result<AudioData> {
        let wav = tempfile::Builder::new().prefix("reel-audio-").suffix(".wav").tempfile()?;

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"]);
        if let Some(window) = window {
            cmd.args(["-ss", &format!("{:.3}", window.start)]);
            if let Some(duration) = window.duration {
                cmd.args(["-t", &format!("{:.3}", duration)]);
            }
        }
        let status = cmd
            .arg("-i")
            .arg(path)
            .args(["-vn", "-ac", &self.channels.to_string(), "-ar", &self.sample_rate.to_string()])
            .args(["-f", "wav"])
            .arg(wav.path())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|_| AudioError::LoadFailed { path: path.display().to_string() })?;

        if !status.success() {
            return Err(AudioError::LoadFailed { path: path.display().to_string() }.into());
        }
        AudioLoader::load(wav.path()).await
    }
}

#[async_trait]
impl MediaBackend for FfmpegMediaBackend {
    async fn open_video(
        &self,
        path: &Path,
        window: Option<ClipWindow>,
        fps: f64,
        with_audio: bool,
    ) -> Result<OpenedVideo> {
        let metadata = probe_video(&self.ffprobe, path).await?;

        if let Some(window) = window {
            if window.clamp_duration(metadata.duration) <= 0.0 {
                return Err(VideoError::InvalidParameters {
                    details: format!(
                        "window starting at {:.2}s is past the end ({:.2}s)",
                        window.start, metadata.duration
                    ),
                }
                .into());
            }
        }

        let audio = if with_audio && metadata.has_audio {
            Some(self.extract_audio(path, window).await?)
        } else {
            None
        };

        let decoder = FfmpegDecoder::new(&self.ffmpeg, path, metadata.clone(), window, fps);
        Ok(OpenedVideo { decoder: Box::new(decoder), metadata, audio })
    }

    async fn open_audio(&self, path: &Path) -> Result<AudioData> {
        let supported = AudioLoader::detect_format(path)
            .is_some_and(|ext| AudioLoader::is_format_supported(&ext));
        if supported {
            AudioLoader::load(path).await
        } else {
            self.extract_audio(path, None).await
        }
    }

    async fn open_image(&self, path: &Path) -> Result<RgbaImage> {
        let image = image::open(path).map_err(|e| AssetError::LoadFailed {
            source_ref: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(image.to_rgba8())
    }
}

/// Resolves plan references into decoded assets
///
/// Remote sources are downloaded first; downloads are tracked temporary
/// references that the caller must release when the run ends.
pub struct MediaAssetLoader {
    backend: Arc<dyn MediaBackend>,
    fetcher: Arc<dyn RemoteFetcher>,
    ledger: ReleaseLedger,
}

impl MediaAssetLoader {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        fetcher: Arc<dyn RemoteFetcher>,
        ledger: ReleaseLedger,
    ) -> Self {
        Self { backend, fetcher, ledger }
    }

    pub fn ledger(&self) -> &ReleaseLedger {
        &self.ledger
    }

    pub async fn load_video(
        &self,
        clip: &ClipRef,
        fps: f64,
        with_audio: bool,
        cancel: &CancellationToken,
    ) -> Result<VideoAsset> {
        let (path, temp) = self.localize(&clip.source, cancel).await?;
        let opened = self
            .guarded(
                &clip.source,
                temp,
                self.backend.open_video(&path, clip.window(), fps, with_audio),
                cancel,
            )
            .await?;
        let (opened, temp) = opened;

        let asset = VideoAsset {
            source: clip.source.clone(),
            decoder: opened.decoder,
            metadata: opened.metadata,
            audio: opened.audio,
            temp,
        };
        info!(
            "🎬 Loaded clip {}: {:.2}s ({}x{})",
            clip.source,
            asset.duration(),
            asset.metadata.width,
            asset.metadata.height
        );
        Ok(asset)
    }

    pub async fn load_audio(
        &self,
        source: &AssetSource,
        cancel: &CancellationToken,
    ) -> Result<AudioAsset> {
        let (path, temp) = self.localize(source, cancel).await?;
        let (data, temp) = self
            .guarded(source, temp, self.backend.open_audio(&path), cancel)
            .await?;
        info!("🎵 Loaded audio {}: {:.2}s", source, data.duration);
        Ok(AudioAsset { source: source.clone(), data, temp })
    }

    pub async fn load_image(
        &self,
        source: &AssetSource,
        cancel: &CancellationToken,
    ) -> Result<ImageAsset> {
        let (path, temp) = self.localize(source, cancel).await?;
        let (image, temp) = self
            .guarded(source, temp, self.backend.open_image(&path), cancel)
            .await?;
        debug!("Loaded image {}: {}x{}", source, image.width(), image.height());
        Ok(ImageAsset { source: source.clone(), image, temp })
    }

    /// Local path for a source, downloading remote ones
    async fn localize(
        &self,
        source: &AssetSource,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, Option<TempRef>)> {
        if cancel.is_cancelled() {
            return Err(CompositorError::Cancelled);
        }
        match source {
            AssetSource::File(path) => {
                if !path.is_file() {
                    return Err(AssetError::LoadFailed {
                        source_ref: source.to_string(),
                        reason: "file not found".to_string(),
                    }
                    .into());
                }
                Ok((path.clone(), None))
            }
            AssetSource::Url(url) => {
                let extension = source.extension();
                let file = self
                    .fetcher
                    .fetch(url, extension.as_deref(), cancel)
                    .await
                    .map_err(|e| load_failure(source, e))?;
                let path = file.path().to_path_buf();
                let temp = self.ledger.acquire(url.clone(), Some(file.into_temp_path()));
                Ok((path, Some(temp)))
            }
        }
    }

    /// Await a decode step under cancellation, releasing `temp` on failure
    async fn guarded<T>(
        &self,
        source: &AssetSource,
        temp: Option<TempRef>,
        step: impl Future<Output = Result<T>>,
        cancel: &CancellationToken,
    ) -> Result<(T, Option<TempRef>)> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompositorError::Cancelled),
            result = step => result,
        };
        match result {
            Ok(value) => Ok((value, temp)),
            Err(e) => {
                if let Some(temp) = temp {
                    temp.release();
                }
                Err(load_failure(source, e))
            }
        }
    }
}

/// Normalise any load error to `AssetLoadFailure`, keeping cancellation
fn load_failure(source: &AssetSource, error: CompositorError) -> CompositorError {
    match error {
        CompositorError::Cancelled | CompositorError::Asset(_) => error,
        other => AssetError::LoadFailed {
            source_ref: source.to_string(),
            reason: other.to_string(),
        }
        .into(),
    }
}
