//! Normalisation of the raw capture into a broadly playable deliverable.
//!
//! The finalizer is an injected service with an explicit `init()`. Failure
//! to normalise never fails the run: [`finalize_or_degrade`] hands back the
//! raw capture and records the degradation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::Container;
use crate::error::{CompositorError, Result};

/// Result of the finalize step
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// Re-encoded to H.264/AAC MP4 with a fast-start layout
    Normalized,
    /// Normalisation failed; the raw capture is the deliverable
    Degraded { reason: String },
}

impl FinalizeOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, FinalizeOutcome::Degraded { .. })
    }
}

#[async_trait]
pub trait Finalizer: Send + Sync {
    /// One-time setup; safe to call more than once
    async fn init(&self) -> Result<()>;

    /// Produce a normalised MP4 from a raw capture
    async fn normalize(
        &self,
        raw: &[u8],
        container: Container,
        fps: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>>;
}

/// Run the finalizer, falling back to the raw blob on any failure except
/// cancellation. Returns the deliverable bytes, their container and the outcome.
pub async fn finalize_or_degrade(
    finalizer: &dyn Finalizer,
    raw: Vec<u8>,
    container: Container,
    fps: f64,
    cancel: &CancellationToken,
) -> Result<(Vec<u8>, Container, FinalizeOutcome)> {
    let attempt = async {
        finalizer.init().await?;
        finalizer.normalize(&raw, container, fps, cancel).await
    };

    match attempt.await {
        Ok(normalized) if !normalized.is_empty() => {
            info!("✨ Finalized deliverable: {} bytes", normalized.len());
            Ok((normalized, Container::Mp4, FinalizeOutcome::Normalized))
        }
        Ok(_) => Ok(degrade(raw, container, "finalizer returned no data".to_string())),
        Err(CompositorError::Cancelled) => Err(CompositorError::Cancelled),
        Err(e) => Ok(degrade(raw, container, e.to_string())),
    }
}

fn degrade(raw: Vec<u8>, container: Container, reason: String) -> (Vec<u8>, Container, FinalizeOutcome) {
    warn!(outcome = "degraded", %reason, "Finalize failed; delivering raw {} capture", container);
    (raw, container, FinalizeOutcome::Degraded { reason })
}

/// Finalizer that transcodes with ffmpeg
pub struct FfmpegFinalizer {
    ffmpeg: PathBuf,
    ready: OnceCell<()>,
}

impl FfmpegFinalizer {
    pub fn new(ffmpeg: &Path) -> Self {
        Self {
            ffmpeg: ffmpeg.to_path_buf(),
            ready: OnceCell::new(),
        }
    }
}

#[async_trait]
impl Finalizer for FfmpegFinalizer {
    async fn init(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                let output = Command::new(&self.ffmpeg)
                    .args(["-hide_banner", "-encoders"])
                    .kill_on_drop(true)
                    .output()
                    .await
                    .map_err(|e| {
                        CompositorError::generic(format!(
                            "ffmpeg not available at {}: {}",
                            self.ffmpeg.display(),
                            e
                        ))
                    })?;
                let listing = String::from_utf8_lossy(&output.stdout);
                if !(listing.contains("libx264") && listing.contains(" aac ")) {
                    return Err(CompositorError::generic("ffmpeg lacks libx264/aac encoders"));
                }
                Ok(())
            })
            .await
            .map(|_| ())
    }

    async fn normalize(
        &self,
        raw: &[u8],
        container: Container,
        fps: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let workdir = tempfile::Builder::new().prefix("reel-finalize-").tempdir()?;
        let input = workdir.path().join(format!("raw.{}", container.extension()));
        let output = workdir.path().join("final.mp4");
        tokio::fs::write(&input, raw).await?;

        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(&input)
            .args(["-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p"])
            .args(["-r", &format!("{}", fps)])
            .args(["-c:a", "aac", "-b:a", "128k"])
            .args(["-movflags", "+faststart"])
            .arg(&output)
            .kill_on_drop(true)
            .spawn()?;

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompositorError::Cancelled),
            status = child.wait() => status?,
        };
        if !status.success() {
            return Err(CompositorError::generic(format!("ffmpeg exited with {}", status)));
        }

        Ok(tokio::fs::read(&output).await?)
    }
}
