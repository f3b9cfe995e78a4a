use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::format::{CaptureFormat, Container};
use crate::error::{CompositorError, Result};
use crate::video::Frame;

/// Size of the fragments read back from the muxer
const FRAGMENT_SIZE: usize = 64 * 1024;

/// Encode parameters fixed for one capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeParams {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub bitrate: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Something that can turn composited frames and mixed audio into a container
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn supports(&self, format: &CaptureFormat) -> bool;

    async fn open(
        &self,
        format: &CaptureFormat,
        params: &EncodeParams,
    ) -> Result<Box<dyn CaptureEncoder>>;
}

/// A live encode. `push` runs inside the compositor tick and must not block
/// on anything slower than a pipe write.
#[async_trait]
pub trait CaptureEncoder: Send {
    /// Feed one frame plus the interleaved audio covering it; returns any
    /// encoded fragments that became available
    fn push(&mut self, frame: &Frame, audio: &[f32]) -> Result<Vec<Vec<u8>>>;

    /// Flush the encode and return the remaining fragments in order
    async fn finish(&mut self, cancel: &CancellationToken) -> Result<Vec<Vec<u8>>>;

    /// Tear down without producing output
    fn abort(&mut self);
}

/// Map a codec name to the ffmpeg encoder that produces it
pub fn ffmpeg_encoder(codec: &str) -> &str {
    match codec {
        "h264" => "libx264",
        "vp8" => "libvpx",
        "vp9" => "libvpx-vp9",
        "opus" => "libopus",
        "vorbis" => "libvorbis",
        other => other,
    }
}

/// Capture backend that encodes through an ffmpeg child process
pub struct FfmpegCaptureBackend {
    ffmpeg: PathBuf,
    encoders: OnceCell<HashSet<String>>,
}

impl FfmpegCaptureBackend {
    pub fn new(ffmpeg: &Path) -> Self {
        Self {
            ffmpeg: ffmpeg.to_path_buf(),
            encoders: OnceCell::new(),
        }
    }

    async fn encoders(&self) -> &HashSet<String> {
        self.encoders
            .get_or_init(|| async {
                let output = tokio::process::Command::new(&self.ffmpeg)
                    .args(["-hide_banner", "-encoders"])
                    .kill_on_drop(true)
                    .output()
                    .await;
                match output {
                    Ok(output) if output.status.success() => {
                        parse_encoder_list(&String::from_utf8_lossy(&output.stdout))
                    }
                    Ok(_) | Err(_) => {
                        warn!("Could not list ffmpeg encoders from {}", self.ffmpeg.display());
                        HashSet::new()
                    }
                }
            })
            .await
    }
}

/// Encoder names from `ffmpeg -encoders` output
fn parse_encoder_list(listing: &str) -> HashSet<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl CaptureBackend for FfmpegCaptureBackend {
    async fn supports(&self, format: &CaptureFormat) -> bool {
        let encoders = self.encoders().await;
        encoders.contains(ffmpeg_encoder(&format.video_codec))
            && encoders.contains(ffmpeg_encoder(&format.audio_codec))
    }

    async fn open(
        &self,
        format: &CaptureFormat,
        params: &EncodeParams,
    ) -> Result<Box<dyn CaptureEncoder>> {
        let encoder = FfmpegEncoder::spawn(&self.ffmpeg, format, *params)?;
        Ok(Box::new(encoder))
    }
}

/// Pipes raw frames into ffmpeg and spools audio to WAV, muxing on finish
struct FfmpegEncoder {
    ffmpeg: PathBuf,
    format: CaptureFormat,
    params: EncodeParams,
    workdir: TempDir,
    video_path: PathBuf,
    audio_path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    wav: Option<hound::WavWriter<BufWriter<File>>>,
    frames: u64,
}

impl FfmpegEncoder {
    fn spawn(ffmpeg: &Path, format: &CaptureFormat, params: EncodeParams) -> Result<Self> {
        let workdir = tempfile::Builder::new().prefix("reel-capture-").tempdir()?;
        let video_path = workdir.path().join(format!("video.{}", format.container.extension()));
        let audio_path = workdir.path().join("audio.wav");

        let wav = hound::WavWriter::create(
            &audio_path,
            hound::WavSpec {
                channels: params.channels,
                sample_rate: params.sample_rate,
                bits_per_sample: 32,
                sample_format: hound::SampleFormat::Float,
            },
        )
        .map_err(|e| CompositorError::capture_fatal(format!("Failed to open audio spool: {}", e)))?;

        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", params.width, params.height)])
            .args(["-r", &format!("{}", params.fps)])
            .args(["-i", "pipe:0", "-an"])
            .args(["-c:v", ffmpeg_encoder(&format.video_codec)])
            .args(["-b:v", &params.bitrate.to_string()])
            .args(["-pix_fmt", "yuv420p"])
            .arg(&video_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CompositorError::capture_fatal(format!("Failed to start ffmpeg: {}", e)))?;
        let stdin = child.stdin.take();

        debug!("Capture encoder started for {}", format);
        Ok(Self {
            ffmpeg: ffmpeg.to_path_buf(),
            format: format.clone(),
            params,
            workdir,
            video_path,
            audio_path,
            child: Some(child),
            stdin,
            wav: Some(wav),
            frames: 0,
        })
    }

    async fn mux(&self, cancel: &CancellationToken) -> Result<Vec<Vec<u8>>> {
        let mut cmd = tokio::process::Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .arg("-i")
            .arg(&self.video_path)
            .arg("-i")
            .arg(&self.audio_path)
            .args(["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy"])
            .args(["-c:a", ffmpeg_encoder(&self.format.audio_codec)])
            .args(["-ar", &self.params.sample_rate.to_string()]);
        match self.format.container {
            Container::Mp4 => cmd.args(["-movflags", "frag_keyframe+empty_moov", "-f", "mp4"]),
            Container::Webm => cmd.args(["-f", "webm"]),
        };
        let mut child = cmd
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CompositorError::capture_fatal(format!("Failed to start muxer: {}", e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| CompositorError::capture_fatal("Muxer stdout unavailable"))?;

        let mut fragments = Vec::new();
        loop {
            let mut buf = vec![0u8; FRAGMENT_SIZE];
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CompositorError::Cancelled),
                read = stdout.read(&mut buf) => read?,
            };
            if read == 0 {
                break;
            }
            buf.truncate(read);
            fragments.push(buf);
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(CompositorError::capture_fatal(format!("Muxer exited with {}", status)));
        }
        Ok(fragments)
    }
}

#[async_trait]
impl CaptureEncoder for FfmpegEncoder {
    fn push(&mut self, frame: &Frame, audio: &[f32]) -> Result<Vec<Vec<u8>>> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CompositorError::capture_fatal("Encoder input already closed"))?;
        stdin
            .write_all(frame.as_rgb_bytes())
            .map_err(|e| CompositorError::capture_fatal(format!("Encoder pipe closed: {}", e)))?;

        if let Some(wav) = self.wav.as_mut() {
            for &sample in audio {
                wav.write_sample(sample).map_err(|e| {
                    CompositorError::capture_fatal(format!("Audio spool write failed: {}", e))
                })?;
            }
        }
        self.frames += 1;
        Ok(Vec::new())
    }

    async fn finish(&mut self, cancel: &CancellationToken) -> Result<Vec<Vec<u8>>> {
        // Closing stdin lets ffmpeg flush and exit
        self.stdin = None;
        if let Some(wav) = self.wav.take() {
            wav.finalize().map_err(|e| {
                CompositorError::capture_fatal(format!("Audio spool finalize failed: {}", e))
            })?;
        }

        if let Some(mut child) = self.child.take() {
            let status = tokio::task::spawn_blocking(move || child.wait())
                .await
                .map_err(|e| CompositorError::capture_fatal(format!("Encoder wait failed: {}", e)))??;
            if !status.success() {
                return Err(CompositorError::capture_fatal(format!(
                    "Video encoder exited with {}",
                    status
                )));
            }
        }

        if self.frames == 0 {
            return Ok(Vec::new());
        }

        let fragments = self.mux(cancel).await?;
        info!(
            "Muxed {} frames into {} fragments ({})",
            self.frames,
            fragments.len(),
            self.workdir.path().display()
        );
        Ok(fragments)
    }

    fn abort(&mut self) {
        self.stdin = None;
        self.wav = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("Capture encoder aborted after {} frames", self.frames);
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Encoders:
 V..... = Video
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC
 V....D libvpx               libvpx VP8 (codec vp8)
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn test_parse_encoder_list() {
        let encoders = parse_encoder_list(LISTING);
        assert!(encoders.contains("libx264"));
        assert!(encoders.contains("libvpx"));
        assert!(encoders.contains("aac"));
        assert!(!encoders.contains("libopus"));
        assert!(!encoders.contains("="));
    }

    #[test]
    fn test_codec_to_encoder() {
        assert_eq!(ffmpeg_encoder("h264"), "libx264");
        assert_eq!(ffmpeg_encoder("opus"), "libopus");
        assert_eq!(ffmpeg_encoder("aac"), "aac");
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_supports_nothing() {
        let backend = FfmpegCaptureBackend::new(Path::new("/nonexistent/ffmpeg"));
        assert!(!backend.supports(&CaptureFormat::mp4_h264_aac()).await);
    }
}
