use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::{debug, warn};

use crate::error::{Result, VideoError};
use crate::video::types::{Frame, VideoMetadata};

/// Optional sub-range of a source clip, in source seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    pub start: f64,
    /// Until the end of the source when `None`
    pub duration: Option<f64>,
}

impl ClipWindow {
    /// Playable length of this window over a source of `source_duration`
    pub fn clamp_duration(&self, source_duration: f64) -> f64 {
        let available = (source_duration - self.start.max(0.0)).max(0.0);
        match self.duration {
            Some(duration) => duration.max(0.0).min(available),
            None => available,
        }
    }
}

/// A decoded, seekable video source
///
/// Decoders are driven from the compositor tick and must answer synchronously.
pub trait VideoDecoder: Send {
    /// Playable duration in seconds (after any window is applied)
    fn duration(&self) -> f64;

    /// Natural frame size in pixels
    fn dimensions(&self) -> (u32, u32);

    /// Seek to clip time zero and buffer the first frame
    ///
    /// Used both to begin playback and to preload the next clip.
    fn prepare(&mut self) -> Result<()>;

    /// Frame to display at `clip_time` seconds into the clip
    ///
    /// Returns `Ok(None)` while no frame is drawable yet. Past the end the
    /// last decoded frame is held.
    fn frame_at(&mut self, clip_time: f64) -> Result<Option<&Frame>>;

    /// Release the decoded resource; later calls may re-prepare
    fn release(&mut self);
}

/// Decoder that streams raw RGB frames out of an ffmpeg child process
pub struct FfmpegDecoder {
    ffmpeg: PathBuf,
    path: PathBuf,
    metadata: VideoMetadata,
    window: Option<ClipWindow>,
    fps: f64,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    current: Option<Frame>,
    current_index: i64,
    exhausted: bool,
}

impl FfmpegDecoder {
    pub fn new(
        ffmpeg: &Path,
        path: &Path,
        metadata: VideoMetadata,
        window: Option<ClipWindow>,
        fps: f64,
    ) -> Self {
        Self {
            ffmpeg: ffmpeg.to_path_buf(),
            path: path.to_path_buf(),
            metadata,
            window,
            fps,
            child: None,
            stdout: None,
            current: None,
            current_index: -1,
            exhausted: false,
        }
    }

    fn spawn(&mut self) -> Result<()> {
        self.release();

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        if let Some(window) = self.window {
            cmd.args(["-ss", &format!("{:.3}", window.start)]);
            if let Some(duration) = window.duration {
                cmd.args(["-t", &format!("{:.3}", duration)]);
            }
        }
        cmd.arg("-i")
            .arg(&self.path)
            .args([
                "-an",
                "-vf", &format!("fps={}", self.fps),
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| VideoError::DecodingFailed {
            reason: format!("Failed to spawn ffmpeg for {}: {}", self.path.display(), e),
        })?;
        self.stdout = child.stdout.take();
        self.child = Some(child);
        self.current_index = -1;
        self.exhausted = false;

        debug!("Started frame stream for {}", self.path.display());
        Ok(())
    }

    /// Read the next frame from the stream; false at end of stream
    fn read_next(&mut self) -> Result<bool> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(false);
        };
        let (width, height) = (self.metadata.width, self.metadata.height);
        let mut buf = vec![0u8; width as usize * height as usize * 3];

        match stdout.read_exact(&mut buf) {
            Ok(()) => {
                let frame = Frame::from_rgb_bytes(width, height, buf).ok_or_else(|| {
                    VideoError::DecodingFailed { reason: "Frame size mismatch".to_string() }
                })?;
                self.current = Some(frame);
                self.current_index += 1;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.exhausted = true;
                Ok(false)
            }
            Err(e) => Err(VideoError::DecodingFailed {
                reason: format!("Frame read failed for {}: {}", self.path.display(), e),
            }
            .into()),
        }
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn duration(&self) -> f64 {
        match self.window {
            Some(window) => window.clamp_duration(self.metadata.duration),
            None => self.metadata.duration,
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.metadata.width, self.metadata.height)
    }

    fn prepare(&mut self) -> Result<()> {
        if self.child.is_some() && self.current_index == 0 {
            return Ok(());
        }
        self.spawn()?;
        if !self.read_next()? {
            return Err(VideoError::DecodingFailed {
                reason: format!("{} produced no frames", self.path.display()),
            }
            .into());
        }
        Ok(())
    }

    fn frame_at(&mut self, clip_time: f64) -> Result<Option<&Frame>> {
        let target = (clip_time.max(0.0) * self.fps + 1e-6).floor() as i64;

        if self.child.is_none() || target < self.current_index {
            self.prepare()?;
        }

        while self.current_index < target && !self.exhausted {
            if !self.read_next()? {
                break;
            }
        }

        Ok(self.current.as_ref())
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                if e.kind() != std::io::ErrorKind::InvalidInput {
                    warn!("Failed to stop frame stream for {}: {}", self.path.display(), e);
                }
            }
            let _ = child.wait();
        }
        self.current_index = -1;
        self.exhausted = false;
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(duration: f64) -> VideoMetadata {
        VideoMetadata {
            duration,
            fps: 30.0,
            width: 16,
            height: 16,
            codec: "h264".to_string(),
            has_audio: false,
        }
    }

    #[test]
    fn test_window_clamps_to_source() {
        let window = ClipWindow { start: 50.0, duration: Some(30.0) };
        assert_eq!(window.clamp_duration(60.0), 10.0);
        assert_eq!(window.clamp_duration(100.0), 30.0);
        assert_eq!(ClipWindow { start: 5.0, duration: None }.clamp_duration(8.0), 3.0);
        assert_eq!(ClipWindow { start: 9.0, duration: None }.clamp_duration(8.0), 0.0);
    }

    #[test]
    fn test_decoder_duration_uses_window() {
        let ffmpeg = Path::new("ffmpeg");
        let full = FfmpegDecoder::new(ffmpeg, Path::new("a.mp4"), metadata(12.0), None, 30.0);
        assert_eq!(full.duration(), 12.0);

        let window = Some(ClipWindow { start: 4.0, duration: Some(5.0) });
        let trimmed = FfmpegDecoder::new(ffmpeg, Path::new("a.mp4"), metadata(12.0), window, 30.0);
        assert_eq!(trimmed.duration(), 5.0);
        assert_eq!(trimmed.dimensions(), (16, 16));
    }

    #[test]
    fn test_missing_binary_fails_prepare() {
        let mut decoder = FfmpegDecoder::new(
            Path::new("/nonexistent/ffmpeg"),
            Path::new("a.mp4"),
            metadata(1.0),
            None,
            30.0,
        );
        assert!(decoder.prepare().is_err());
    }
}
