use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::encoder::CaptureEncoder;
use crate::capture::format::CaptureFormat;
use crate::error::{CaptureError, CompositorError, Result};
use crate::video::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Recording,
    Stopping,
    Stopped,
}

/// Why a capture stopped
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The narration track reached its end
    AudioEnded,
    /// The computed total duration elapsed
    DurationElapsed,
    /// Every clip played once with no narration to extend the run
    ClipsFinished,
    Cancelled,
    Error(String),
}

impl StopReason {
    /// Whether this stop should still produce a deliverable
    pub fn is_normal(&self) -> bool {
        matches!(
            self,
            StopReason::AudioEnded | StopReason::DurationElapsed | StopReason::ClipsFinished
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::AudioEnded => f.write_str("audio ended"),
            StopReason::DurationElapsed => f.write_str("duration elapsed"),
            StopReason::ClipsFinished => f.write_str("clips finished"),
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Owns one encode: phase transitions, fragment buffer and stop handling
pub struct CaptureSession {
    format: CaptureFormat,
    encoder: Option<Box<dyn CaptureEncoder>>,
    phase: CapturePhase,
    chunks: Vec<Vec<u8>>,
    stop_reason: Option<StopReason>,
    frames: u64,
}

impl CaptureSession {
    pub fn new(format: CaptureFormat, encoder: Box<dyn CaptureEncoder>) -> Self {
        Self {
            format,
            encoder: Some(encoder),
            phase: CapturePhase::Idle,
            chunks: Vec::new(),
            stop_reason: None,
            frames: 0,
        }
    }

    pub fn format(&self) -> &CaptureFormat {
        &self.format
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn start(&mut self) -> Result<()> {
        match self.phase {
            CapturePhase::Idle => {
                self.phase = CapturePhase::Recording;
                info!("🔴 Capture started ({})", self.format);
                Ok(())
            }
            CapturePhase::Recording => Ok(()),
            _ => Err(CompositorError::capture_fatal("Capture already stopped")),
        }
    }

    /// Encode one composited frame with its audio
    pub fn push(&mut self, frame: &Frame, audio: &[f32]) -> Result<()> {
        if self.phase != CapturePhase::Recording {
            return Ok(());
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| CompositorError::capture_fatal("Encoder missing"))?;
        let fragments = encoder.push(frame, audio)?;
        self.frames += 1;
        for fragment in fragments {
            self.append(fragment);
        }
        Ok(())
    }

    /// Append one encoded fragment; empty fragments are dropped
    pub fn append(&mut self, fragment: Vec<u8>) {
        if !fragment.is_empty() {
            self.chunks.push(fragment);
        }
    }

    /// Request a stop; only the first request takes effect
    ///
    /// Returns `true` when this call moved the session into `Stopping`.
    pub fn request_stop(&mut self, reason: StopReason) -> bool {
        match self.phase {
            CapturePhase::Idle | CapturePhase::Recording => {
                info!("⏹️  Capture stop requested: {}", reason);
                self.phase = CapturePhase::Stopping;
                self.stop_reason = Some(reason);
                true
            }
            CapturePhase::Stopping | CapturePhase::Stopped => {
                debug!("Ignoring repeated stop ({})", reason);
                false
            }
        }
    }

    /// Flush the encoder and assemble the raw blob
    ///
    /// Reaches `Stopped` on every path. Abnormal stops abort the encoder and
    /// return their error; a normal stop with no data is `EmptyRecording`.
    pub async fn finish(&mut self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        if self.phase == CapturePhase::Stopped {
            return Err(CompositorError::capture_fatal("Capture already finished"));
        }
        if self.phase != CapturePhase::Stopping {
            self.request_stop(StopReason::Error("finished without a stop request".to_string()));
        }

        let reason = self.stop_reason.clone().unwrap_or(StopReason::Cancelled);
        let result = if reason.is_normal() && self.frames == 0 {
            // Nothing was ever drawn; there is no encode to flush
            self.abort_encoder();
            Ok(())
        } else if reason.is_normal() {
            self.flush(cancel).await
        } else {
            self.abort_encoder();
            Err(match reason {
                StopReason::Cancelled => CompositorError::Cancelled,
                other => CompositorError::capture_fatal(other.to_string()),
            })
        };
        self.phase = CapturePhase::Stopped;

        let fragments_total = self.chunks.len();
        result.and_then(|()| {
            if self.chunks.is_empty() {
                warn!("Capture stopped with no data");
                return Err(CaptureError::EmptyRecording.into());
            }
            let blob = self.chunks.concat();
            self.chunks.clear();
            info!(
                "Capture assembled: {} fragments, {} bytes, {} frames",
                fragments_total,
                blob.len(),
                self.frames
            );
            Ok(blob)
        })
    }

    async fn flush(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(mut encoder) = self.encoder.take() else {
            return Ok(());
        };
        match encoder.finish(cancel).await {
            Ok(fragments) => {
                for fragment in fragments {
                    self.append(fragment);
                }
                Ok(())
            }
            Err(e) => {
                encoder.abort();
                Err(e)
            }
        }
    }

    fn abort_encoder(&mut self) {
        if let Some(mut encoder) = self.encoder.take() {
            encoder.abort();
        }
        self.chunks.clear();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.encoder.is_some() {
            self.abort_encoder();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::MemoryEncoder;

    fn session(encoder: MemoryEncoder) -> CaptureSession {
        CaptureSession::new(CaptureFormat::mp4_h264_aac(), Box::new(encoder))
    }

    #[tokio::test]
    async fn test_fragments_assembled_in_arrival_order() {
        let mut capture = session(MemoryEncoder::default());
        capture.start().unwrap();
        for shade in [1u8, 2, 3] {
            capture.push(&Frame::new_filled(1, 1, [shade, shade, shade]), &[]).unwrap();
        }
        capture.append(Vec::new());
        assert_eq!(capture.chunk_count(), 3);

        assert!(capture.request_stop(StopReason::AudioEnded));
        let blob = capture.finish(&CancellationToken::new()).await.unwrap();
        assert_eq!(blob, vec![1, 1, 1, 2, 2, 2, 3, 3, 3]);
        assert_eq!(capture.phase(), CapturePhase::Stopped);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut capture = session(MemoryEncoder::default());
        capture.start().unwrap();
        capture.push(&Frame::new_black(1, 1), &[]).unwrap();

        assert!(capture.request_stop(StopReason::AudioEnded));
        assert!(!capture.request_stop(StopReason::DurationElapsed));
        assert!(!capture.request_stop(StopReason::Cancelled));
        assert_eq!(capture.stop_reason(), Some(&StopReason::AudioEnded));

        let blob = capture.finish(&CancellationToken::new()).await.unwrap();
        assert_eq!(blob.len(), 3);
        assert!(capture.finish(&CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_frames_after_stop_are_ignored() {
        let mut capture = session(MemoryEncoder::default());
        capture.start().unwrap();
        capture.push(&Frame::new_black(1, 1), &[]).unwrap();
        capture.request_stop(StopReason::DurationElapsed);
        capture.push(&Frame::new_black(1, 1), &[]).unwrap();
        assert_eq!(capture.frames(), 1);
    }

    #[tokio::test]
    async fn test_no_fragments_is_empty_recording() {
        let mut capture = session(MemoryEncoder::silent());
        capture.start().unwrap();
        capture.push(&Frame::new_black(1, 1), &[]).unwrap();
        capture.request_stop(StopReason::ClipsFinished);

        let err = capture.finish(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyRecording);
    }

    #[tokio::test]
    async fn test_stop_before_first_frame_is_empty_recording() {
        let mut capture = session(MemoryEncoder::default());
        assert!(capture.request_stop(StopReason::DurationElapsed));

        let err = capture.finish(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyRecording);
        assert_eq!(capture.phase(), CapturePhase::Stopped);
    }

    #[tokio::test]
    async fn test_cancelled_stop_discards_data() {
        let mut capture = session(MemoryEncoder::default());
        capture.start().unwrap();
        capture.push(&Frame::new_black(1, 1), &[]).unwrap();
        capture.request_stop(StopReason::Cancelled);

        let err = capture.finish(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(capture.chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_error_stop_is_capture_fatal() {
        let mut capture = session(MemoryEncoder::default());
        capture.start().unwrap();
        capture.request_stop(StopReason::Error("clip 2 failed to play".to_string()));

        let err = capture.finish(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CaptureFatal);
        assert!(err.to_string().contains("clip 2 failed to play"));
    }
}
