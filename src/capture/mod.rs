//! # Capture Module
//!
//! Format negotiation, the encoder seam and the capture session that turns
//! composited frames into one raw container blob.

pub mod encoder;
pub mod format;
pub mod session;

pub use encoder::{CaptureBackend, CaptureEncoder, EncodeParams, FfmpegCaptureBackend};
pub use format::{negotiate, CaptureFormat, Container};
pub use session::{CapturePhase, CaptureSession, StopReason};
