//! # Video Module
//!
//! Probing, frame decoding and per-tick composition of source clips.

pub mod compositor;
pub mod decoder;
pub mod probe;
pub mod types;

pub use compositor::{fit_rect, letterbox, FrameCompositor};
pub use decoder::{ClipWindow, FfmpegDecoder, VideoDecoder};
pub use probe::probe_video;
pub use types::{Frame, VideoMetadata};
