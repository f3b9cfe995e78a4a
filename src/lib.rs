//! # Reel-Compositor
//!
//! Composite narrated video reels from source clips, overlays and word-level subtitles.
//!
//! A render takes a declarative [`CompositionPlan`] (ordered clips, optional
//! narration, watermark, static text and subtitles), plays the clips against a
//! timeline clock, composites every tick onto an output surface and captures
//! frames plus mixed audio into a container that is finally normalised to
//! H.264/AAC MP4.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reel_compositor::{
//!     composition::{CompositionEngine, CompositionPlan},
//!     config::Config,
//!     progress::{LogSink, ProgressReporter},
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let engine = CompositionEngine::new(Config::default())?;
//! let plan = CompositionPlan::from_file("reel.toml")?;
//!
//! let mut progress = ProgressReporter::new(Box::new(LogSink));
//! let deliverable = engine.render(&plan, &mut progress, &CancellationToken::new()).await?;
//! deliverable.write_to("reel.mp4")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`assets`] - Loading clips, narration and images, local or remote
//! - [`audio`] - Audio decoding and the capture mix
//! - [`video`] - Frame decoding and composition
//! - [`overlays`] - Watermark, static text and subtitle drawing
//! - [`capture`] - Format negotiation and the capture session
//! - [`composition`] - Timeline clock, clip scheduler and the engine
//! - [`finalize`] - Normalising the capture to MP4
//! - [`config`] - Configuration management

pub mod assets;
pub mod audio;
pub mod capture;
pub mod composition;
pub mod config;
pub mod error;
pub mod finalize;
pub mod overlays;
pub mod progress;
pub mod video;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{CompositionEngine, CompositionPlan, Deliverable},
    config::Config,
    error::{CompositorError, ErrorKind, Result},
};
