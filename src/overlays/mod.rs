//! # Overlay Rendering
//!
//! Watermark, caption and subtitle painters drawn onto the composited frame.
//! Overlays are synchronous and run inside the compositor tick; each one is
//! a no-op unless its spec is enabled and has something to show.

pub mod anchor;
pub mod painter;
pub mod subtitles;
pub mod text;
pub mod watermark;

pub use anchor::{Anchor, AnchorPoint, HAlign, Offset, VAlign};
pub use painter::{Color, FontSpec, TextPainter};
pub use subtitles::{SubtitleOverlay, SubtitlePlan, SubtitleSpec, SubtitleStyle};
pub use text::{TextOverlay, TextOverlaySpec};
pub use watermark::{WatermarkOverlay, WatermarkSpec};

use crate::video::Frame;

/// Per-tick inputs shared by every overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayContext {
    /// Timeline time from the run's clock
    pub now: f64,
    /// Edge padding for anchored placement
    pub padding: f64,
}

/// A painter invoked once per composited frame
pub trait Overlay: Send {
    fn name(&self) -> &'static str;

    fn draw(&mut self, frame: &mut Frame, ctx: &OverlayContext);
}
