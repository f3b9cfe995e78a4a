use serde::{Deserialize, Serialize};

use crate::overlays::anchor::{Anchor, AnchorPoint, Offset};
use crate::overlays::painter::{FontSpec, TextPainter};
use crate::overlays::{Overlay, OverlayContext};
use crate::video::Frame;

/// Static caption, optionally limited to a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlaySpec {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub text: String,
    #[serde(default = "default_position")]
    pub position: Anchor,
    #[serde(default)]
    pub offset: Offset,
    #[serde(default)]
    pub font: FontSpec,
    /// Visible from this time (seconds), inclusive
    #[serde(default)]
    pub start: Option<f64>,
    /// Hidden from this time (seconds)
    #[serde(default)]
    pub end: Option<f64>,
}

fn default_enabled() -> bool {
    true
}

fn default_position() -> Anchor {
    Anchor::TopCenter
}

impl TextOverlaySpec {
    /// Whether there is anything to draw at all
    pub fn is_visible(&self) -> bool {
        self.enabled && !self.text.trim().is_empty()
    }

    pub fn active_at(&self, now: f64) -> bool {
        self.start.map_or(true, |start| now >= start) && self.end.map_or(true, |end| now < end)
    }
}

pub struct TextOverlay {
    spec: TextOverlaySpec,
    painter: TextPainter,
}

impl TextOverlay {
    pub fn new(spec: TextOverlaySpec, painter: TextPainter) -> Self {
        Self { spec, painter }
    }

    /// Text anchor for a frame of the given size, or `None` outside the window
    pub fn placement(&self, width: u32, height: u32, ctx: &OverlayContext) -> Option<AnchorPoint> {
        if !self.spec.is_visible() || !self.spec.active_at(ctx.now) {
            return None;
        }
        Some(self.spec.position.resolve(width, height, ctx.padding, self.spec.offset))
    }
}

impl Overlay for TextOverlay {
    fn name(&self) -> &'static str {
        "text"
    }

    fn draw(&mut self, frame: &mut Frame, ctx: &OverlayContext) {
        let (width, height) = frame.dimensions();
        if let Some(point) = self.placement(width, height, ctx) {
            self.painter.draw(frame, self.spec.text.trim(), point, &self.spec.font);
        }
    }
}
