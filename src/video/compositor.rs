use image::imageops::{self, FilterType};
use tracing::debug;

use crate::overlays::{Overlay, OverlayContext};
use crate::video::types::Frame;

/// Destination rectangle of a letterboxed source: `(x, y, width, height)`
pub fn fit_rect(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32, u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (0, 0, 0, 0);
    }
    let scale = (dst_w as f64 / src_w as f64).min(dst_h as f64 / src_h as f64);
    let width = ((src_w as f64 * scale).round() as u32).clamp(1, dst_w);
    let height = ((src_h as f64 * scale).round() as u32).clamp(1, dst_h);
    ((dst_w - width) / 2, (dst_h - height) / 2, width, height)
}

/// Scale `src` to fit `dst_w`x`dst_h` preserving aspect ratio, centred on black
pub fn letterbox(src: &Frame, dst_w: u32, dst_h: u32) -> Frame {
    let mut canvas = Frame::new_black(dst_w, dst_h);
    let (x, y, width, height) = fit_rect(src.width(), src.height(), dst_w, dst_h);
    if width == 0 || height == 0 {
        return canvas;
    }

    if (width, height) == src.dimensions() {
        imageops::replace(canvas.as_image_mut(), src.as_image(), x as i64, y as i64);
    } else {
        let scaled = imageops::resize(src.as_image(), width, height, FilterType::Triangle);
        imageops::replace(canvas.as_image_mut(), &scaled, x as i64, y as i64);
    }
    canvas
}

/// Per-tick frame composition: active clip, letterbox, overlays
///
/// Holds the last good letterboxed frame so a stalled source repeats its
/// previous picture instead of flashing black.
pub struct FrameCompositor {
    width: u32,
    height: u32,
    padding: f64,
    overlays: Vec<Box<dyn Overlay>>,
    surface: Frame,
    last_good: Option<Frame>,
    held_frames: u64,
}

impl FrameCompositor {
    pub fn new(width: u32, height: u32, padding: f64) -> Self {
        Self {
            width,
            height,
            padding,
            overlays: Vec::new(),
            surface: Frame::new_black(width, height),
            last_good: None,
            held_frames: 0,
        }
    }

    /// Append an overlay; overlays draw in insertion order
    pub fn push_overlay(&mut self, overlay: Box<dyn Overlay>) {
        debug!("Compositor overlay added: {}", overlay.name());
        self.overlays.push(overlay);
    }

    pub fn overlay_names(&self) -> Vec<&'static str> {
        self.overlays.iter().map(|o| o.name()).collect()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Ticks that reused the previous frame because no source frame was ready
    pub fn held_frames(&self) -> u64 {
        self.held_frames
    }

    /// Compose the output surface for timeline time `now`
    ///
    /// `source` is the active clip's frame, or `None` if it has nothing
    /// drawable yet.
    pub fn compose(&mut self, source: Option<&Frame>, now: f64) -> &Frame {
        match source {
            Some(frame) => {
                let base = letterbox(frame, self.width, self.height);
                self.surface.clone_from(&base);
                self.last_good = Some(base);
            }
            None => {
                self.held_frames += 1;
                match &self.last_good {
                    Some(previous) => self.surface.clone_from(previous),
                    None => self.surface.fill([0, 0, 0]),
                }
            }
        }

        let ctx = OverlayContext { now, padding: self.padding };
        for overlay in self.overlays.iter_mut() {
            overlay.draw(&mut self.surface, &ctx);
        }
        &self.surface
    }

    /// Drop the held frame
    pub fn release(&mut self) {
        self.last_good = None;
    }
}
