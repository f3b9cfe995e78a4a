//! Nine-point anchor placement shared by every overlay.
//!
//! An anchor resolves to a base point at a fixed padding from the frame edge
//! (or the frame centre on that axis); the overlay offset is added after.
//! Text is aligned against that point, images are shifted so their matching
//! corner touches it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    #[default]
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Top,
    Middle,
    Bottom,
}

/// Pixel offset added to the anchor's base point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// Resolved text anchor: where to put the text and how to align it there
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPoint {
    pub x: f64,
    pub y: f64,
    pub h_align: HAlign,
    pub v_align: VAlign,
}

impl Anchor {
    pub fn alignment(self) -> (HAlign, VAlign) {
        use Anchor::*;
        let h = match self {
            TopLeft | CenterLeft | BottomLeft => HAlign::Left,
            TopCenter | Center | BottomCenter => HAlign::Center,
            TopRight | CenterRight | BottomRight => HAlign::Right,
        };
        let v = match self {
            TopLeft | TopCenter | TopRight => VAlign::Top,
            CenterLeft | Center | CenterRight => VAlign::Middle,
            BottomLeft | BottomCenter | BottomRight => VAlign::Bottom,
        };
        (h, v)
    }

    /// Base point plus offset, with the text alignment implied by the anchor
    pub fn resolve(self, width: u32, height: u32, padding: f64, offset: Offset) -> AnchorPoint {
        let (h_align, v_align) = self.alignment();
        let (w, h) = (width as f64, height as f64);

        let x = match h_align {
            HAlign::Left => padding,
            HAlign::Center => w / 2.0,
            HAlign::Right => w - padding,
        };
        let y = match v_align {
            VAlign::Top => padding,
            VAlign::Middle => h / 2.0,
            VAlign::Bottom => h - padding,
        };

        AnchorPoint {
            x: x + offset.x,
            y: y + offset.y,
            h_align,
            v_align,
        }
    }

    /// Top-left origin for an image of `image_w`x`image_h` placed at this anchor
    pub fn image_origin(
        self,
        width: u32,
        height: u32,
        padding: f64,
        offset: Offset,
        image_w: f64,
        image_h: f64,
    ) -> (f64, f64) {
        let point = self.resolve(width, height, padding, offset);
        (
            align_start(point.x, image_w, point.h_align),
            align_start_v(point.y, image_h, point.v_align),
        )
    }
}

/// Left edge of a span of `extent` aligned at `x`
pub fn align_start(x: f64, extent: f64, align: HAlign) -> f64 {
    match align {
        HAlign::Left => x,
        HAlign::Center => x - extent / 2.0,
        HAlign::Right => x - extent,
    }
}

/// Top edge of a span of `extent` aligned at `y`
pub fn align_start_v(y: f64, extent: f64, align: VAlign) -> f64 {
    match align {
        VAlign::Top => y,
        VAlign::Middle => y - extent / 2.0,
        VAlign::Bottom => y - extent,
    }
}
