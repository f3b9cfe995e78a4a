use image::imageops::FilterType;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::assets::AssetSource;
use crate::overlays::anchor::{Anchor, AnchorPoint, Offset};
use crate::overlays::painter::{FontSpec, TextPainter};
use crate::overlays::{Overlay, OverlayContext};
use crate::video::Frame;

/// Brand mark: an image, a line of text, or both at one anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<AssetSource>,
    #[serde(default)]
    pub position: Anchor,
    #[serde(default)]
    pub offset: Offset,
    #[serde(default)]
    pub font: FontSpec,
    #[serde(default = "default_unit")]
    pub image_opacity: f32,
    /// Scale factor applied to the image's natural size
    #[serde(default = "default_unit")]
    pub image_scale: f32,
}

fn default_unit() -> f32 {
    1.0
}

impl WatermarkSpec {
    pub fn text_content(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn wants_text(&self) -> bool {
        self.enabled && self.text_content().is_some()
    }

    pub fn wants_image(&self) -> bool {
        self.enabled && self.image.is_some() && self.image_opacity > 0.0 && self.image_scale > 0.0
    }

    pub fn is_visible(&self) -> bool {
        self.wants_text() || self.wants_image()
    }
}

/// Draws the watermark image first, then its text
pub struct WatermarkOverlay {
    spec: WatermarkSpec,
    image: Option<RgbaImage>,
    painter: Option<TextPainter>,
}

impl WatermarkOverlay {
    /// `image` is the decoded watermark at natural size; it is scaled here once
    pub fn new(spec: WatermarkSpec, image: Option<RgbaImage>, painter: Option<TextPainter>) -> Self {
        let image = image
            .filter(|_| spec.wants_image())
            .map(|img| scale_image(img, spec.image_scale));
        let painter = painter.filter(|_| spec.wants_text());
        Self { spec, image, painter }
    }

    /// Top-left corner of the scaled image on a frame of the given size
    pub fn image_origin(&self, width: u32, height: u32, padding: f64) -> Option<(f64, f64)> {
        let image = self.image.as_ref()?;
        Some(self.spec.position.image_origin(
            width,
            height,
            padding,
            self.spec.offset,
            image.width() as f64,
            image.height() as f64,
        ))
    }

    /// Text anchor on a frame of the given size
    pub fn text_anchor(&self, width: u32, height: u32, padding: f64) -> Option<AnchorPoint> {
        if !self.spec.wants_text() {
            return None;
        }
        Some(self.spec.position.resolve(width, height, padding, self.spec.offset))
    }

    fn draw_image(&self, frame: &mut Frame, padding: f64) {
        let (width, height) = frame.dimensions();
        let (Some(image), Some((x0, y0))) = (&self.image, self.image_origin(width, height, padding))
        else {
            return;
        };
        let (x0, y0) = (x0.round() as i64, y0.round() as i64);
        let opacity = self.spec.image_opacity.clamp(0.0, 1.0);

        for (x, y, pixel) in image.enumerate_pixels() {
            let alpha = pixel[3] as f32 / 255.0 * opacity;
            if alpha > 0.0 {
                frame.blend_pixel(
                    x0 + x as i64,
                    y0 + y as i64,
                    [pixel[0], pixel[1], pixel[2]],
                    alpha,
                );
            }
        }
    }
}

fn scale_image(image: RgbaImage, scale: f32) -> RgbaImage {
    if (scale - 1.0).abs() < f32::EPSILON {
        return image;
    }
    let width = ((image.width() as f32 * scale).round() as u32).max(1);
    let height = ((image.height() as f32 * scale).round() as u32).max(1);
    image::imageops::resize(&image, width, height, FilterType::Triangle)
}

impl Overlay for WatermarkOverlay {
    fn name(&self) -> &'static str {
        "watermark"
    }

    fn draw(&mut self, frame: &mut Frame, ctx: &OverlayContext) {
        if !self.spec.enabled {
            return;
        }
        self.draw_image(frame, ctx.padding);

        let (width, height) = frame.dimensions();
        if let Some(point) = self.text_anchor(width, height, ctx.padding) {
            if let (Some(painter), Some(text)) = (self.painter.as_mut(), self.spec.text_content()) {
                painter.draw(frame, text, point, &self.spec.font);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlays::anchor::{HAlign, VAlign};
    use image::Rgba;

    fn spec() -> WatermarkSpec {
        WatermarkSpec {
            enabled: true,
            text: None,
            image: Some(AssetSource::parse("logo.png")),
            position: Anchor::BottomRight,
            offset: Offset::default(),
            font: FontSpec::default(),
            image_opacity: 1.0,
            image_scale: 1.0,
        }
    }

    fn ctx() -> OverlayContext {
        OverlayContext { now: 0.0, padding: 16.0 }
    }

    #[test]
    fn test_image_drawn_with_corner_at_anchor() {
        let logo = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let mut overlay = WatermarkOverlay::new(spec(), Some(logo), None);
        let mut frame = Frame::new_black(100, 80);
        overlay.draw(&mut frame, &ctx());

        // Bottom-right corner of the logo sits at (100-16, 80-16)
        assert_eq!(frame.get_pixel(83, 63), [255, 0, 0]);
        assert_eq!(frame.get_pixel(74, 54), [255, 0, 0]);
        assert_eq!(frame.get_pixel(84, 64), [0, 0, 0]);
        assert_eq!(frame.get_pixel(73, 53), [0, 0, 0]);
    }

    #[test]
    fn test_image_scale_and_opacity() {
        let logo = RgbaImage::from_pixel(10, 10, Rgba([200, 200, 200, 255]));
        let overlay_spec = WatermarkSpec {
            position: Anchor::TopLeft,
            image_scale: 2.0,
            image_opacity: 0.5,
            ..spec()
        };
        let mut overlay = WatermarkOverlay::new(overlay_spec, Some(logo), None);
        let mut frame = Frame::new_black(100, 80);
        overlay.draw(&mut frame, &ctx());

        assert_eq!(overlay.image_origin(100, 80, 16.0), Some((16.0, 16.0)));
        assert_eq!(frame.get_pixel(16 + 19, 16 + 19), [100, 100, 100]);
        assert_eq!(frame.get_pixel(16 + 20, 16 + 20), [0, 0, 0]);
    }

    #[test]
    fn test_disabled_watermark_draws_nothing() {
        let logo = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let mut overlay =
            WatermarkOverlay::new(WatermarkSpec { enabled: false, ..spec() }, Some(logo), None);
        let mut frame = Frame::new_black(100, 80);
        overlay.draw(&mut frame, &ctx());
        assert!(frame.as_image().pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_empty_text_is_not_visible() {
        let text_only = WatermarkSpec { image: None, text: Some("  ".to_string()), ..spec() };
        assert!(!text_only.is_visible());
        let branded = WatermarkSpec { image: None, text: Some("Brand".to_string()), ..spec() };
        assert!(branded.is_visible());
    }

    #[test]
    fn test_brand_text_anchor_on_portrait_frame() {
        let brand = WatermarkSpec { image: None, text: Some("Brand".to_string()), ..spec() };
        let overlay = WatermarkOverlay::new(brand, None, None);

        let point = overlay.text_anchor(720, 1280, 16.0).unwrap();
        assert_eq!((point.x, point.y), (704.0, 1264.0));
        assert_eq!((point.h_align, point.v_align), (HAlign::Right, VAlign::Bottom));
    }
}
