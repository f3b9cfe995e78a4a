use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use fontdue::layout::{CoordinateSystem, GlyphRasterConfig, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AssetError, Result};
use crate::overlays::anchor::{align_start, align_start_v, AnchorPoint};
use crate::video::Frame;

/// Fonts tried when a style names neither a font file nor a configured default
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// RGB colour written as `#rrggbb` (or `#rgb`) in plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 3]);

impl Color {
    pub const WHITE: Color = Color([255, 255, 255]);
    pub const BLACK: Color = Color([0, 0, 0]);

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "white" => return Some(Self::WHITE),
            "black" => return Some(Self::BLACK),
            _ => {}
        }
        let hex = value.trim().strip_prefix('#')?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
        Some(Color([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Color::parse(&value).ok_or_else(|| format!("invalid colour '{}'", value))
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{:02x}{:02x}{:02x}", r, g, b)
    }
}

/// Font and stroke settings for a piece of overlay text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSpec {
    /// Font family name or path to a TTF/OTF file
    pub family: String,
    pub size: f32,
    pub color: Color,
    pub outline: Option<Color>,
    pub outline_width: f32,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: "sans-serif".to_string(),
            size: 32.0,
            color: Color::WHITE,
            outline: Some(Color::BLACK),
            outline_width: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

/// Rasterises text onto frames with `fontdue`
pub struct TextPainter {
    font: Font,
    glyph_cache: HashMap<GlyphRasterConfig, GlyphBitmap>,
}

impl TextPainter {
    pub fn from_bytes(bytes: Vec<u8>, label: &str) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|e| {
            AssetError::LoadFailed { source_ref: label.to_string(), reason: e.to_string() }
        })?;
        Ok(Self { font, glyph_cache: HashMap::new() })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| AssetError::LoadFailed {
            source_ref: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(bytes, &path.display().to_string())
    }

    /// Pick a font for `family`: the family itself if it is a font file, then
    /// the configured default, then well-known system fonts
    pub fn resolve(family: &str, default_font: Option<&Path>) -> Result<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        let family_path = Path::new(family);
        if family_path.extension().is_some() {
            candidates.push(family_path.to_path_buf());
        }
        candidates.extend(default_font.map(Path::to_path_buf));
        candidates.extend(SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from));

        for candidate in candidates.iter().filter(|p| p.is_file()) {
            match Self::load(candidate) {
                Ok(painter) => {
                    debug!("Using font {} for '{}'", candidate.display(), family);
                    return Ok(painter);
                }
                Err(e) => debug!("Skipping font {}: {}", candidate.display(), e),
            }
        }

        Err(AssetError::LoadFailed {
            source_ref: family.to_string(),
            reason: "no usable font file found; set overlay.default_font".to_string(),
        }
        .into())
    }

    /// Width and line height of `text` at `size`
    pub fn measure(&self, text: &str, size: f32) -> (f32, f32) {
        let width = text.chars().map(|c| self.font.metrics(c, size).advance_width).sum();
        let height = self
            .font
            .horizontal_line_metrics(size)
            .map(|m| m.new_line_size)
            .unwrap_or(size * 1.2);
        (width, height)
    }

    /// Draw `text` aligned at `point`, outline first when configured
    pub fn draw(&mut self, frame: &mut Frame, text: &str, point: AnchorPoint, style: &FontSpec) {
        if text.is_empty() || style.size <= 0.0 {
            return;
        }
        let (width, height) = self.measure(text, style.size);
        let left = align_start(point.x, width as f64, point.h_align) as f32;
        let top = align_start_v(point.y, height as f64, point.v_align) as f32;

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings { x: left, y: top, ..LayoutSettings::default() });
        layout.append(&[&self.font], &TextStyle::new(text, style.size, 0));

        let glyphs: Vec<(i64, i64, GlyphRasterConfig)> = layout
            .glyphs()
            .iter()
            .filter(|g| g.width > 0 && g.height > 0)
            .map(|g| (g.x.round() as i64, g.y.round() as i64, g.key))
            .collect();

        for &(_, _, key) in &glyphs {
            if !self.glyph_cache.contains_key(&key) {
                let (metrics, bitmap) = self.font.rasterize_config(key);
                self.glyph_cache.insert(
                    key,
                    GlyphBitmap { width: metrics.width, height: metrics.height, bitmap },
                );
            }
        }

        if let Some(outline) = style.outline.filter(|_| style.outline_width > 0.0) {
            let radius = style.outline_width.ceil() as i64;
            let limit = style.outline_width * style.outline_width;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if (dx == 0 && dy == 0) || (dx * dx + dy * dy) as f32 > limit {
                        continue;
                    }
                    for &(x, y, key) in &glyphs {
                        if let Some(glyph) = self.glyph_cache.get(&key) {
                            blend_glyph(frame, x + dx, y + dy, glyph, outline.0);
                        }
                    }
                }
            }
        }

        for &(x, y, key) in &glyphs {
            if let Some(glyph) = self.glyph_cache.get(&key) {
                blend_glyph(frame, x, y, glyph, style.color.0);
            }
        }
    }
}

fn blend_glyph(frame: &mut Frame, x: i64, y: i64, glyph: &GlyphBitmap, color: [u8; 3]) {
    for row in 0..glyph.height {
        for col in 0..glyph.width {
            let coverage = glyph.bitmap[row * glyph.width + col];
            if coverage > 0 {
                frame.blend_pixel(x + col as i64, y + row as i64, color, coverage as f32 / 255.0);
            }
        }
    }
}
