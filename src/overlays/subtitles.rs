//! Word-group subtitles timed evenly across the narration.

use serde::{Deserialize, Serialize};

use crate::overlays::anchor::{Anchor, AnchorPoint, Offset};
use crate::overlays::painter::{FontSpec, TextPainter};
use crate::overlays::{Overlay, OverlayContext};
use crate::video::Frame;

/// Subtitle request as written in a composition plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitlePlan {
    /// Narration script the tokens are cut from
    pub text: String,
    /// Overrides `subtitles.words_per_group` from the config
    #[serde(default)]
    pub words_per_group: Option<usize>,
    /// Overrides `subtitles.min_word_duration` from the config
    #[serde(default)]
    pub min_word_duration: Option<f64>,
    #[serde(default)]
    pub style: SubtitleStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub position: Anchor,
    pub offset: Offset,
    pub font: FontSpec,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            position: Anchor::BottomCenter,
            offset: Offset { x: 0.0, y: -48.0 },
            font: FontSpec {
                size: 48.0,
                outline_width: 3.0,
                ..FontSpec::default()
            },
        }
    }
}

/// Resolved subtitle timeline: one token active at a time
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleSpec {
    pub tokens: Vec<String>,
    pub per_token_duration: f64,
    pub style: SubtitleStyle,
}

/// Split on whitespace and join every `words_per_group` words into a token
pub fn tokenize(text: &str, words_per_group: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(words_per_group.max(1))
        .map(|group| group.join(" "))
        .collect()
}

impl SubtitleSpec {
    /// Build the timeline for `total_duration` seconds of audio
    ///
    /// Returns `None` when the text has no words.
    pub fn build(
        text: &str,
        words_per_group: usize,
        min_word_duration: f64,
        total_duration: f64,
        style: SubtitleStyle,
    ) -> Option<Self> {
        let tokens = tokenize(text, words_per_group);
        if tokens.is_empty() {
            return None;
        }
        let per_token_duration = min_word_duration.max(total_duration / tokens.len() as f64);
        Some(Self { tokens, per_token_duration, style })
    }

    /// Index of the token shown at `now`, clamped to the last token
    pub fn active_index(&self, now: f64) -> usize {
        if self.per_token_duration <= 0.0 {
            return 0;
        }
        let index = (now.max(0.0) / self.per_token_duration).floor() as usize;
        index.min(self.tokens.len().saturating_sub(1))
    }

    pub fn active_token(&self, now: f64) -> &str {
        self.tokens.get(self.active_index(now)).map(String::as_str).unwrap_or("")
    }

    /// Export the token timeline as SubRip
    pub fn to_srt(&self) -> String {
        let mut srt = String::new();
        for (i, token) in self.tokens.iter().enumerate() {
            let start = i as f64 * self.per_token_duration;
            let end = start + self.per_token_duration;
            srt.push_str(&format!(
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                format_srt_time(start),
                format_srt_time(end),
                token
            ));
        }
        srt
    }
}

/// Format seconds as SRT timestamp: HH:MM:SS,mmm
fn format_srt_time(secs: f64) -> String {
    let total_ms = (secs * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Draws the active subtitle token
pub struct SubtitleOverlay {
    spec: SubtitleSpec,
    painter: TextPainter,
}

impl SubtitleOverlay {
    pub fn new(spec: SubtitleSpec, painter: TextPainter) -> Self {
        Self { spec, painter }
    }

    pub fn spec(&self) -> &SubtitleSpec {
        &self.spec
    }

    /// Token and anchor for a frame of the given size at `now`
    pub fn placement(&self, width: u32, height: u32, ctx: &OverlayContext) -> (&str, AnchorPoint) {
        let style = &self.spec.style;
        let point = style.position.resolve(width, height, ctx.padding, style.offset);
        (self.spec.active_token(ctx.now), point)
    }
}

impl Overlay for SubtitleOverlay {
    fn name(&self) -> &'static str {
        "subtitles"
    }

    fn draw(&mut self, frame: &mut Frame, ctx: &OverlayContext) {
        let (width, height) = frame.dimensions();
        let (token, point) = self.placement(width, height, ctx);
        let token = token.to_string();
        self.painter.draw(frame, &token, point, &self.spec.style.font);
    }
}
