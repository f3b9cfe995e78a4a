//! Cutting one long video into a handful of short vertical clips.
//!
//! Each segment is an independent run of the composition pipeline over a
//! trimmed window of the source, timed by a synthetic silent master so the
//! source soundtrack passes through.
//!
//! Segment starts sit at fixed fractions of the source and are dropped when
//! they crowd an earlier start. Sources short enough to lose all but one
//! start are halved instead, so every source of two seconds or more still
//! yields at least two shorts.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::assets::AssetSource;
use crate::composition::engine::{CompositionEngine, Deliverable};
use crate::composition::plan::{ClipRef, CompositionPlan, OutputSize};
use crate::error::{AssetError, Result};
use crate::overlays::WatermarkSpec;
use crate::progress::ProgressReporter;

/// Where segments start, as fractions of the source duration
const START_FRACTIONS: [f64; 3] = [0.0, 0.35, 0.65];
/// Target length of each segment in seconds
const TARGET_DURATIONS: [f64; 3] = [30.0, 20.0, 15.0];
/// Starts closer than this to an earlier start are dropped
const MIN_START_GAP: f64 = 5.0;
const MIN_SEGMENT_DURATION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub duration: f64,
}

impl Segment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Non-overlapping segments for a source of `total` seconds
pub fn plan_segments(total: f64) -> Vec<Segment> {
    if !(total.is_finite() && total > 0.0) {
        return Vec::new();
    }

    let mut starts: Vec<f64> = Vec::with_capacity(START_FRACTIONS.len());
    for fraction in START_FRACTIONS {
        let start = total * fraction;
        if starts.iter().all(|kept| (start - kept).abs() >= MIN_START_GAP) {
            starts.push(start);
        }
    }

    if starts.len() < 2 && total >= 2.0 * MIN_SEGMENT_DURATION {
        let half = total / 2.0;
        return vec![Segment { start: 0.0, duration: half }, Segment { start: half, duration: half }];
    }

    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &start)| {
            let next = starts.get(i + 1).copied().unwrap_or(total);
            let duration = TARGET_DURATIONS[i].min(total - start).min(next - start);
            (duration >= MIN_SEGMENT_DURATION).then_some(Segment { start, duration })
        })
        .collect()
}

/// A shorts job over one source video
#[derive(Debug, Clone)]
pub struct ShortsRequest {
    pub video: AssetSource,
    /// Source duration; probed from the video when absent
    pub total_duration: Option<f64>,
    pub output: OutputSize,
    pub fps: Option<f64>,
    pub watermark: Option<WatermarkSpec>,
}

impl ShortsRequest {
    pub fn new(video: AssetSource) -> Self {
        Self {
            video,
            total_duration: None,
            output: OutputSize::default(),
            fps: None,
            watermark: None,
        }
    }

    /// Single-clip plan for one segment
    pub fn plan_for(&self, segment: Segment) -> CompositionPlan {
        let mut plan = CompositionPlan::new(vec![ClipRef::trimmed(
            self.video.clone(),
            segment.start,
            segment.duration,
        )]);
        plan.output = self.output;
        plan.fps = self.fps;
        plan.watermark = self.watermark.clone();
        plan
    }
}

#[derive(Debug, Clone)]
pub struct ShortClip {
    pub segment: Segment,
    pub deliverable: Deliverable,
}

/// Render every segment of `request` one after another
///
/// Runs share nothing but the engine's injected services. The first failing
/// segment fails the job.
pub async fn render_shorts(
    engine: &CompositionEngine,
    request: &ShortsRequest,
    progress: &mut ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Vec<ShortClip>> {
    progress.setup("planning shorts");
    let total = match request.total_duration {
        Some(total) => total,
        None => engine.probe_duration(&request.video, cancel).await?,
    };

    let segments = plan_segments(total);
    if segments.is_empty() {
        return Err(AssetError::InvalidReference {
            details: format!("{} is too short for shorts ({:.2}s)", request.video, total),
        }
        .into());
    }
    info!("✂️  Cutting {} short(s) from {:.1}s of {}", segments.len(), total, request.video);
    progress.assets_loaded();

    let mut shorts = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        progress.status(&format!("recording short {}/{}", index + 1, segments.len()));
        info!("   Short {}: {:.1}s from {:.1}s", index + 1, segment.duration, segment.start);

        let deliverable = engine
            .render(&request.plan_for(*segment), &mut ProgressReporter::silent(), cancel)
            .await?;
        shorts.push(ShortClip { segment: *segment, deliverable });

        let done = (index + 1) as f64 / segments.len() as f64;
        progress.rendering(done);
    }

    progress.finalizing();
    progress.done();
    Ok(shorts)
}
