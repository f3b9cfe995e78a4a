//! The run's single source of elapsed time.
//!
//! Time reads 0 until `start()` is called at the first drawable frame. In
//! offline mode time is the tick count divided by the frame rate, so frame
//! boundaries land exactly on whole-second durations; in realtime mode it
//! follows the wall clock. Either way successive reads never decrease.

use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::ClockMode;
use crate::error::{CompositorError, Result};

/// Floor applied to narration length
const MIN_AUDIO_DURATION: f64 = 0.001;
/// Floor applied to the clip-sum length when there is no narration
const MIN_SYNTHETIC_DURATION: f64 = 0.1;

/// What drives the timeline length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterSource {
    Audio,
    SyntheticSilence,
}

#[derive(Debug)]
pub struct TimelineClock {
    mode: ClockMode,
    master: Option<MasterSource>,
    total: Option<f64>,
    started_at: Option<Instant>,
    fps: f64,
    ticks: u64,
    current: f64,
}

impl TimelineClock {
    /// `fps` sets the offline tick length; it must be positive
    pub fn new(mode: ClockMode, fps: f64) -> Self {
        Self {
            mode,
            master: None,
            total: None,
            started_at: None,
            fps,
            ticks: 0,
            current: 0.0,
        }
    }

    /// Fix the total duration from the master audio, or from the clips
    ///
    /// Can only be called once per run.
    pub fn arm(&mut self, audio_duration: Option<f64>, clip_durations: &[f64]) -> Result<f64> {
        if self.total.is_some() {
            return Err(CompositorError::generic("Timeline clock is already armed"));
        }

        let (master, total) = match audio_duration {
            Some(duration) => (MasterSource::Audio, duration.max(MIN_AUDIO_DURATION)),
            None => {
                let sum: f64 = clip_durations.iter().sum();
                (MasterSource::SyntheticSilence, sum.max(MIN_SYNTHETIC_DURATION))
            }
        };

        self.master = Some(master);
        self.total = Some(total);
        info!("⏱️  Timeline armed: {:.3}s ({:?})", total, master);
        Ok(total)
    }

    pub fn master(&self) -> Option<MasterSource> {
        self.master
    }

    pub fn total_duration(&self) -> f64 {
        self.total.unwrap_or(0.0)
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Begin counting; later calls are ignored
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
            debug!("Timeline clock started");
        }
    }

    /// Step offline time by one frame; no-op before start or in realtime mode
    pub fn advance(&mut self) {
        if self.mode == ClockMode::Offline && self.is_started() {
            self.ticks += 1;
        }
    }

    /// Frames stepped since start (offline mode)
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Elapsed timeline time in seconds
    pub fn now(&mut self) -> f64 {
        let sample = match (self.started_at, self.mode) {
            (None, _) => 0.0,
            (Some(_), ClockMode::Offline) => self.ticks as f64 / self.fps,
            (Some(started), ClockMode::Realtime) => started.elapsed().as_secs_f64(),
        };
        self.current = self.current.max(sample);
        self.current
    }

    /// Whether the total duration plus `guard` has passed
    pub fn is_elapsed(&mut self, guard: f64) -> bool {
        let Some(total) = self.total else {
            return false;
        };
        self.now() >= total + guard
    }
}
