//! Clip scheduling as an explicit state machine.
//!
//! The scheduler owns no decoders. It is ticked with timeline time and
//! returns the transitions the engine must apply (prepare, advance, stop),
//! so the order of transitions can be tested without a media backend.

use tracing::{debug, info};

use crate::config::SchedulerConfig;

/// Shortest duration a clip is scheduled for
const MIN_CLIP_DURATION: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    NotStarted,
    Playing(usize),
    /// Advanced to the next clip on this tick
    Switching { from: usize, to: usize },
    /// Wrapped from the last clip back to the first on this tick
    Looping { from: usize, to: usize },
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerEvent {
    /// Playback begins with this clip
    Started(usize),
    /// Start buffering this clip ahead of its switch
    Preload(usize),
    /// The active clip changed at timeline time `at`
    Advanced { from: usize, to: usize, looped: bool, at: f64 },
    /// Every clip has played; capture should stop at `stop_at`
    Finished { stop_at: f64 },
}

pub struct SegmentScheduler {
    durations: Vec<f64>,
    loop_clips: bool,
    preload_lead: f64,
    end_buffer: f64,
    state: SchedulerState,
    active: usize,
    preloaded: Option<usize>,
    clip_started_at: f64,
    visits: Vec<usize>,
    stop_at: Option<f64>,
}

impl SegmentScheduler {
    /// `loop_clips` is set when narration may outlast the clips
    pub fn new(durations: Vec<f64>, loop_clips: bool, config: &SchedulerConfig) -> Self {
        let durations = durations.into_iter().map(|d| d.max(MIN_CLIP_DURATION)).collect();
        Self {
            durations,
            loop_clips,
            preload_lead: config.preload_lead,
            end_buffer: config.end_buffer,
            state: SchedulerState::NotStarted,
            active: 0,
            preloaded: None,
            clip_started_at: 0.0,
            visits: Vec::new(),
            stop_at: None,
        }
    }

    pub fn clip_count(&self) -> usize {
        self.durations.len()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// The clip drawn right now; always a valid index
    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn preloaded_index(&self) -> Option<usize> {
        self.preloaded
    }

    pub fn is_started(&self) -> bool {
        self.state != SchedulerState::NotStarted
    }

    pub fn is_finished(&self) -> bool {
        self.state == SchedulerState::Finished
    }

    /// Clip indices in the order they became active
    pub fn visits(&self) -> &[usize] {
        &self.visits
    }

    pub fn stop_at(&self) -> Option<f64> {
        self.stop_at
    }

    /// Time within the active clip at timeline time `t`
    pub fn clip_time(&self, t: f64) -> f64 {
        (t - self.clip_started_at).max(0.0)
    }

    pub fn start(&mut self, t: f64) -> Vec<SchedulerEvent> {
        if self.is_started() || self.durations.is_empty() {
            return Vec::new();
        }
        self.state = SchedulerState::Playing(0);
        self.active = 0;
        self.clip_started_at = t;
        self.visits.push(0);
        info!("▶️  Scheduler started with clip 1/{}", self.durations.len());
        vec![SchedulerEvent::Started(0)]
    }

    /// The clip that follows the active one, if any will
    fn next_index(&self) -> Option<usize> {
        if self.active + 1 < self.durations.len() {
            Some(self.active + 1)
        } else if self.loop_clips {
            Some(0)
        } else {
            None
        }
    }

    /// The next clip and the timeline time it takes over, while playing
    ///
    /// Lets callers split work that straddles a clip boundary at the exact
    /// switch point instead of the frame edge.
    pub fn upcoming_switch(&self) -> Option<(usize, f64)> {
        match self.state {
            SchedulerState::NotStarted | SchedulerState::Finished => None,
            _ => {
                let next = self.next_index()?;
                Some((next, self.clip_started_at + self.durations[self.active]))
            }
        }
    }

    /// Advance the machine to timeline time `t`
    pub fn tick(&mut self, t: f64) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        match self.state {
            SchedulerState::NotStarted | SchedulerState::Finished => return events,
            SchedulerState::Switching { to, .. } | SchedulerState::Looping { to, .. } => {
                self.state = SchedulerState::Playing(to);
            }
            SchedulerState::Playing(_) => {}
        }

        // Several clip ends can fall inside one tick when clips are shorter
        // than a frame; bound the walk by one lap.
        for _ in 0..=self.durations.len() {
            let duration = self.durations[self.active];
            let clip_time = t - self.clip_started_at;

            if let Some(next) = self.next_index() {
                if next != self.active
                    && self.preloaded != Some(next)
                    && duration - clip_time <= self.preload_lead
                {
                    self.preloaded = Some(next);
                    debug!(clip = next, "Preloading next clip");
                    events.push(SchedulerEvent::Preload(next));
                }
            }

            if clip_time < duration {
                break;
            }

            let from = self.active;
            let ended_at = self.clip_started_at + duration;
            match self.next_index() {
                Some(to) => {
                    let looped = to <= from;
                    self.active = to;
                    self.clip_started_at = ended_at;
                    self.visits.push(to);
                    if self.preloaded == Some(to) {
                        self.preloaded = None;
                    }
                    self.state = if looped {
                        SchedulerState::Looping { from, to }
                    } else {
                        SchedulerState::Switching { from, to }
                    };
                    debug!(from, to, looped, at = ended_at, "Clip advanced");
                    events.push(SchedulerEvent::Advanced { from, to, looped, at: ended_at });
                }
                None => {
                    let stop_at = ended_at + self.end_buffer;
                    self.state = SchedulerState::Finished;
                    self.stop_at = Some(stop_at);
                    info!("🏁 All clips played; stopping at {:.3}s", stop_at);
                    events.push(SchedulerEvent::Finished { stop_at });
                    break;
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPS: f64 = 30.0;

    fn run(scheduler: &mut SegmentScheduler, until: f64) -> Vec<SchedulerEvent> {
        let mut events = scheduler.start(0.0);
        let frames = (until * FPS).round() as usize;
        for frame in 0..=frames {
            events.extend(scheduler.tick(frame as f64 / FPS));
        }
        events
    }

    #[test]
    fn test_clips_loop_under_long_narration() {
        let mut scheduler =
            SegmentScheduler::new(vec![4.0, 6.0, 3.0], true, &SchedulerConfig::default());
        let events = run(&mut scheduler, 20.0);

        assert_eq!(scheduler.visits(), &[0, 1, 2, 0, 1]);
        assert!(events.contains(&SchedulerEvent::Advanced { from: 2, to: 0, looped: true, at: 13.0 }));
        assert!(!scheduler.is_finished());
        assert_eq!(scheduler.active_index(), 1);
    }

    #[test]
    fn test_each_clip_once_without_narration() {
        let mut scheduler = SegmentScheduler::new(vec![2.0, 1.0], false, &SchedulerConfig::default());
        let events = run(&mut scheduler, 4.0);

        assert_eq!(scheduler.visits(), &[0, 1]);
        assert!(scheduler.is_finished());
        let stop_at = scheduler.stop_at().unwrap();
        assert!((stop_at - 3.1).abs() < 1e-9);
        assert_eq!(
            events.iter().filter(|e| matches!(e, SchedulerEvent::Finished { .. })).count(),
            1
        );
    }

    #[test]
    fn test_preload_fires_once_in_lead_window() {
        let mut scheduler = SegmentScheduler::new(vec![1.0, 1.0], false, &SchedulerConfig::default());
        scheduler.start(0.0);
        assert!(scheduler.tick(0.7).is_empty());
        assert_eq!(scheduler.tick(0.76), vec![SchedulerEvent::Preload(1)]);
        assert!(scheduler.tick(0.8).is_empty());
        assert_eq!(scheduler.preloaded_index(), Some(1));
        // Preloading never changes the visible clip
        assert_eq!(scheduler.active_index(), 0);

        let events = scheduler.tick(1.0);
        assert_eq!(
            events,
            vec![SchedulerEvent::Advanced { from: 0, to: 1, looped: false, at: 1.0 }]
        );
        assert_eq!(scheduler.state(), SchedulerState::Switching { from: 0, to: 1 });
        scheduler.tick(1.01);
        assert_eq!(scheduler.state(), SchedulerState::Playing(1));
    }

    #[test]
    fn test_upcoming_switch_matches_the_advance() {
        let mut scheduler = SegmentScheduler::new(vec![1.05, 1.0], false, &SchedulerConfig::default());
        assert_eq!(scheduler.upcoming_switch(), None);
        scheduler.start(0.0);
        assert_eq!(scheduler.upcoming_switch(), Some((1, 1.05)));

        let events = scheduler.tick(1.1);
        assert!(events.contains(&SchedulerEvent::Advanced { from: 0, to: 1, looped: false, at: 1.05 }));
        // Last clip without looping: nothing follows
        assert_eq!(scheduler.upcoming_switch(), None);
    }

    #[test]
    fn test_exactly_one_active_clip_at_all_times() {
        let mut scheduler =
            SegmentScheduler::new(vec![0.5, 0.02, 0.7], true, &SchedulerConfig::default());
        scheduler.start(0.0);
        for frame in 0..300 {
            scheduler.tick(frame as f64 / FPS);
            assert!(scheduler.active_index() < scheduler.clip_count());
        }
        // The sub-frame clip is still visited in order
        assert_eq!(&scheduler.visits()[..4], &[0, 1, 2, 0]);
    }

    #[test]
    fn test_single_clip_loops_onto_itself() {
        let mut scheduler = SegmentScheduler::new(vec![1.0], true, &SchedulerConfig::default());
        let events = run(&mut scheduler, 2.5);
        assert_eq!(scheduler.visits(), &[0, 0, 0]);
        assert!(!events.iter().any(|e| matches!(e, SchedulerEvent::Preload(_))));
        assert!((scheduler.clip_time(2.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_tick_before_start_is_inert() {
        let mut scheduler = SegmentScheduler::new(vec![1.0], false, &SchedulerConfig::default());
        assert!(scheduler.tick(5.0).is_empty());
        assert_eq!(scheduler.state(), SchedulerState::NotStarted);
    }
}
