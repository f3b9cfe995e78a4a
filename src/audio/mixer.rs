//! The per-run audio graph.
//!
//! One master track (narration, or synthetic silence of the computed total
//! duration) plus optional per-clip tracks. Clip tracks are gated by the
//! scheduler: either a hard cut to the active clip, or a linear gain ramp
//! from the outgoing to the incoming clip.

use tracing::debug;

use crate::audio::types::AudioData;

/// The track that defines the timeline length
#[derive(Debug, Clone)]
pub enum MasterTrack {
    Narration(AudioData),
    /// Zero-gain placeholder that keeps an audio track alive in the capture
    Silence { duration: f64 },
}

impl MasterTrack {
    pub fn duration(&self) -> f64 {
        match self {
            MasterTrack::Narration(audio) => audio.duration,
            MasterTrack::Silence { duration } => *duration,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, MasterTrack::Silence { .. })
    }
}

/// How per-clip audio participates in the mix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixPolicy {
    /// Whether clip audio is heard at all
    pub clip_audio_audible: bool,
    /// Ramp length between clips in seconds; zero means a hard cut
    pub crossfade: f64,
}

impl MixPolicy {
    /// Clip audio is heard when explicitly mixed or when there is no
    /// narration to carry the soundtrack; cross-fades only when mixing.
    pub fn for_plan(mix_original_audio: bool, has_narration: bool, crossfade: f64) -> Self {
        Self {
            clip_audio_audible: mix_original_audio || !has_narration,
            crossfade: if mix_original_audio { crossfade } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Fade {
    from: usize,
    to: usize,
    started_at: f64,
}

/// Mixes master and clip audio into the capture's interleaved stream
pub struct AudioMixer {
    sample_rate: u32,
    channels: u16,
    master: MasterTrack,
    clips: Vec<Option<AudioData>>,
    clip_started_at: Vec<f64>,
    policy: MixPolicy,
    active: Option<usize>,
    fade: Option<Fade>,
    rendered_frames: u64,
    released: bool,
}

impl AudioMixer {
    pub fn new(
        master: MasterTrack,
        clips: Vec<Option<AudioData>>,
        policy: MixPolicy,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        let clip_count = clips.len();
        Self {
            sample_rate,
            channels,
            master,
            clips,
            clip_started_at: vec![0.0; clip_count],
            policy,
            active: None,
            fade: None,
            rendered_frames: 0,
            released: false,
        }
    }

    pub fn master(&self) -> &MasterTrack {
        &self.master
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Make `index` the audible clip from timeline time `at`
    ///
    /// Repeating the switch that is already in effect changes nothing, so a
    /// switch applied mid-tick survives the scheduler event that follows it.
    pub fn activate(&mut self, index: usize, at: f64) {
        if index >= self.clip_started_at.len() {
            return;
        }
        if self.active == Some(index) && self.clip_started_at[index] == at {
            return;
        }
        self.clip_started_at[index] = at;

        match self.active {
            Some(previous) if previous != index && self.policy.crossfade > 0.0 => {
                self.fade = Some(Fade { from: previous, to: index, started_at: at });
            }
            _ => self.fade = None,
        }
        self.active = Some(index);
        debug!(clip = index, at, "Audio switched");
    }

    /// Gain applied to clip `index` at timeline time `t`
    pub fn clip_gain(&self, index: usize, t: f64) -> f32 {
        if !self.policy.clip_audio_audible {
            return 0.0;
        }
        if let Some(fade) = self.fade {
            let progress = ((t - fade.started_at) / self.policy.crossfade).clamp(0.0, 1.0) as f32;
            if progress < 1.0 {
                if index == fade.to {
                    return progress;
                }
                if index == fade.from {
                    return 1.0 - progress;
                }
                return 0.0;
            }
        }
        if self.active == Some(index) {
            1.0
        } else {
            0.0
        }
    }

    /// Render interleaved samples from the last rendered point up to `until`
    pub fn render_until(&mut self, until: f64) -> Vec<f32> {
        if self.released {
            return Vec::new();
        }
        let target = (until.max(0.0) * self.sample_rate as f64).floor() as u64;
        if target <= self.rendered_frames {
            return Vec::new();
        }

        let channels = self.channels as usize;
        let mut out = Vec::with_capacity((target - self.rendered_frames) as usize * channels);
        for frame in self.rendered_frames..target {
            let t = frame as f64 / self.sample_rate as f64;
            for ch in 0..channels {
                out.push(self.mix_sample(t, ch));
            }
        }
        self.rendered_frames = target;
        out
    }

    fn mix_sample(&self, t: f64, channel: usize) -> f32 {
        let mut value = match &self.master {
            MasterTrack::Narration(audio) => audio.sample_for_output(t, channel),
            MasterTrack::Silence { .. } => 0.0,
        };

        for (index, clip) in self.clips.iter().enumerate() {
            let Some(clip) = clip else { continue };
            let gain = self.clip_gain(index, t);
            if gain > 0.0 {
                value += gain * clip.sample_for_output(t - self.clip_started_at[index], channel);
            }
        }
        value.clamp(-1.0, 1.0)
    }

    /// Drop every buffer held by the graph
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.clips.clear();
        self.clip_started_at.clear();
        if let MasterTrack::Narration(audio) = &mut self.master {
            audio.samples = Vec::new();
        }
        debug!("Audio graph released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f32, seconds: f64) -> AudioData {
        AudioData::from_samples(vec![value; (seconds * 100.0) as usize], 100, 1)
    }

    #[test]
    fn test_policy_decision() {
        let mixed = MixPolicy::for_plan(true, true, 0.12);
        assert!(mixed.clip_audio_audible);
        assert_eq!(mixed.crossfade, 0.12);

        let narrated = MixPolicy::for_plan(false, true, 0.12);
        assert!(!narrated.clip_audio_audible);

        let silent_master = MixPolicy::for_plan(false, false, 0.12);
        assert!(silent_master.clip_audio_audible);
        assert_eq!(silent_master.crossfade, 0.0);
    }

    #[test]
    fn test_hard_cut_only_active_clip_audible() {
        let mut mixer = AudioMixer::new(
            MasterTrack::Silence { duration: 2.0 },
            vec![Some(constant(0.2, 2.0)), Some(constant(0.4, 2.0))],
            MixPolicy { clip_audio_audible: true, crossfade: 0.0 },
            100,
            1,
        );
        mixer.activate(0, 0.0);
        let first = mixer.render_until(0.5);
        assert_eq!(first.len(), 50);
        assert!(first.iter().all(|s| (*s - 0.2).abs() < 1e-6));

        mixer.activate(1, 0.5);
        assert_eq!(mixer.clip_gain(0, 0.5), 0.0);
        assert_eq!(mixer.clip_gain(1, 0.5), 1.0);
        let second = mixer.render_until(1.0);
        assert!(second.iter().all(|s| (*s - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_crossfade_moves_weight() {
        let mut mixer = AudioMixer::new(
            MasterTrack::Silence { duration: 2.0 },
            vec![Some(constant(0.5, 2.0)), Some(constant(0.5, 2.0))],
            MixPolicy { clip_audio_audible: true, crossfade: 0.12 },
            100,
            1,
        );
        mixer.activate(0, 0.0);
        mixer.activate(1, 1.0);

        assert!((mixer.clip_gain(0, 1.06) - 0.5).abs() < 1e-3);
        assert!((mixer.clip_gain(1, 1.06) - 0.5).abs() < 1e-3);
        assert_eq!(mixer.clip_gain(0, 1.2), 0.0);
        assert_eq!(mixer.clip_gain(1, 1.2), 1.0);
    }

    #[test]
    fn test_repeated_switch_keeps_the_fade() {
        let mut mixer = AudioMixer::new(
            MasterTrack::Silence { duration: 2.0 },
            vec![Some(constant(0.5, 2.0)), Some(constant(0.5, 2.0))],
            MixPolicy { clip_audio_audible: true, crossfade: 0.12 },
            100,
            1,
        );
        mixer.activate(0, 0.0);
        mixer.activate(1, 1.0);
        mixer.activate(1, 1.0);
        assert!((mixer.clip_gain(0, 1.06) - 0.5).abs() < 1e-3);
        assert!((mixer.clip_gain(1, 1.06) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_narration_master_is_muted_clip_free() {
        let mut mixer = AudioMixer::new(
            MasterTrack::Narration(constant(0.3, 1.0)),
            vec![Some(constant(0.9, 1.0))],
            MixPolicy::for_plan(false, true, 0.12),
            100,
            2,
        );
        mixer.activate(0, 0.0);
        let samples = mixer.render_until(0.1);
        assert_eq!(samples.len(), 20);
        assert!(samples.iter().all(|s| (*s - 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_render_is_incremental_and_release_stops_output() {
        let mut mixer = AudioMixer::new(
            MasterTrack::Silence { duration: 1.0 },
            Vec::new(),
            MixPolicy::for_plan(false, false, 0.12),
            100,
            2,
        );
        assert_eq!(mixer.render_until(0.25).len(), 50);
        assert!(mixer.render_until(0.25).is_empty());
        assert_eq!(mixer.render_until(0.5).len(), 50);

        mixer.release();
        mixer.release();
        assert!(mixer.is_released());
        assert!(mixer.render_until(1.0).is_empty());
    }
}
