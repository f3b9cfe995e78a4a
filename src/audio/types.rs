use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Decoded PCM audio with metadata
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples (interleaved for stereo, mono for single channel)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Duration in seconds
    pub duration: f64,

    /// Where the samples came from; empty for synthesized audio
    pub file_path: PathBuf,

    /// Audio format information
    pub format: AudioFormat,
}

impl AudioData {
    /// Build audio from interleaved samples, deriving the duration
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        Self {
            duration: frames as f64 / sample_rate.max(1) as f64,
            samples,
            sample_rate,
            channels,
            file_path: PathBuf::new(),
            format: AudioFormat::pcm(),
        }
    }

    /// Get sample at specific time (in seconds); silence outside the data
    pub fn sample_at_time(&self, time: f64, channel: usize) -> f32 {
        if time < 0.0 {
            return 0.0;
        }
        let sample_index = (time * self.sample_rate as f64) as usize;
        let actual_index = sample_index * self.channels as usize + channel;

        self.samples.get(actual_index).copied().unwrap_or(0.0)
    }

    /// Sample for an output channel, reusing the last source channel when
    /// the source has fewer channels (mono fans out to every output)
    pub fn sample_for_output(&self, time: f64, output_channel: usize) -> f32 {
        let channel = output_channel.min(self.channels.saturating_sub(1) as usize);
        self.sample_at_time(time, channel)
    }

    /// Peak absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

/// Audio file format information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFormat {
    /// File extension (wav, mp3, flac, etc.)
    pub extension: String,

    /// Bit depth (16, 24, 32, etc.)
    pub bit_depth: Option<u16>,

    /// Compression type (if any)
    pub compression: Option<String>,
}

impl AudioFormat {
    /// Uncompressed float PCM held in memory
    pub fn pcm() -> Self {
        Self {
            extension: "pcm".to_string(),
            bit_depth: Some(32),
            compression: None,
        }
    }
}
