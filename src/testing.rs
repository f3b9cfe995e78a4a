//! Deterministic doubles for the media, capture and finalize seams.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::RgbaImage;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use crate::assets::{MediaBackend, OpenedVideo, RemoteFetcher};
use crate::audio::AudioData;
use crate::capture::{CaptureBackend, CaptureEncoder, CaptureFormat, Container, EncodeParams};
use crate::error::{AssetError, CompositorError, Result, VideoError};
use crate::finalize::Finalizer;
use crate::progress::ProgressSink;
use crate::video::{ClipWindow, Frame, VideoDecoder, VideoMetadata};

// ==========================================
// MEDIA
// ==========================================

/// A solid-colour clip served by [`SyntheticBackend`]
#[derive(Debug, Clone)]
pub struct SyntheticClip {
    pub duration: f64,
    pub color: [u8; 3],
    pub width: u32,
    pub height: u32,
    pub audio: Option<AudioData>,
    /// Never produces a drawable frame
    pub never_ready: bool,
    pub fail_prepare: bool,
    /// Clip-time span during which no frame is drawable
    pub stall: Option<(f64, f64)>,
}

impl SyntheticClip {
    pub fn solid(duration: f64, color: [u8; 3]) -> Self {
        Self {
            duration,
            color,
            width: 32,
            height: 18,
            audio: None,
            never_ready: false,
            fail_prepare: false,
            stall: None,
        }
    }

    pub fn sized(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_audio(mut self, audio: AudioData) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    pub fn failing_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    /// Stop producing frames between `from` and `to` seconds of clip time
    pub fn stalling(mut self, from: f64, to: f64) -> Self {
        self.stall = Some((from, to));
        self
    }
}

#[derive(Debug, Default)]
struct BackendCounters {
    opens: AtomicUsize,
    prepares: AtomicUsize,
    /// Decoders prepared and not yet released
    live: AtomicUsize,
}

/// In-memory media backend keyed by file name
///
/// Downloaded temp files are matched through their `{stem}-` prefix, which
/// is how [`FakeFetcher`] names them.
#[derive(Clone, Default)]
pub struct SyntheticBackend {
    clips: HashMap<String, SyntheticClip>,
    audio: HashMap<String, AudioData>,
    images: HashMap<String, RgbaImage>,
    failing: HashSet<String>,
    counters: Arc<BackendCounters>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clip(mut self, name: &str, clip: SyntheticClip) -> Self {
        self.clips.insert(name.to_string(), clip);
        self
    }

    pub fn with_audio(mut self, name: &str, audio: AudioData) -> Self {
        self.audio.insert(name.to_string(), audio);
        self
    }

    pub fn with_image(mut self, name: &str, image: RgbaImage) -> Self {
        self.images.insert(name.to_string(), image);
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Calls to any `open_*` method
    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn prepares(&self) -> usize {
        self.counters.prepares.load(Ordering::SeqCst)
    }

    pub fn live_decoders(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    fn key_for(&self, path: &Path, keys: impl Iterator<Item = String>) -> Option<String> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        keys.into_iter().find(|key| {
            let stem = key.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(key);
            name == *key || name.starts_with(&format!("{}-", stem))
        })
    }

    fn check_failing(&self, path: &Path) -> Result<()> {
        match self.key_for(path, self.failing.iter().cloned()) {
            Some(key) => Err(VideoError::DecodingFailed { reason: format!("{} is corrupt", key) }.into()),
            None => Ok(()),
        }
    }

    fn missing(path: &Path) -> CompositorError {
        AssetError::LoadFailed {
            source_ref: path.display().to_string(),
            reason: "unknown synthetic asset".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl MediaBackend for SyntheticBackend {
    async fn open_video(
        &self,
        path: &Path,
        window: Option<ClipWindow>,
        fps: f64,
        with_audio: bool,
    ) -> Result<OpenedVideo> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.check_failing(path)?;
        let key = self
            .key_for(path, self.clips.keys().cloned())
            .ok_or_else(|| Self::missing(path))?;
        let clip = self.clips[&key].clone();

        let duration = window.map_or(clip.duration, |w| w.clamp_duration(clip.duration));
        if duration <= 0.0 {
            return Err(VideoError::InvalidParameters { details: "empty window".to_string() }.into());
        }

        let metadata = VideoMetadata {
            duration: clip.duration,
            fps,
            width: clip.width,
            height: clip.height,
            codec: "synthetic".to_string(),
            has_audio: clip.audio.is_some(),
        };
        let audio = if with_audio { clip.audio.clone() } else { None };
        let decoder = SyntheticDecoder {
            frame: Frame::new_filled(clip.width, clip.height, clip.color),
            clip,
            duration,
            prepared: false,
            counters: self.counters.clone(),
        };
        Ok(OpenedVideo { decoder: Box::new(decoder), metadata, audio })
    }

    async fn open_audio(&self, path: &Path) -> Result<AudioData> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.check_failing(path)?;
        let key = self
            .key_for(path, self.audio.keys().cloned())
            .ok_or_else(|| Self::missing(path))?;
        Ok(self.audio[&key].clone())
    }

    async fn open_image(&self, path: &Path) -> Result<RgbaImage> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.check_failing(path)?;
        let key = self
            .key_for(path, self.images.keys().cloned())
            .ok_or_else(|| Self::missing(path))?;
        Ok(self.images[&key].clone())
    }
}

struct SyntheticDecoder {
    clip: SyntheticClip,
    frame: Frame,
    duration: f64,
    prepared: bool,
    counters: Arc<BackendCounters>,
}

impl VideoDecoder for SyntheticDecoder {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.clip.width, self.clip.height)
    }

    fn prepare(&mut self) -> Result<()> {
        if self.clip.fail_prepare {
            return Err(VideoError::DecodingFailed { reason: "synthetic prepare failure".to_string() }.into());
        }
        self.counters.prepares.fetch_add(1, Ordering::SeqCst);
        if !self.prepared {
            self.prepared = true;
            self.counters.live.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn frame_at(&mut self, clip_time: f64) -> Result<Option<&Frame>> {
        if !self.prepared {
            self.prepare()?;
        }
        if self.clip.never_ready {
            return Ok(None);
        }
        if self.clip.stall.is_some_and(|(from, to)| clip_time >= from && clip_time < to) {
            return Ok(None);
        }
        Ok(Some(&self.frame))
    }

    fn release(&mut self) {
        if self.prepared {
            self.prepared = false;
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Fetcher that writes a placeholder file instead of downloading
#[derive(Clone, Default)]
pub struct FakeFetcher {
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeFetcher {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteFetcher for FakeFetcher {
    async fn fetch(
        &self,
        url: &str,
        extension: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<NamedTempFile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(CompositorError::Cancelled);
        }
        if self.fail {
            return Err(AssetError::FetchFailed { url: url.to_string(), reason: "HTTP 404".to_string() }.into());
        }

        let name = url.split(['?', '#']).next().unwrap_or(url).rsplit('/').next().unwrap_or("asset");
        let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
        let suffix = extension.map(|ext| format!(".{}", ext)).unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}-", stem))
            .suffix(&suffix)
            .tempfile()?;
        file.write_all(b"synthetic")?;
        Ok(file)
    }
}

// ==========================================
// CAPTURE
// ==========================================

#[derive(Debug, Clone, Copy, Default)]
enum EncoderMode {
    #[default]
    Normal,
    Silent,
    FailAfter(u64),
}

/// Encoder that emits the first pixel of each frame as a fragment
#[derive(Debug, Default)]
pub struct MemoryEncoder {
    mode: EncoderMode,
    frames: u64,
    audio: Arc<Mutex<Vec<f32>>>,
    aborted: Arc<AtomicUsize>,
}

impl MemoryEncoder {
    /// Accepts frames but never produces data
    pub fn silent() -> Self {
        Self { mode: EncoderMode::Silent, ..Self::default() }
    }
}

#[async_trait]
impl CaptureEncoder for MemoryEncoder {
    fn push(&mut self, frame: &Frame, audio: &[f32]) -> Result<Vec<Vec<u8>>> {
        if let EncoderMode::FailAfter(limit) = self.mode {
            if self.frames >= limit {
                return Err(CompositorError::capture_fatal("encoder pipe closed"));
            }
        }
        self.frames += 1;
        self.audio.lock().unwrap().extend_from_slice(audio);
        match self.mode {
            EncoderMode::Silent => Ok(Vec::new()),
            _ => Ok(vec![frame.get_pixel(0, 0).to_vec()]),
        }
    }

    async fn finish(&mut self, cancel: &CancellationToken) -> Result<Vec<Vec<u8>>> {
        if cancel.is_cancelled() {
            return Err(CompositorError::Cancelled);
        }
        Ok(Vec::new())
    }

    fn abort(&mut self) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }
}

/// Capture backend handing out [`MemoryEncoder`]s
#[derive(Clone, Default)]
pub struct MemoryCaptureBackend {
    supported: Vec<CaptureFormat>,
    mode: EncoderMode,
    opens: Arc<AtomicUsize>,
    audio: Arc<Mutex<Vec<f32>>>,
    aborted: Arc<AtomicUsize>,
}

impl MemoryCaptureBackend {
    pub fn supporting(formats: Vec<CaptureFormat>) -> Self {
        Self { supported: formats, ..Self::default() }
    }

    /// Supports every default format
    pub fn all() -> Self {
        Self::supporting(CaptureFormat::default_preferences())
    }

    /// Only WebM, so the fallback format is negotiated
    pub fn webm_only() -> Self {
        Self::supporting(vec![CaptureFormat::webm_vp8_opus()])
    }

    pub fn silent() -> Self {
        Self { mode: EncoderMode::Silent, ..Self::all() }
    }

    pub fn failing_after(frames: u64) -> Self {
        Self { mode: EncoderMode::FailAfter(frames), ..Self::all() }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Interleaved samples pushed across every encoder
    pub fn audio_samples(&self) -> usize {
        self.audio.lock().unwrap().len()
    }

    /// Every interleaved sample pushed, in order
    pub fn recorded_audio(&self) -> Vec<f32> {
        self.audio.lock().unwrap().clone()
    }

    pub fn aborts(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureBackend for MemoryCaptureBackend {
    async fn supports(&self, format: &CaptureFormat) -> bool {
        self.supported.contains(format)
    }

    async fn open(
        &self,
        format: &CaptureFormat,
        _params: &EncodeParams,
    ) -> Result<Box<dyn CaptureEncoder>> {
        if !self.supported.contains(format) {
            return Err(CompositorError::capture_fatal(format!("{} not supported", format)));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryEncoder {
            mode: self.mode,
            frames: 0,
            audio: self.audio.clone(),
            aborted: self.aborted.clone(),
        }))
    }
}

// ==========================================
// FINALIZE & PROGRESS
// ==========================================

/// Finalizer with a fixed answer
#[derive(Clone)]
pub struct ScriptedFinalizer {
    result: std::result::Result<Vec<u8>, String>,
    init_calls: Arc<AtomicUsize>,
}

impl ScriptedFinalizer {
    pub fn succeeding(bytes: Vec<u8>) -> Self {
        Self { result: Ok(bytes), init_calls: Arc::default() }
    }

    pub fn failing(message: &str) -> Self {
        Self { result: Err(message.to_string()), init_calls: Arc::default() }
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Finalizer for ScriptedFinalizer {
    async fn init(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn normalize(
        &self,
        _raw: &[u8],
        _container: Container,
        _fps: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(CompositorError::Cancelled);
        }
        self.result.clone().map_err(CompositorError::generic)
    }
}

/// Sink that records everything it receives
#[derive(Clone, Default)]
pub struct RecordingSink {
    progress: Arc<Mutex<Vec<u8>>>,
    statuses: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn progress(&self) -> Vec<u8> {
        self.progress.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&mut self, percent: u8) {
        self.progress.lock().unwrap().push(percent);
    }

    fn on_status(&mut self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }
}

/// Constant mono audio at 1 kHz
pub fn tone(value: f32, seconds: f64) -> AudioData {
    AudioData::from_samples(vec![value; (seconds * 1000.0).round() as usize], 1000, 1)
}
