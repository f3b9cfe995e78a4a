use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    assets::{
        AssetSource, FfmpegMediaBackend, HttpFetcher, MediaAssetLoader, MediaBackend, ReleaseLedger,
        RemoteFetcher, TempRef, VideoAsset,
    },
    audio::{AudioData, AudioMixer, MasterTrack, MixPolicy},
    capture::{
        negotiate, CaptureBackend, CaptureFormat, CaptureSession, Container, EncodeParams,
        FfmpegCaptureBackend, StopReason,
    },
    composition::{
        clock::{MasterSource, TimelineClock},
        plan::{ClipRef, CompositionPlan},
        scheduler::{SchedulerEvent, SegmentScheduler},
    },
    config::{ClockMode, Config},
    error::{CompositorError, Result},
    finalize::{finalize_or_degrade, FfmpegFinalizer, FinalizeOutcome, Finalizer},
    overlays::{Overlay, SubtitleOverlay, SubtitleSpec, TextOverlay, TextPainter, WatermarkOverlay},
    progress::ProgressReporter,
    video::{FrameCompositor, VideoDecoder},
};

/// How long the first clip may take to produce a drawable frame
const FIRST_FRAME_TIMEOUT: f64 = 5.0;

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The output of one successful run
#[derive(Debug, Clone)]
pub struct Deliverable {
    pub bytes: Vec<u8>,
    /// Container of `bytes`; MP4 unless finalize degraded
    pub container: Container,
    /// What the capture itself negotiated
    pub capture_format: CaptureFormat,
    pub outcome: FinalizeOutcome,
    /// Seconds of timeline captured
    pub duration: f64,
    pub frames: u64,
    /// Clip indices in the order they became active
    pub visits: Vec<usize>,
    pub stop_reason: StopReason,
    /// Subtitle timeline that was burned in, if any
    pub subtitles: Option<SubtitleSpec>,
}

impl Deliverable {
    pub fn mime_type(&self) -> &'static str {
        self.container.mime_type()
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

/// Main composition engine that drives one render per call
///
/// Each run follows the same pipeline:
/// 1. Validation & Format Negotiation - fail fast before touching assets
/// 2. Asset Loading - clips, narration and watermark image
/// 3. Assembly - clock, overlays, audio graph, scheduler, capture
/// 4. Playback - tick until narration ends or every clip has played
/// 5. Finalize - normalise the capture, degrading to the raw blob
///
/// The media, fetch, capture and finalize services are injected so a run
/// can be driven entirely by test doubles.
pub struct CompositionEngine {
    config: Config,
    media: Arc<dyn MediaBackend>,
    fetcher: Arc<dyn RemoteFetcher>,
    capture: Arc<dyn CaptureBackend>,
    finalizer: Arc<dyn Finalizer>,
    ledger: ReleaseLedger,
}

impl CompositionEngine {
    /// Engine backed by the ffmpeg binaries named in the config
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let media = Arc::new(FfmpegMediaBackend::new(
            &config.capture.ffmpeg_path,
            &config.capture.ffprobe_path,
            config.output.sample_rate,
            config.output.channels,
        ));
        let fetcher = Arc::new(HttpFetcher::new()?);
        let capture = Arc::new(FfmpegCaptureBackend::new(&config.capture.ffmpeg_path));
        let finalizer = Arc::new(FfmpegFinalizer::new(&config.capture.ffmpeg_path));
        Ok(Self::with_backends(config, media, fetcher, capture, finalizer))
    }

    pub fn with_backends(
        config: Config,
        media: Arc<dyn MediaBackend>,
        fetcher: Arc<dyn RemoteFetcher>,
        capture: Arc<dyn CaptureBackend>,
        finalizer: Arc<dyn Finalizer>,
    ) -> Self {
        Self {
            config,
            media,
            fetcher,
            capture,
            finalizer,
            ledger: ReleaseLedger::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Temporary references handed out across every run of this engine
    pub fn ledger(&self) -> &ReleaseLedger {
        &self.ledger
    }

    pub fn capture_backend(&self) -> &dyn CaptureBackend {
        self.capture.as_ref()
    }

    /// Playable duration of a video source; the asset is released again
    pub async fn probe_duration(&self, source: &AssetSource, cancel: &CancellationToken) -> Result<f64> {
        let loader = MediaAssetLoader::new(self.media.clone(), self.fetcher.clone(), self.ledger.clone());
        let clip = ClipRef::new(source.clone());
        let VideoAsset { mut decoder, temp, .. } =
            loader.load_video(&clip, self.config.output.fps, false, cancel).await?;
        let duration = decoder.duration();
        decoder.release();
        if let Some(temp) = temp {
            temp.release();
        }
        Ok(duration)
    }

    /// Render `plan` into a deliverable
    ///
    /// Every resource the run acquires is released before this returns,
    /// whatever the outcome.
    pub async fn render(
        &self,
        plan: &CompositionPlan,
        progress: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Deliverable> {
        let run_id = format!(
            "{}-{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            RUN_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        self.render_run(plan, progress, cancel)
            .instrument(info_span!("render", run = %run_id))
            .await
    }

    async fn render_run(
        &self,
        plan: &CompositionPlan,
        progress: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Deliverable> {
        info!("🎬 Starting render");
        info!("   Clips: {}", plan.clips.len());
        info!("   Narration: {}", plan.audio.as_ref().map_or("none".to_string(), ToString::to_string));
        progress.setup("preparing composition");
        // Engines built through `with_backends` skip the check in `new`
        self.config.validate()?;

        // Pipeline Step 1: Validation & Format Negotiation
        let format = self.negotiate_format(plan).await?;
        let fps = plan.fps.unwrap_or(self.config.output.fps);

        // Pipeline Steps 2-4 hold every per-run resource; the run is stopped
        // on every path out of them
        let mut run = RenderRun::default();
        let captured = self.capture_run(plan, &format, fps, &mut run, progress, cancel).await;
        run.stop();
        let (raw, report) = captured?;

        // Pipeline Step 5: Finalize
        info!("✨ Step 5: Finalizing {} bytes of {}...", raw.len(), format.container);
        progress.finalizing();
        let (bytes, container, outcome) =
            finalize_or_degrade(self.finalizer.as_ref(), raw, format.container, fps, cancel).await?;
        progress.done();

        info!("🎉 Render complete: {:.2}s, {} frames, {} ({})", report.duration, report.frames, container, report.stop_reason);
        Ok(Deliverable {
            bytes,
            container,
            capture_format: format,
            outcome,
            duration: report.duration,
            frames: report.frames,
            visits: report.visits,
            stop_reason: report.stop_reason,
            subtitles: report.subtitles,
        })
    }

    // ==========================================
    // PIPELINE STEP 1: VALIDATION & NEGOTIATION
    // ==========================================

    async fn negotiate_format(&self, plan: &CompositionPlan) -> Result<CaptureFormat> {
        info!("🎥 Step 1: Validating plan and negotiating capture format...");
        plan.validate()?;
        negotiate(self.capture.as_ref(), &self.config.capture.preferences).await
    }

    // ==========================================
    // PIPELINE STEP 2: ASSET LOADING
    // ==========================================

    async fn load_assets(
        &self,
        plan: &CompositionPlan,
        fps: f64,
        with_clip_audio: bool,
        run: &mut RenderRun,
        cancel: &CancellationToken,
    ) -> Result<LoadedAssets> {
        info!("📹 Step 2: Loading assets...");
        let loader = MediaAssetLoader::new(self.media.clone(), self.fetcher.clone(), self.ledger.clone());

        let mut clip_audio = Vec::with_capacity(plan.clips.len());
        for clip in &plan.clips {
            let VideoAsset { decoder, audio, temp, .. } =
                loader.load_video(clip, fps, with_clip_audio, cancel).await?;
            run.decoders.push(decoder);
            run.temps.extend(temp);
            clip_audio.push(audio);
        }

        let narration = match &plan.audio {
            Some(source) => {
                let asset = loader.load_audio(source, cancel).await?;
                run.temps.extend(asset.temp);
                Some(asset.data)
            }
            None => None,
        };

        let watermark_image = match plan.watermark.as_ref().filter(|spec| spec.wants_image()) {
            Some(spec) => match &spec.image {
                Some(source) => {
                    let asset = loader.load_image(source, cancel).await?;
                    run.temps.extend(asset.temp);
                    Some(asset.image)
                }
                None => None,
            },
            None => None,
        };

        info!("   ✅ Assets ready: {} clip(s), {} temporary reference(s)", run.decoders.len(), run.temps.len());
        Ok(LoadedAssets { clip_audio, narration, watermark_image })
    }

    // ==========================================
    // PIPELINE STEP 3: ASSEMBLY
    // ==========================================

    /// Subtitle timeline of `plan` over `total` seconds of narration
    pub fn subtitle_timeline(&self, plan: &CompositionPlan, total: f64) -> Option<SubtitleSpec> {
        let subtitles = plan.subtitles.as_ref()?;
        let words_per_group = subtitles.words_per_group.unwrap_or(self.config.subtitles.words_per_group);
        let min_word_duration = subtitles.min_word_duration.unwrap_or(self.config.subtitles.min_word_duration);
        let spec = SubtitleSpec::build(&subtitles.text, words_per_group, min_word_duration, total, subtitles.style.clone());
        if spec.is_none() {
            debug!("Subtitle text has no words; skipping subtitles");
        }
        spec
    }

    /// Overlays in draw order: watermark, static text, subtitles
    fn build_overlays(
        &self,
        plan: &CompositionPlan,
        subtitles: Option<&SubtitleSpec>,
        watermark_image: Option<RgbaImage>,
    ) -> Result<Vec<Box<dyn Overlay>>> {
        let default_font = self.config.overlay.default_font.as_deref();
        let mut overlays: Vec<Box<dyn Overlay>> = Vec::new();

        if let Some(spec) = plan.watermark.as_ref().filter(|spec| spec.is_visible()) {
            let painter = if spec.wants_text() {
                Some(TextPainter::resolve(&spec.font.family, default_font)?)
            } else {
                None
            };
            overlays.push(Box::new(WatermarkOverlay::new(spec.clone(), watermark_image, painter)));
        }

        if let Some(spec) = plan.text_overlay.as_ref().filter(|spec| spec.is_visible()) {
            let painter = TextPainter::resolve(&spec.font.family, default_font)?;
            overlays.push(Box::new(TextOverlay::new(spec.clone(), painter)));
        }

        if let Some(spec) = subtitles {
            let painter = TextPainter::resolve(&spec.style.font.family, default_font)?;
            info!("   Subtitles: {} token(s), {:.2}s each", spec.tokens.len(), spec.per_token_duration);
            overlays.push(Box::new(SubtitleOverlay::new(spec.clone(), painter)));
        }

        Ok(overlays)
    }

    async fn capture_run(
        &self,
        plan: &CompositionPlan,
        format: &CaptureFormat,
        fps: f64,
        run: &mut RenderRun,
        progress: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, RunReport)> {
        let output = &self.config.output;
        let policy = MixPolicy::for_plan(plan.mix_original_audio, plan.audio.is_some(), self.config.scheduler.crossfade);
        let assets = self.load_assets(plan, fps, policy.clip_audio_audible, run, cancel).await?;
        progress.assets_loaded();

        info!("⏱️  Step 3: Assembling timeline...");
        let clip_durations: Vec<f64> = run.decoders.iter().map(|d| d.duration()).collect();
        let mut clock = TimelineClock::new(self.config.clock.mode, fps);
        let total = clock.arm(assets.narration.as_ref().map(|audio| audio.duration), &clip_durations)?;

        let first_clip = run
            .decoders
            .first()
            .map(|d| d.dimensions())
            .ok_or_else(|| CompositorError::generic("No clips loaded"))?;
        let (width, height) = plan.output.resolve(output.long_edge, first_clip);
        let subtitles = self.subtitle_timeline(plan, total);
        let overlays = self.build_overlays(plan, subtitles.as_ref(), assets.watermark_image)?;

        let params = EncodeParams {
            width,
            height,
            fps,
            bitrate: plan.bitrate.unwrap_or(output.bitrate),
            sample_rate: output.sample_rate,
            channels: output.channels,
        };
        let encoder = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompositorError::Cancelled),
            encoder = self.capture.open(format, &params) => encoder,
        }?;
        let mut capture = CaptureSession::new(format.clone(), encoder);

        let mut compositor = FrameCompositor::new(width, height, self.config.overlay.padding);
        for overlay in overlays {
            compositor.push_overlay(overlay);
        }
        let master = match assets.narration {
            Some(audio) => MasterTrack::Narration(audio),
            None => MasterTrack::Silence { duration: total },
        };
        let mixer = AudioMixer::new(master, assets.clip_audio, policy, output.sample_rate, output.channels);

        let narrated = clock.master() == Some(MasterSource::Audio);
        let scheduler = SegmentScheduler::new(clip_durations, narrated, &self.config.scheduler);
        let scheduling = &self.config.scheduler;
        let guard = if narrated {
            scheduling.stop_epsilon
        } else {
            // Leave the stop to the end-of-clips buffer
            scheduling.end_buffer + scheduling.stop_epsilon
        };

        info!("   Output: {}x{} @ {} fps, {:.2}s ({})", width, height, fps, total, if narrated { "narration" } else { "clips" });
        debug!(overlays = ?compositor.overlay_names(), "Compositor ready");

        // Pipeline Step 4: Playback
        info!("▶️  Step 4: Playing {} clip(s)...", scheduler.clip_count());
        let (decoders, mixer, compositor) = run.attach(mixer, compositor);
        let playback = Playback {
            decoders,
            mixer,
            compositor,
            capture: &mut capture,
            clock,
            scheduler,
            total,
            dt: 1.0 / fps,
            guard,
            mode: self.config.clock.mode,
        };
        let mut report = playback.run(progress, cancel).await;
        report.subtitles = subtitles;

        // Resources are released before the capture is assembled
        run.stop();
        let raw = capture.finish(cancel).await?;
        Ok((raw, report))
    }
}

struct LoadedAssets {
    clip_audio: Vec<Option<AudioData>>,
    narration: Option<AudioData>,
    watermark_image: Option<RgbaImage>,
}

struct RunReport {
    duration: f64,
    frames: u64,
    visits: Vec<usize>,
    stop_reason: StopReason,
    subtitles: Option<SubtitleSpec>,
}

/// Everything a run holds that must be released when it stops
#[derive(Default)]
struct RenderRun {
    decoders: Vec<Box<dyn VideoDecoder>>,
    temps: Vec<TempRef>,
    mixer: Option<AudioMixer>,
    compositor: Option<FrameCompositor>,
    stopped: bool,
}

impl RenderRun {
    /// Install the audio graph and compositor, lending them out with the decoders
    fn attach(
        &mut self,
        mixer: AudioMixer,
        compositor: FrameCompositor,
    ) -> (&mut [Box<dyn VideoDecoder>], &mut AudioMixer, &mut FrameCompositor) {
        let mixer = self.mixer.insert(mixer);
        let compositor = self.compositor.insert(compositor);
        (&mut self.decoders, mixer, compositor)
    }

    /// Release decoded handles, temporary references and the audio graph
    ///
    /// Later calls do nothing.
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        for decoder in self.decoders.iter_mut() {
            decoder.release();
        }
        let temps = self.temps.len();
        for temp in self.temps.drain(..) {
            temp.release();
        }
        if let Some(mixer) = self.mixer.as_mut() {
            mixer.release();
        }
        if let Some(compositor) = self.compositor.as_mut() {
            compositor.release();
        }
        debug!(decoders = self.decoders.len(), temps, "Run resources released");
    }
}

impl Drop for RenderRun {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run decoder and encoder pipe work without parking the runtime's other tasks
///
/// A current-thread runtime has no other worker to take them, so the work
/// runs inline there.
fn blocking_section<R>(work: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(work),
        _ => work(),
    }
}

// ==========================================
// PIPELINE STEP 4: PLAYBACK
// ==========================================

/// The tick loop of one run
///
/// Never fails: every problem becomes a stop reason on the capture, which
/// turns it into the run's result when finished.
struct Playback<'a> {
    decoders: &'a mut [Box<dyn VideoDecoder>],
    mixer: &'a mut AudioMixer,
    compositor: &'a mut FrameCompositor,
    capture: &'a mut CaptureSession,
    clock: TimelineClock,
    scheduler: SegmentScheduler,
    total: f64,
    dt: f64,
    guard: f64,
    mode: ClockMode,
}

impl Playback<'_> {
    async fn run(mut self, progress: &mut ProgressReporter, cancel: &CancellationToken) -> RunReport {
        let mut pacer = tokio::time::interval(Duration::from_secs_f64(self.dt));
        pacer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let start_timeout = (FIRST_FRAME_TIMEOUT / self.dt).ceil() as u64;
        let mut waited = 0u64;

        if let Err(e) = blocking_section(|| self.decoders[0].prepare()) {
            self.fail(format!("clip 1 failed to start: {}", e));
        }

        while self.capture.stop_reason().is_none() {
            let cancelled = match self.mode {
                ClockMode::Realtime => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => true,
                    _ = pacer.tick() => false,
                },
                ClockMode::Offline => {
                    tokio::task::yield_now().await;
                    cancel.is_cancelled()
                }
            };
            if cancelled {
                self.capture.request_stop(StopReason::Cancelled);
                break;
            }

            if !self.clock.is_started() {
                let drawable = blocking_section(|| self.decoders[0].frame_at(0.0).map(|frame| frame.is_some()));
                match drawable {
                    Ok(true) => {
                        if let Err(e) = self.begin(progress) {
                            self.fail(e.to_string());
                        }
                    }
                    Ok(false) => {
                        waited += 1;
                        if waited >= start_timeout {
                            warn!("First clip produced no drawable frame within {:.1}s", FIRST_FRAME_TIMEOUT);
                            self.capture.request_stop(StopReason::DurationElapsed);
                        }
                    }
                    Err(e) => self.fail(format!("clip 1 failed to start: {}", e)),
                }
                continue;
            }

            blocking_section(|| self.tick(progress));
        }

        RunReport {
            duration: self.capture.frames() as f64 * self.dt,
            frames: self.capture.frames(),
            visits: self.scheduler.visits().to_vec(),
            stop_reason: self.capture.stop_reason().cloned().unwrap_or(StopReason::Cancelled),
            subtitles: None,
        }
    }

    /// Start the clock and the capture together at the first drawable frame
    fn begin(&mut self, progress: &mut ProgressReporter) -> Result<()> {
        self.capture.start()?;
        self.clock.start();
        let t = self.clock.now();
        self.scheduler.start(t);
        self.mixer.activate(0, t);
        progress.scene(0, self.decoders.len());
        info!("🎞️  First frame ready; clock and capture started");
        Ok(())
    }

    /// One compositor tick at the clock's current time
    fn tick(&mut self, progress: &mut ProgressReporter) {
        let t = self.clock.now();
        if let Some(reason) = self.stop_reason(t) {
            self.capture.request_stop(reason);
            return;
        }

        for event in self.scheduler.tick(t) {
            if let Err(reason) = self.apply(event, progress) {
                self.fail(reason);
                return;
            }
        }

        let active = self.scheduler.active_index();
        let clip_time = self.scheduler.clip_time(t);
        let source = match self.decoders[active].frame_at(clip_time) {
            Ok(source) => source,
            Err(e) => {
                self.capture
                    .request_stop(StopReason::Error(format!("clip {} failed during playback: {}", active + 1, e)));
                return;
            }
        };
        let frame = self.compositor.compose(source, t);

        // Audio for a tick that straddles a clip end switches at the end itself
        let until = t + self.dt;
        let mut audio = Vec::new();
        if let Some((next, at)) = self.scheduler.upcoming_switch().filter(|&(_, at)| at < until) {
            audio.extend(self.mixer.render_until(at));
            self.mixer.activate(next, at);
        }
        audio.extend(self.mixer.render_until(until));
        if let Err(e) = self.capture.push(frame, &audio) {
            self.fail(e.to_string());
            return;
        }
        progress.rendering(t / self.total);
        self.clock.advance();
    }

    fn apply(&mut self, event: SchedulerEvent, progress: &mut ProgressReporter) -> std::result::Result<(), String> {
        match event {
            SchedulerEvent::Preload(index) => {
                if let Err(e) = self.decoders[index].prepare() {
                    warn!(clip = index, "Preload failed; retrying at switch: {}", e);
                }
            }
            SchedulerEvent::Advanced { from, to, looped, at } => {
                self.decoders[from].release();
                self.decoders[to]
                    .prepare()
                    .map_err(|e| format!("clip {} failed to start: {}", to + 1, e))?;
                self.mixer.activate(to, at);
                progress.scene(to, self.decoders.len());
                if looped {
                    info!("🔁 Narration continues; looping to clip {}", to + 1);
                }
            }
            SchedulerEvent::Started(_) | SchedulerEvent::Finished { .. } => {}
        }
        Ok(())
    }

    fn stop_reason(&mut self, t: f64) -> Option<StopReason> {
        if self.scheduler.stop_at().is_some_and(|stop_at| t >= stop_at) {
            return Some(StopReason::ClipsFinished);
        }
        if self.clock.master() == Some(MasterSource::Audio) && t >= self.total {
            return Some(StopReason::AudioEnded);
        }
        if self.clock.is_elapsed(self.guard) {
            return Some(StopReason::DurationElapsed);
        }
        None
    }

    fn fail(&mut self, reason: String) {
        warn!("Stopping capture: {}", reason);
        self.capture.request_stop(StopReason::Error(reason));
    }
}
