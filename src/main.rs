use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use reel_compositor::{
    assets::AssetSource,
    composition::{render_shorts, CompositionEngine, CompositionPlan, Deliverable, ShortsRequest},
    config::{Config, LoggingConfig},
    progress::{LogSink, ProgressReporter},
    CompositorError,
};

#[derive(Parser)]
#[command(
    name = "reel-compositor",
    version,
    about = "Composite narrated video reels from source clips",
    long_about = "Reel-Compositor plays an ordered list of clips against a narration track, draws watermark, text and subtitle overlays on every frame and captures the result as an H.264/AAC MP4."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a composition plan (TOML or JSON) into one video
    Render {
        /// Composition plan file
        #[arg(short, long)]
        plan: PathBuf,

        /// Output video file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Cut a long video into short vertical clips
    Shorts {
        /// Source video, a local path or an http(s) URL
        #[arg(long)]
        video: String,

        /// Directory the shorts are written into
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Source duration in seconds; probed when omitted
        #[arg(short, long)]
        duration: Option<f64>,
    },

    /// List the capture formats this machine can produce
    Formats,
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration before logging so the logging section applies
    let config = match &cli.config {
        Some(config_path) => Config::from_file(config_path)
            .with_context(|| format!("loading configuration from {:?}", config_path))?,
        None => Config::default(),
    };
    init_logging(&config.logging, cli.verbose);

    info!("Starting Reel-Compositor v{}", env!("CARGO_PKG_VERSION"));
    match &cli.config {
        Some(config_path) => info!("Loaded configuration from {:?}", config_path),
        None => info!("Using default configuration"),
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling the current run");
            on_interrupt.cancel();
        }
    });

    let engine = CompositionEngine::new(config)?;
    let outcome = match cli.command {
        Command::Render { plan, output } => render(&engine, &plan, &output, &cancel).await,
        Command::Shorts { video, output_dir, duration } => {
            shorts(&engine, &video, &output_dir, duration, &cancel).await
        }
        Command::Formats => {
            formats(&engine).await;
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("{}", e.user_message());
    }
    Ok(outcome?)
}

async fn render(
    engine: &CompositionEngine,
    plan_path: &Path,
    output: &Path,
    cancel: &CancellationToken,
) -> std::result::Result<(), CompositorError> {
    info!("Plan: {:?}", plan_path);
    let plan = CompositionPlan::from_file(plan_path)?;

    let mut progress = ProgressReporter::new(Box::new(LogSink));
    let deliverable = engine.render(&plan, &mut progress, cancel).await?;
    let written = write_deliverable(&deliverable, output)?;

    if let Some(subtitles) = &deliverable.subtitles {
        let srt = written.with_extension("srt");
        std::fs::write(&srt, subtitles.to_srt())?;
        info!("Subtitles saved to: {:?}", srt);
    }

    info!("Composition complete! Output saved to: {:?}", written);
    Ok(())
}

async fn shorts(
    engine: &CompositionEngine,
    video: &str,
    output_dir: &Path,
    duration: Option<f64>,
    cancel: &CancellationToken,
) -> std::result::Result<(), CompositorError> {
    let source = AssetSource::parse(video);
    let stem = source.file_stem().unwrap_or_else(|| "short".to_string());
    std::fs::create_dir_all(output_dir)?;

    let mut request = ShortsRequest::new(source);
    request.total_duration = duration;

    let mut progress = ProgressReporter::new(Box::new(LogSink));
    let shorts = render_shorts(engine, &request, &mut progress, cancel).await?;
    for (index, short) in shorts.iter().enumerate() {
        let path = output_dir.join(format!("{}-short-{}.mp4", stem, index + 1));
        let written = write_deliverable(&short.deliverable, &path)?;
        info!(
            "Short {} ({:.1}s from {:.1}s) saved to: {:?}",
            index + 1,
            short.segment.duration,
            short.segment.start,
            written
        );
    }
    Ok(())
}

async fn formats(engine: &CompositionEngine) {
    let backend = engine.capture_backend();
    for format in &engine.config().capture.preferences {
        let status = if backend.supports(format).await { "supported" } else { "unavailable" };
        println!("{:<24} {}", format.to_string(), status);
    }
}

/// Write the bytes, switching the extension when finalize fell back to the raw capture
fn write_deliverable(deliverable: &Deliverable, output: &Path) -> std::result::Result<PathBuf, CompositorError> {
    let path = if deliverable.outcome.is_degraded() {
        warn!("Finalize degraded; writing the raw {} capture", deliverable.container);
        output.with_extension(deliverable.container.extension())
    } else {
        output.to_path_buf()
    };
    deliverable.write_to(&path)?;
    Ok(path)
}
