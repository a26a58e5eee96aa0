use clap::Parser as ClapParser;
use retrace_common::formatter::format_trace;
use retrace_engine::artifacts::ArtifactWriter;
use retrace_engine::backend::{Backend, BackendError};
use retrace_engine::config::loader::ConfigLoader;
use retrace_engine::config::schema::RetraceConfig;
use retrace_engine::export::load_trace;
use retrace_engine::replay::{ReplayOptions, Replayer};
use retrace_engine::{log_events, StatusChannel};
use retrace_h::HeadlessBackend;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Replay a recorded trace in Chromium.
#[derive(ClapParser, Debug)]
#[command(name = "retrace-h", author, version, about, long_about = None)]
struct Args {
    /// Trace file to replay
    trace: PathBuf,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Sleep between steps as recorded
    #[arg(long)]
    respect_timing: bool,

    /// Save screencast frames under <artifacts>/video
    #[arg(long)]
    video: bool,

    /// Speed multiplier; divides the per-character typing delay
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Element wait timeout in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Directory for failure screenshots and the error log
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Config file (defaults to ./retrace.yaml, then ~/.retrace/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    retrace_h::init_tracing();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn load_config(path: Option<&PathBuf>) -> RetraceConfig {
    ConfigLoader::load(path.map(PathBuf::as_path))
        .await
        .unwrap_or_else(|e| {
            warn!("Using default configuration: {}", e);
            RetraceConfig::default()
        })
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_ref()).await;

    let trace = load_trace(&args.trace).await?;
    info!("Loaded {}", args.trace.display());
    for line in format_trace(&trace).lines() {
        info!("  {}", line);
    }

    let mut options = ReplayOptions::driver().with_config(&config.replay);
    options.respect_timing = args.respect_timing;
    options.speed = args.speed;
    if let Some(ms) = args.timeout {
        options.element_timeout = Duration::from_millis(ms);
    }
    let artifacts_dir = args.artifacts.unwrap_or(config.artifacts.dir);

    let mut backend = HeadlessBackend::new_with_visibility(args.headful);
    backend.launch().await?;

    let viewport = trace.meta.viewport;
    if viewport.width > 0 && viewport.height > 0 {
        match backend.set_viewport(viewport).await {
            Ok(()) | Err(BackendError::NotSupported(_)) => {}
            Err(e) => warn!("Could not apply recorded viewport: {}", e),
        }
    }
    if args.video
        && let Err(e) = backend.start_video(&artifacts_dir.join("video")).await
    {
        warn!("Video recording unavailable: {}", e);
    }

    let status = StatusChannel::default();
    let logger = tokio::spawn(log_events(status.subscribe()));

    let outcome = Replayer::new(&mut backend, options)
        .with_status(status)
        .with_artifacts(ArtifactWriter::new(&artifacts_dir))
        .run(&trace)
        .await;
    let _ = logger.await;

    if args.video {
        match backend.stop_video().await {
            Ok(frames) => info!("Saved {} video frames", frames),
            Err(e) => warn!("Failed to finish video: {}", e),
        }
    }
    if let Err(e) = backend.close().await {
        warn!("Browser did not close cleanly: {}", e);
    }

    let report = outcome?;
    if report.is_clean() {
        info!("Replay completed: {} steps", report.steps_run);
    } else {
        warn!(
            "Replay completed with {} failed step(s); see {}",
            report.failures.len(),
            artifacts_dir.display()
        );
    }
    Ok(())
}
