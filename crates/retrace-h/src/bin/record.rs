use clap::Parser as ClapParser;
use retrace_common::formatter::format_trace;
use retrace_engine::backend::Backend;
use retrace_engine::config::loader::ConfigLoader;
use retrace_engine::export::{default_trace_filename, save_trace};
use retrace_engine::replay::{ReplayOptions, Replayer};
use retrace_h::HeadlessBackend;
use retrace_h::recorder::LiveRecorder;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Record interactions in a visible Chromium window.
#[derive(ClapParser, Debug)]
#[command(name = "retrace-record", author, version, about, long_about = None)]
struct Args {
    /// Page to open
    url: String,

    /// Output file (defaults to trace-<unix seconds>.json)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Replay the recording in the same page once it stops
    #[arg(long)]
    replay: bool,
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

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ConfigLoader::load_default().await.unwrap_or_else(|e| {
        warn!("Using default configuration: {}", e);
        Default::default()
    });

    let mut backend = HeadlessBackend::new_with_visibility(true);
    backend.launch().await?;
    backend.navigate(&args.url).await?;

    let page = backend
        .get_client()
        .map(|c| c.page.clone())
        .ok_or("browser page unavailable")?;
    let recorder = LiveRecorder::attach(&page, config.capture.clone()).await?;

    tokio::select! {
        _ = recorder.stopped_from_page() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Ctrl-C handler failed: {}", e);
            }
            info!("Interrupted; finishing recording");
        }
    }

    let trace = recorder.finish(&page).await?;
    info!("Recorded {} steps", trace.steps.len());
    for line in format_trace(&trace).lines() {
        info!("  {}", line);
    }

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(default_trace_filename()));
    save_trace(&trace, &out).await?;
    info!("Trace written to {}", out.display());

    if args.replay {
        let options = ReplayOptions::in_page().with_config(&config.replay);
        match Replayer::new(&mut backend, options).run(&trace).await {
            Ok(report) => info!("Replay finished: {} steps", report.steps_run),
            Err(e) => error!("Replay failed: {}", e),
        }
    }

    if let Err(e) = backend.close().await {
        warn!("Browser did not close cleanly: {}", e);
    }
    Ok(())
}
