pub mod backend;
pub mod cdp;
pub mod inject;
pub mod recorder;
pub mod video;

pub use backend::HeadlessBackend;

/// Install the stderr subscriber used by both binaries; `RUST_LOG` overrides `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
