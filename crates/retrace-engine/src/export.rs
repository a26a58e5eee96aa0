use retrace_common::{Trace, ValidationError};
use retrace_core::validator;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TraceFileError {
    #[error("Failed to access trace file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode trace: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// `trace-<unix seconds>.json`
pub fn default_trace_filename() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("trace-{}.json", secs)
}

/// Write the trace as pretty-printed JSON.
pub async fn save_trace(trace: &Trace, path: &Path) -> Result<(), TraceFileError> {
    let json = trace.to_json_pretty()?;
    tokio::fs::write(path, json)
        .await
        .map_err(|source| TraceFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), steps = trace.steps.len(), "trace saved");
    Ok(())
}

/// Read and validate a trace file.
pub async fn load_trace(path: &Path) -> Result<Trace, TraceFileError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TraceFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(validator::parse_trace(&json)?)
}
