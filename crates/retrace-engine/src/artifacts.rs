//! Per-step failure diagnostics written by the driver.

use chrono::Utc;
use retrace_common::trace::StepKind;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub const ERROR_LOG: &str = "errors.jsonl";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode artifact: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One failed step, as reported and logged.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub index: usize,
    pub step_type: StepKind,
    pub selector: Option<String>,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorRecord<'a> {
    index: usize,
    #[serde(rename = "type")]
    step_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    selector: Option<&'a str>,
    message: &'a str,
    timestamp: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.dir.join(ERROR_LOG)
    }

    pub fn screenshot_path(&self, index: usize, step_type: StepKind) -> PathBuf {
        self.dir.join(format!("step-{}-{}.png", index, step_type))
    }

    /// Append the failure to the error log and, when given, save its screenshot.
    pub async fn record(
        &self,
        failure: &StepFailure,
        screenshot: Option<&[u8]>,
    ) -> Result<(), ArtifactError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let record = ErrorRecord {
            index: failure.index,
            step_type: failure.step_type.as_str(),
            selector: failure.selector.as_deref(),
            message: &failure.message,
            timestamp: Utc::now().to_rfc3339(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.error_log_path())
            .await?;
        log.write_all(line.as_bytes()).await?;
        log.flush().await?;

        if let Some(png) = screenshot {
            let path = self.screenshot_path(failure.index, failure.step_type);
            tokio::fs::write(&path, png).await?;
            info!(path = %path.display(), "saved failure screenshot");
        }
        Ok(())
    }
}
