use crate::trace::StepKind;
use thiserror::Error;

/// Malformed or unsupported trace. Raised before any step runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid trace: not valid JSON ({0})")]
    Json(String),

    #[error("invalid trace: not an object")]
    NotAnObject,

    #[error("unsupported trace version: {found}, expected {expected}")]
    UnsupportedVersion { found: String, expected: u32 },

    #[error("invalid trace: steps must be an array")]
    StepsNotArray,

    #[error("invalid trace: no steps found")]
    NoSteps,

    #[error("invalid step {index}: unknown type \"{found}\"")]
    UnknownStepType { index: usize, found: String },

    #[error("invalid step {index}: invalid timestamp")]
    InvalidTimestamp { index: usize },

    #[error("invalid trace: {0}")]
    Malformed(String),
}

/// A selector string the matcher cannot parse or does not support.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectorError {
    #[error("invalid selector '{selector}': {reason}")]
    Invalid { selector: String, reason: String },

    #[error("unsupported selector '{selector}': {feature}")]
    Unsupported { selector: String, feature: String },
}

/// A single capture handler failure. Logged, never surfaced to the page.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("event target {0} is not in the current snapshot")]
    UnknownTarget(u64),

    #[error("selector error: {0}")]
    Selector(#[from] SelectorError),
}

/// Failures of the browser backend or its transport.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend not ready")]
    NotReady,

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Page script error: {0}")]
    Script(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// Failures a later poll can recover from, such as a snapshot racing a navigation.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Script(_))
    }
}

/// Errors raised while replaying a trace.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("element not found within {timeout_ms}ms; attempted: {}", .attempted.join(", "))]
    ElementNotFound {
        attempted: Vec<String>,
        timeout_ms: u64,
    },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("{0}")]
    InvalidSelector(#[from] SelectorError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("step {index} ({step_type}) failed: {source}")]
    StepFailed {
        index: usize,
        step_type: StepKind,
        #[source]
        source: Box<ReplayError>,
    },
}
