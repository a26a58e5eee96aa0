pub mod error;
pub mod formatter;
pub mod protocol;
pub mod snapshot;
pub mod status;
pub mod trace;

pub use error::{BackendError, CaptureError, ReplayError, SelectorError, ValidationError};
pub use trace::{Step, StepKind, Trace, TraceMeta, TRACE_VERSION};
